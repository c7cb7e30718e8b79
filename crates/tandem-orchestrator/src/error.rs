// Error types for pipeline orchestration

use std::time::Duration;
use tandem_abstraction::{Role, RunStatus, ServiceError};
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage's run terminated without completing
    #[error("{stage} stage failed: run ended as {status}")]
    StageFailed {
        /// Stage whose run failed
        stage: Role,
        /// Terminal status the run reached
        status: RunStatus,
    },

    /// A stage completed but left no assistant message to hand on
    #[error("{stage} stage completed without an assistant message")]
    EmptyOutput {
        /// Stage that produced nothing
        stage: Role,
    },

    /// Checking a run's status failed (after any configured retries)
    #[error("status check for {stage} run failed: {source}")]
    TransientFetch {
        /// Stage being polled
        stage: Role,
        /// Last error returned by the service
        #[source]
        source: ServiceError,
    },

    /// A run did not reach a terminal status within the poll timeout
    #[error("{stage} run still not finished after {elapsed:?}")]
    PollTimeout {
        /// Stage being polled
        stage: Role,
        /// Time spent waiting
        elapsed: Duration,
    },

    /// Index or agent setup failed
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// An agent was handed to the wrong pipeline slot
    #[error("expected a {expected} agent, got a {found} agent")]
    RoleMismatch {
        /// Role the slot requires
        expected: Role,
        /// Role of the agent supplied
        found: Role,
    },

    /// Any other remote call failed
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An instruction document is missing or malformed
    #[error("Invalid instructions in {path}: {reason}")]
    Instructions {
        /// Document path
        path: String,
        /// What is wrong with it
        reason: String,
    },
}
