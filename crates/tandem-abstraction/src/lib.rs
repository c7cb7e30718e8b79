//! Service abstraction layer for Tandem.
//!
//! This crate defines the data model of a planner/coder pipeline and the two
//! remote capabilities it is built on: a hosted assistant service and a
//! managed document index.

pub mod model;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use model::{
    AgentConfig, AgentId, Capability, ChunkingPolicy, ContentPart, ConversationId, IndexId,
    IndexReference, Message, MessageContent, MessageRole, ModelSettings, Role, Run, RunId,
    RunStatus, RunStep, SearchHit, StepDetails, ToolCall, UploadSummary,
};

/// Represents an error returned by a remote service call.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceError {
    /// The request never got a response (network issues, connection reset).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The service answered with an error status.
    #[error("API Error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Error body or summary.
        message: String,
    },

    /// Credentials missing or rejected.
    #[error("Authentication Error: {0}")]
    AuthenticationError(String),

    /// The referenced object does not exist.
    #[error("Not Found: {0}")]
    NotFound(String),

    /// Quota exceeded or rate limit hit.
    #[error("Quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// Optional error message from the service.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A request or response body could not be (de)serialized.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// A local file could not be used for upload.
    #[error("Invalid file '{path}': {reason}")]
    InvalidFile {
        /// Offending path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A remote job did not settle in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Other unexpected errors.
    #[error("Other Service Error: {0}")]
    Other(String),
}

impl ServiceError {
    /// Whether retrying the same call may succeed.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::RequestError(_) | Self::QuotaExceeded { .. } => true,
            Self::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// The conversational capability of the hosted assistant service.
///
/// Implementations must be `Send + Sync` so a single client can back several
/// pipelines.
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Registers an agent configuration and returns its handle.
    async fn create_agent(&self, config: &AgentConfig) -> Result<AgentId, ServiceError>;

    /// Removes a registered agent.
    async fn delete_agent(&self, agent: &AgentId) -> Result<(), ServiceError>;

    /// Opens a new, empty conversation.
    async fn create_conversation(&self) -> Result<ConversationId, ServiceError>;

    /// Appends a message to a conversation.
    async fn post_message(
        &self,
        conversation: &ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ServiceError>;

    /// Starts executing `agent` against `conversation`.
    async fn create_run(
        &self,
        conversation: &ConversationId,
        agent: &AgentId,
    ) -> Result<Run, ServiceError>;

    /// Re-fetches the current status of a run.
    async fn fetch_run_status(&self, run: &Run) -> Result<RunStatus, ServiceError>;

    /// Lists the messages of a conversation, oldest first.
    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ServiceError>;

    /// Lists the steps a run went through, including document-search hits.
    async fn list_run_steps(&self, run: &Run) -> Result<Vec<RunStep>, ServiceError>;
}

/// The managed document index capability.
#[async_trait]
pub trait DocumentIndexService: Send + Sync {
    /// Creates an empty index.
    async fn create_index(
        &self,
        name: &str,
        chunking: &ChunkingPolicy,
    ) -> Result<IndexReference, ServiceError>;

    /// Uploads local files into an index and waits until they are indexed.
    async fn upload_files(
        &self,
        index: &IndexReference,
        files: &[PathBuf],
    ) -> Result<UploadSummary, ServiceError>;

    /// Deletes an index.
    async fn delete_index(&self, index: &IndexId) -> Result<(), ServiceError>;

    /// Lists the indexes visible to the caller.
    async fn list_indexes(&self) -> Result<Vec<IndexReference>, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::RequestError("connection reset".to_string()).is_transient());
        assert!(ServiceError::QuotaExceeded { message: None }.is_transient());
        assert!(ServiceError::ApiError { status: 503, message: "busy".to_string() }.is_transient());
        assert!(!ServiceError::ApiError { status: 400, message: "bad".to_string() }.is_transient());
        assert!(!ServiceError::NotFound("run_1".to_string()).is_transient());
        assert!(!ServiceError::AuthenticationError("no key".to_string()).is_transient());
    }

    #[test]
    fn test_quota_display() {
        let with_message = ServiceError::QuotaExceeded { message: Some("slow down".to_string()) };
        assert_eq!(with_message.to_string(), "Quota exceeded: slow down");
        let without = ServiceError::QuotaExceeded { message: None };
        assert_eq!(without.to_string(), "Quota exceeded");
    }
}
