//! Waiting for remote runs to finish.
//!
//! `RunPoller` sleeps a fixed interval, re-fetches the run's status and
//! returns as soon as the status is terminal. An optional timeout and a
//! bounded retry budget for transient fetch failures are injected through
//! `PollerConfig`; the defaults reproduce plain fixed-interval polling that
//! propagates the first fetch error.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tandem_abstraction::{AssistantService, Run, RunStatus, ServiceError};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Fixed delay before every status fetch.
    pub interval: Duration,
    /// Give up once a run has been waited on this long. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Consecutive transient fetch failures tolerated before giving up.
    pub fetch_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
            fetch_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl PollerConfig {
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_fetch_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.fetch_retries = retries;
        self.retry_backoff = backoff;
        self
    }
}

/// Why waiting on a run stopped without a terminal status.
#[derive(Debug, Error)]
pub enum PollError {
    /// The status fetch failed and the retry budget (if any) is spent.
    #[error("status fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        /// Fetch attempts made for the failing poll.
        attempts: u32,
        /// Last error returned.
        #[source]
        source: ServiceError,
    },

    /// The configured timeout elapsed.
    #[error("run still running after {0:?}")]
    Timeout(Duration),
}

/// Blocking-wait primitive over `AssistantService::fetch_run_status`.
#[derive(Clone)]
pub struct RunPoller {
    service: Arc<dyn AssistantService>,
    config: PollerConfig,
}

impl std::fmt::Debug for RunPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunPoller").field("config", &self.config).finish_non_exhaustive()
    }
}

impl RunPoller {
    /// Creates a poller over `service`.
    pub fn new(service: Arc<dyn AssistantService>, config: PollerConfig) -> Self {
        Self { service, config }
    }

    /// The active policy.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Waits until `run` reaches a terminal status and returns it.
    ///
    /// No status fetch is issued after the first terminal status is observed.
    pub async fn await_terminal(&self, run: &Run) -> Result<RunStatus, PollError> {
        let start = Instant::now();
        let mut last = run.status;
        let mut polls: u64 = 0;

        loop {
            sleep(self.config.interval).await;

            let status = self.fetch_with_retry(run).await?;
            polls += 1;

            if !last.can_transition_to(status) {
                warn!(
                    run_id = %run.id,
                    from = %last,
                    to = %status,
                    "Run status moved backwards"
                );
            }
            debug!(run_id = %run.id, status = %status, polls, "Polled run");
            last = status;

            if status.is_terminal() {
                return Ok(status);
            }

            if let Some(timeout) = self.config.timeout {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    warn!(run_id = %run.id, ?elapsed, status = %status, "Gave up waiting on run");
                    return Err(PollError::Timeout(elapsed));
                }
            }
        }
    }

    /// One status fetch, retried on transient errors within the budget.
    async fn fetch_with_retry(&self, run: &Run) -> Result<RunStatus, PollError> {
        let mut attempt: u32 = 0;

        loop {
            match self.service.fetch_run_status(run).await {
                Ok(status) => return Ok(status),
                Err(e) if e.is_transient() && attempt < self.config.fetch_retries => {
                    let delay = self.config.retry_backoff * 2_u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        run_id = %run.id,
                        error = %e,
                        attempt,
                        max_retries = self.config.fetch_retries,
                        ?delay,
                        "Status fetch failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(source) => return Err(PollError::Fetch { attempts: attempt + 1, source }),
            }
        }
    }
}
