//! Two-stage planner → coder pipeline.
//!
//! Each stage opens a fresh conversation, posts its input as the sole user
//! message, runs its agent to a terminal status and hands the latest
//! assistant message on. Either stage failing aborts the whole execution.

use crate::error::{PipelineError, Result};
use crate::poller::{PollError, PollerConfig, RunPoller};
use crate::registry::{AgentRegistry, RegisteredAgent, expect_role};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tandem_abstraction::{
    AssistantService, ConversationId, MessageRole, Role, Run, RunStatus, RunStep,
};
use tracing::{debug, info, warn};

/// Outputs of a successful pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    /// Latest assistant message of the planner conversation.
    pub planner_output: String,
    /// Latest assistant message of the coder conversation.
    pub coder_output: String,
    /// The planner's run, in its terminal state.
    pub planner_run: Run,
    /// The coder's run, in its terminal state.
    pub coder_run: Run,
}

/// Steps taken by both agents of an execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineTrace {
    pub planner_steps: Vec<RunStep>,
    pub coder_steps: Vec<RunStep>,
}

/// Drives the planner → coder hand-off.
pub struct PipelineOrchestrator {
    service: Arc<dyn AssistantService>,
    poller: RunPoller,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator").field("poller", &self.poller).finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator that polls runs according to `config`.
    pub fn new(service: Arc<dyn AssistantService>, config: PollerConfig) -> Self {
        let poller = RunPoller::new(Arc::clone(&service), config);
        Self { service, poller }
    }

    /// Runs the pipeline with the agents of `registry`.
    pub async fn run(&self, user_prompt: &str, registry: &AgentRegistry) -> Result<PipelineResult> {
        self.execute(user_prompt, registry.get(Role::Planner), registry.get(Role::Coder)).await
    }

    /// Runs `planner` on `user_prompt`, then `coder` on the planner's output.
    ///
    /// The coder stage is not started unless the planner completed with an
    /// assistant message.
    pub async fn execute(
        &self,
        user_prompt: &str,
        planner: &RegisteredAgent,
        coder: &RegisteredAgent,
    ) -> Result<PipelineResult> {
        expect_role(Role::Planner, planner.role())?;
        expect_role(Role::Coder, coder.role())?;

        let started = Instant::now();
        let (planner_output, planner_run) = self.run_stage(Role::Planner, planner, user_prompt).await?;
        let (coder_output, coder_run) = self.run_stage(Role::Coder, coder, &planner_output).await?;

        info!(elapsed = ?started.elapsed(), "Pipeline finished");
        Ok(PipelineResult { planner_output, coder_output, planner_run, coder_run })
    }

    /// Collects the run steps of both stages of `result`.
    pub async fn inspect(&self, result: &PipelineResult) -> Result<PipelineTrace> {
        let planner_steps = self.service.list_run_steps(&result.planner_run).await?;
        let coder_steps = self.service.list_run_steps(&result.coder_run).await?;
        Ok(PipelineTrace { planner_steps, coder_steps })
    }

    async fn run_stage(
        &self,
        stage: Role,
        agent: &RegisteredAgent,
        input: &str,
    ) -> Result<(String, Run)> {
        let conversation = self.service.create_conversation().await?;
        self.service.post_message(&conversation, MessageRole::User, input).await?;

        let mut run = self.service.create_run(&conversation, &agent.id).await?;
        info!(
            stage = %stage,
            conversation_id = %conversation,
            run_id = %run.id,
            "Stage started"
        );

        let status = self.poller.await_terminal(&run).await.map_err(|e| match e {
            PollError::Fetch { source, .. } => PipelineError::TransientFetch { stage, source },
            PollError::Timeout(elapsed) => PipelineError::PollTimeout { stage, elapsed },
        })?;
        run.status = status;

        if status != RunStatus::Completed {
            warn!(stage = %stage, run_id = %run.id, status = %status, "Stage did not complete");
            return Err(PipelineError::StageFailed { stage, status });
        }

        let output = self.latest_assistant_text(stage, &conversation).await?;
        info!(stage = %stage, run_id = %run.id, output_len = output.len(), "Stage completed");
        Ok((output, run))
    }

    /// Text of the most recent assistant message.
    async fn latest_assistant_text(
        &self,
        stage: Role,
        conversation: &ConversationId,
    ) -> Result<String> {
        let messages = self.service.list_messages(conversation).await?;
        debug!(stage = %stage, count = messages.len(), "Fetched stage messages");

        messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::Assistant)
            .and_then(|message| message.content.text())
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or(PipelineError::EmptyOutput { stage })
    }
}
