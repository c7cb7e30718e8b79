//! Integration tests for the planner → coder pipeline.
//!
//! Runs the full pipeline against the scripted in-memory service and checks
//! the hand-off, failure short-circuiting and output selection.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tandem_abstraction::{
    AgentConfig, AgentId, AssistantService, ContentPart, ConversationId, Message, MessageContent,
    MessageRole, Role, Run, RunStatus, RunStep, SearchHit, ServiceError, StepDetails, ToolCall,
};
use tandem_models::{AgentScript, MockAssistantService, RecordedCall};
use tandem_orchestrator::{AgentRegistry, PipelineError, PipelineOrchestrator, PollerConfig};

const PLAN: &str = "Step 1: Define H(z) for flat LCDM with Omega_m = 0.315.\n\
                    Step 2: Integrate c/H(z) from 0 to z.\n\
                    Step 3: Plot d_L(z) = (1 + z) * D_C(z) for z in [0, 2].";
const CODE: &str = "import numpy as np\nfrom scipy.integrate import quad\n...";

fn fast() -> PollerConfig {
    PollerConfig::default().with_interval(Duration::from_millis(1))
}

async fn setup(
    planner: AgentScript,
    coder: AgentScript,
) -> (Arc<MockAssistantService>, PipelineOrchestrator, AgentRegistry) {
    setup_with(planner, coder, fast()).await
}

async fn setup_with(
    planner: AgentScript,
    coder: AgentScript,
    config: PollerConfig,
) -> (Arc<MockAssistantService>, PipelineOrchestrator, AgentRegistry) {
    let mock = Arc::new(
        MockAssistantService::new().with_script(Role::Planner, planner).with_script(Role::Coder, coder),
    );
    let registry = AgentRegistry::create(
        mock.as_ref(),
        AgentConfig::planner("Plan cosmology tasks."),
        AgentConfig::coder("Write python for each step."),
    )
    .await
    .unwrap();
    let orchestrator = PipelineOrchestrator::new(mock.clone(), config);
    (mock, orchestrator, registry)
}

#[tokio::test]
async fn test_luminosity_distance_scenario() {
    let (mock, orchestrator, registry) =
        setup(AgentScript::completes_with(PLAN), AgentScript::completes_with(CODE)).await;
    let prompt = "Plot the luminosity distance for a flat LCDM cosmology.";

    let result = orchestrator.run(prompt, &registry).await.unwrap();

    assert_eq!(result.planner_output, PLAN);
    assert_eq!(result.coder_output, CODE);
    assert_eq!(result.planner_run.status, RunStatus::Completed);
    assert_eq!(result.coder_run.status, RunStatus::Completed);

    let conversations = mock.conversations();
    assert_eq!(conversations.len(), 2);
    assert_ne!(conversations[0], conversations[1]);

    // The coder conversation holds the plan verbatim as its only user message.
    let coder_inputs: Vec<Message> = mock
        .messages(&conversations[1])
        .into_iter()
        .filter(|m| m.role == MessageRole::User)
        .collect();
    assert_eq!(coder_inputs.len(), 1);
    assert_eq!(coder_inputs[0].content.text(), Some(PLAN));

    let planner_inputs = mock.messages(&conversations[0]);
    assert_eq!(planner_inputs[0].content.text(), Some(prompt));
}

#[tokio::test]
async fn test_runs_use_the_agent_of_their_stage() {
    let (mock, orchestrator, registry) =
        setup(AgentScript::completes_with(PLAN), AgentScript::completes_with(CODE)).await;

    orchestrator.run("prompt", &registry).await.unwrap();

    let run_agents: Vec<AgentId> = mock
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RecordedCall::CreateRun { agent, .. } => Some(agent),
            _ => None,
        })
        .collect();
    assert_eq!(run_agents, vec![registry.planner().id.clone(), registry.coder().id.clone()]);
}

#[tokio::test]
async fn test_planner_failure_never_starts_coder() {
    let (mock, orchestrator, registry) =
        setup(AgentScript::ends_with(RunStatus::Failed), AgentScript::completes_with(CODE)).await;

    let err = orchestrator.run("prompt", &registry).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::StageFailed { stage: Role::Planner, status: RunStatus::Failed }
    ));
    assert_eq!(mock.conversations().len(), 1);
    assert_eq!(mock.runs_started(Role::Coder), 0);
}

#[tokio::test]
async fn test_each_non_completed_terminal_status_fails_the_stage() {
    for status in [RunStatus::Cancelled, RunStatus::Expired, RunStatus::Incomplete] {
        let (_mock, orchestrator, registry) =
            setup(AgentScript::completes_with(PLAN), AgentScript::ends_with(status)).await;

        let err = orchestrator.run("prompt", &registry).await.unwrap_err();

        assert!(
            matches!(err, PipelineError::StageFailed { stage: Role::Coder, status: s } if s == status),
            "unexpected error for {}: {:?}",
            status,
            err
        );
    }
}

#[tokio::test]
async fn test_planner_without_reply_is_empty_output() {
    let (mock, orchestrator, registry) =
        setup(AgentScript::ends_with(RunStatus::Completed), AgentScript::completes_with(CODE)).await;

    let err = orchestrator.run("prompt", &registry).await.unwrap_err();

    assert!(matches!(err, PipelineError::EmptyOutput { stage: Role::Planner }));
    assert_eq!(mock.runs_started(Role::Coder), 0);
}

#[tokio::test]
async fn test_coder_without_reply_is_empty_output() {
    let (_mock, orchestrator, registry) =
        setup(AgentScript::completes_with(PLAN), AgentScript::ends_with(RunStatus::Completed)).await;

    let err = orchestrator.run("prompt", &registry).await.unwrap_err();

    assert!(matches!(err, PipelineError::EmptyOutput { stage: Role::Coder }));
}

#[tokio::test]
async fn test_structured_reply_yields_first_text_part() {
    let reply = MessageContent::Structured(vec![
        ContentPart::ImageFile { file_id: "file-plot".to_string() },
        ContentPart::Text { value: CODE.to_string() },
    ]);
    let (_mock, orchestrator, registry) = setup(
        AgentScript::completes_with(PLAN),
        AgentScript::ends_with(RunStatus::Completed).with_reply(reply),
    )
    .await;

    let result = orchestrator.run("prompt", &registry).await.unwrap();

    assert_eq!(result.coder_output, CODE);
}

#[tokio::test]
async fn test_agents_are_reused_across_executions() {
    let (mock, orchestrator, registry) =
        setup(AgentScript::completes_with(PLAN), AgentScript::completes_with(CODE)).await;

    orchestrator.run("first", &registry).await.unwrap();
    orchestrator.run("second", &registry).await.unwrap();

    let created = mock.calls().iter().filter(|c| matches!(c, RecordedCall::CreateAgent { .. })).count();
    assert_eq!(created, 2);
    assert_eq!(mock.conversations().len(), 4);
    assert_eq!(mock.runs_started(Role::Planner), 2);
    assert_eq!(mock.runs_started(Role::Coder), 2);
}

#[tokio::test]
async fn test_fetch_error_aborts_with_stage() {
    let (mock, orchestrator, registry) = setup(
        AgentScript::completes_with(PLAN),
        AgentScript::completes_with(CODE)
            .with_fetch_errors(vec![ServiceError::RequestError("connection reset".to_string())]),
    )
    .await;

    let err = orchestrator.run("prompt", &registry).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::TransientFetch { stage: Role::Coder, source: ServiceError::RequestError(_) }
    ));
    assert_eq!(mock.runs_started(Role::Coder), 1);
}

#[tokio::test]
async fn test_fetch_error_recovered_with_retries() {
    let (_mock, orchestrator, registry) = setup_with(
        AgentScript::completes_with(PLAN).with_fetch_errors(vec![ServiceError::ApiError {
            status: 502,
            message: "bad gateway".to_string(),
        }]),
        AgentScript::completes_with(CODE),
        fast().with_fetch_retries(1, Duration::from_millis(1)),
    )
    .await;

    let result = orchestrator.run("prompt", &registry).await.unwrap();

    assert_eq!(result.coder_output, CODE);
}

#[tokio::test]
async fn test_stuck_run_times_out() {
    let (mock, orchestrator, registry) = setup_with(
        AgentScript::default().with_statuses(vec![RunStatus::Queued, RunStatus::InProgress]),
        AgentScript::completes_with(CODE),
        fast().with_timeout(Duration::from_millis(10)),
    )
    .await;

    let err = orchestrator.run("prompt", &registry).await.unwrap_err();

    assert!(matches!(err, PipelineError::PollTimeout { stage: Role::Planner, .. }));
    assert_eq!(mock.runs_started(Role::Coder), 0);
}

#[tokio::test]
async fn test_inspect_returns_steps_of_both_runs() {
    let search = RunStep {
        id: "step_1".to_string(),
        details: StepDetails::ToolCalls(vec![ToolCall::FileSearch {
            results: vec![SearchHit {
                file_id: "file-1".to_string(),
                file_name: Some("planck2018.txt".to_string()),
                score: Some(0.82),
                snippet: Some("Omega_m = 0.315".to_string()),
            }],
        }]),
    };
    let interpreter = RunStep {
        id: "step_2".to_string(),
        details: StepDetails::ToolCalls(vec![ToolCall::CodeInterpreter {
            input: "print(1)".to_string(),
        }]),
    };
    let (_mock, orchestrator, registry) = setup(
        AgentScript::completes_with(PLAN).with_steps(vec![search.clone()]),
        AgentScript::completes_with(CODE)
            .with_steps(vec![interpreter.clone(), RunStep {
                id: "step_3".to_string(),
                details: StepDetails::MessageCreation,
            }]),
    )
    .await;

    let result = orchestrator.run("prompt", &registry).await.unwrap();
    let trace = orchestrator.inspect(&result).await.unwrap();

    assert_eq!(trace.planner_steps, vec![search]);
    assert_eq!(trace.coder_steps.len(), 2);
    assert_eq!(trace.coder_steps[0], interpreter);
}

/// Reports an extra, older assistant message in every conversation.
struct DraftingService {
    inner: MockAssistantService,
}

#[async_trait]
impl AssistantService for DraftingService {
    async fn create_agent(&self, config: &AgentConfig) -> Result<AgentId, ServiceError> {
        self.inner.create_agent(config).await
    }

    async fn delete_agent(&self, agent: &AgentId) -> Result<(), ServiceError> {
        self.inner.delete_agent(agent).await
    }

    async fn create_conversation(&self) -> Result<ConversationId, ServiceError> {
        self.inner.create_conversation().await
    }

    async fn post_message(
        &self,
        conversation: &ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ServiceError> {
        self.inner.post_message(conversation, role, content).await
    }

    async fn create_run(
        &self,
        conversation: &ConversationId,
        agent: &AgentId,
    ) -> Result<Run, ServiceError> {
        self.inner.create_run(conversation, agent).await
    }

    async fn fetch_run_status(&self, run: &Run) -> Result<RunStatus, ServiceError> {
        self.inner.fetch_run_status(run).await
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ServiceError> {
        let mut messages = self.inner.list_messages(conversation).await?;
        messages.insert(
            1,
            Message {
                role: MessageRole::Assistant,
                content: MessageContent::from("draft, ignore me"),
                created_at: 0,
            },
        );
        Ok(messages)
    }

    async fn list_run_steps(&self, run: &Run) -> Result<Vec<RunStep>, ServiceError> {
        self.inner.list_run_steps(run).await
    }
}

#[tokio::test]
async fn test_latest_assistant_message_wins() {
    let service = Arc::new(DraftingService {
        inner: MockAssistantService::new()
            .with_script(Role::Planner, AgentScript::completes_with(PLAN))
            .with_script(Role::Coder, AgentScript::completes_with(CODE)),
    });
    let registry =
        AgentRegistry::create(service.as_ref(), AgentConfig::planner("p"), AgentConfig::coder("c"))
            .await
            .unwrap();
    let orchestrator = PipelineOrchestrator::new(service.clone(), fast());

    let result = orchestrator.run("prompt", &registry).await.unwrap();

    assert_eq!(result.planner_output, PLAN);
    assert_eq!(result.coder_output, CODE);
}

#[tokio::test]
async fn test_image_only_latest_reply_is_empty_output() {
    let image = MessageContent::Structured(vec![ContentPart::ImageFile {
        file_id: "file-plot".to_string(),
    }]);
    let service = Arc::new(DraftingService {
        inner: MockAssistantService::new()
            .with_script(Role::Planner, AgentScript::completes_with(PLAN))
            .with_script(Role::Coder, AgentScript::ends_with(RunStatus::Completed).with_reply(image)),
    });
    let registry =
        AgentRegistry::create(service.as_ref(), AgentConfig::planner("p"), AgentConfig::coder("c"))
            .await
            .unwrap();
    let orchestrator = PipelineOrchestrator::new(service.clone(), fast());

    let err = orchestrator.run("prompt", &registry).await.unwrap_err();

    // The older text draft is not used in place of the newest reply.
    assert!(matches!(err, PipelineError::EmptyOutput { stage: Role::Coder }));
}
