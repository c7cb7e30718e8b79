//! Scripted in-memory service for tests and offline demos.
//!
//! `MockAssistantService` implements both service traits without a network.
//! Each role gets an `AgentScript` describing how its runs progress and what
//! the agent answers. Every call is recorded so tests can assert on side
//! effects, e.g. that no coder conversation was opened after a planner failure.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tandem_abstraction::{
    AgentConfig, AgentId, AssistantService, ChunkingPolicy, ConversationId, DocumentIndexService,
    IndexId, IndexReference, Message, MessageContent, MessageRole, Role, Run, RunId, RunStatus,
    RunStep, ServiceError, UploadSummary,
};
use tracing::debug;

/// How runs of one agent behave.
#[derive(Debug, Clone, Default)]
pub struct AgentScript {
    /// Errors returned by the first status fetches, in order.
    pub fetch_errors: Vec<ServiceError>,
    /// Statuses returned by successive fetches; the last one repeats.
    pub statuses: Vec<RunStatus>,
    /// Assistant message appended once a run is observed as `Completed`.
    pub reply: Option<MessageContent>,
    /// Steps reported for each run.
    pub steps: Vec<RunStep>,
}

impl AgentScript {
    /// Runs that go `in_progress` then `completed` and answer `reply`.
    pub fn completes_with(reply: impl Into<String>) -> Self {
        Self {
            statuses: vec![RunStatus::InProgress, RunStatus::Completed],
            reply: Some(MessageContent::Text(reply.into())),
            ..Self::default()
        }
    }

    /// Runs that go `in_progress` then settle on `status` without answering.
    pub fn ends_with(status: RunStatus) -> Self {
        Self { statuses: vec![RunStatus::InProgress, status], ..Self::default() }
    }

    #[must_use]
    pub fn with_statuses(mut self, statuses: Vec<RunStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    #[must_use]
    pub fn with_reply(mut self, reply: MessageContent) -> Self {
        self.reply = Some(reply);
        self
    }

    #[must_use]
    pub fn with_fetch_errors(mut self, errors: Vec<ServiceError>) -> Self {
        self.fetch_errors = errors;
        self
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<RunStep>) -> Self {
        self.steps = steps;
        self
    }
}

/// A call received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    CreateAgent { role: Role, agent: AgentId },
    DeleteAgent { agent: AgentId },
    CreateConversation { conversation: ConversationId },
    PostMessage { conversation: ConversationId, role: MessageRole, content: String },
    CreateRun { conversation: ConversationId, agent: AgentId, run: RunId },
    FetchRunStatus { run: RunId },
    ListMessages { conversation: ConversationId },
    ListRunSteps { run: RunId },
    CreateIndex { name: String, chunking: ChunkingPolicy },
    UploadFiles { index: IndexId, files: Vec<PathBuf> },
    DeleteIndex { index: IndexId },
    ListIndexes,
}

#[derive(Debug)]
struct RunState {
    role: Role,
    conversation: ConversationId,
    fetches: usize,
    errors_left: Vec<ServiceError>,
    delivered: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    clock: i64,
    scripts: HashMap<Role, AgentScript>,
    agents: HashMap<AgentId, Role>,
    conversations: HashMap<ConversationId, Vec<Message>>,
    runs: HashMap<RunId, RunState>,
    indexes: Vec<IndexReference>,
    index_error: Option<ServiceError>,
    upload_error: Option<ServiceError>,
    calls: Vec<RecordedCall>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }
}

/// In-memory implementation of `AssistantService` and `DocumentIndexService`.
#[derive(Debug, Default)]
pub struct MockAssistantService {
    state: Mutex<MockState>,
}

impl MockAssistantService {
    /// Creates a mock with no scripts; runs of unscripted roles complete
    /// immediately without answering.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the runs of `role`.
    #[must_use]
    pub fn with_script(self, role: Role, script: AgentScript) -> Self {
        self.lock().scripts.insert(role, script);
        self
    }

    /// Makes every document index call fail with `error`.
    #[must_use]
    pub fn with_index_error(self, error: ServiceError) -> Self {
        self.lock().index_error = Some(error);
        self
    }

    /// Makes only `upload_files` fail with `error`.
    #[must_use]
    pub fn with_upload_error(self, error: ServiceError) -> Self {
        self.lock().upload_error = Some(error);
        self
    }

    /// Seeds an index that `list_indexes` will report.
    #[must_use]
    pub fn with_existing_index(self, index: IndexReference) -> Self {
        self.lock().indexes.push(index);
        self
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Conversations created so far, in creation order.
    pub fn conversations(&self) -> Vec<ConversationId> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RecordedCall::CreateConversation { conversation } => Some(conversation.clone()),
                _ => None,
            })
            .collect()
    }

    /// Messages of a conversation, oldest first.
    pub fn messages(&self, conversation: &ConversationId) -> Vec<Message> {
        self.lock().conversations.get(conversation).cloned().unwrap_or_default()
    }

    /// Number of status fetches issued for `run`.
    pub fn status_fetches(&self, run: &RunId) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, RecordedCall::FetchRunStatus { run: r } if r == run))
            .count()
    }

    /// Number of runs started for `role`.
    pub fn runs_started(&self, role: Role) -> usize {
        self.lock().runs.values().filter(|run| run.role == role).count()
    }

    /// Indexes currently held.
    pub fn indexes(&self) -> Vec<IndexReference> {
        self.lock().indexes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_index_error(state: &MockState) -> Result<(), ServiceError> {
        state.index_error.clone().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl AssistantService for MockAssistantService {
    async fn create_agent(&self, config: &AgentConfig) -> Result<AgentId, ServiceError> {
        let mut state = self.lock();
        let agent = AgentId::new(state.next_id(&format!("asst_{}", config.role)));
        state.agents.insert(agent.clone(), config.role);
        state.calls.push(RecordedCall::CreateAgent { role: config.role, agent: agent.clone() });
        debug!(role = %config.role, agent_id = %agent, "Mock agent created");
        Ok(agent)
    }

    async fn delete_agent(&self, agent: &AgentId) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::DeleteAgent { agent: agent.clone() });
        state
            .agents
            .remove(agent)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("agent {}", agent)))
    }

    async fn create_conversation(&self) -> Result<ConversationId, ServiceError> {
        let mut state = self.lock();
        let conversation = ConversationId::new(state.next_id("thread"));
        state.conversations.insert(conversation.clone(), Vec::new());
        state.calls.push(RecordedCall::CreateConversation { conversation: conversation.clone() });
        Ok(conversation)
    }

    async fn post_message(
        &self,
        conversation: &ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::PostMessage {
            conversation: conversation.clone(),
            role,
            content: content.to_string(),
        });
        let created_at = state.tick();
        let messages = state
            .conversations
            .get_mut(conversation)
            .ok_or_else(|| ServiceError::NotFound(format!("thread {}", conversation)))?;
        messages.push(Message { role, content: MessageContent::from(content), created_at });
        Ok(())
    }

    async fn create_run(
        &self,
        conversation: &ConversationId,
        agent: &AgentId,
    ) -> Result<Run, ServiceError> {
        let mut state = self.lock();
        let role = *state
            .agents
            .get(agent)
            .ok_or_else(|| ServiceError::NotFound(format!("agent {}", agent)))?;
        if !state.conversations.contains_key(conversation) {
            return Err(ServiceError::NotFound(format!("thread {}", conversation)));
        }

        let run = RunId::new(state.next_id("run"));
        let errors_left =
            state.scripts.get(&role).map(|script| script.fetch_errors.clone()).unwrap_or_default();
        state.runs.insert(
            run.clone(),
            RunState {
                role,
                conversation: conversation.clone(),
                fetches: 0,
                errors_left,
                delivered: false,
            },
        );
        state.calls.push(RecordedCall::CreateRun {
            conversation: conversation.clone(),
            agent: agent.clone(),
            run: run.clone(),
        });

        Ok(Run {
            id: run,
            conversation: conversation.clone(),
            agent: agent.clone(),
            status: RunStatus::Queued,
        })
    }

    async fn fetch_run_status(&self, run: &Run) -> Result<RunStatus, ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::FetchRunStatus { run: run.id.clone() });

        let run_state = state
            .runs
            .get_mut(&run.id)
            .ok_or_else(|| ServiceError::NotFound(format!("run {}", run.id)))?;
        if !run_state.errors_left.is_empty() {
            return Err(run_state.errors_left.remove(0));
        }

        let index = run_state.fetches;
        run_state.fetches += 1;
        let role = run_state.role;
        let conversation = run_state.conversation.clone();
        let already_delivered = run_state.delivered;

        let script = state.scripts.get(&role).cloned().unwrap_or_default();
        let status = script
            .statuses
            .get(index)
            .or_else(|| script.statuses.last())
            .copied()
            .unwrap_or(RunStatus::Completed);

        if status == RunStatus::Completed && !already_delivered {
            if let Some(run_state) = state.runs.get_mut(&run.id) {
                run_state.delivered = true;
            }
            if let Some(reply) = script.reply {
                let created_at = state.tick();
                if let Some(messages) = state.conversations.get_mut(&conversation) {
                    messages.push(Message {
                        role: MessageRole::Assistant,
                        content: reply,
                        created_at,
                    });
                }
            }
        }

        Ok(status)
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::ListMessages { conversation: conversation.clone() });
        state
            .conversations
            .get(conversation)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("thread {}", conversation)))
    }

    async fn list_run_steps(&self, run: &Run) -> Result<Vec<RunStep>, ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::ListRunSteps { run: run.id.clone() });
        let role = state
            .runs
            .get(&run.id)
            .map(|r| r.role)
            .ok_or_else(|| ServiceError::NotFound(format!("run {}", run.id)))?;
        Ok(state.scripts.get(&role).map(|script| script.steps.clone()).unwrap_or_default())
    }
}

#[async_trait]
impl DocumentIndexService for MockAssistantService {
    async fn create_index(
        &self,
        name: &str,
        chunking: &ChunkingPolicy,
    ) -> Result<IndexReference, ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::CreateIndex { name: name.to_string(), chunking: *chunking });
        Self::check_index_error(&state)?;

        let index = IndexReference {
            id: IndexId::new(state.next_id("vs")),
            name: Some(name.to_string()),
            file_count: 0,
        };
        state.indexes.push(index.clone());
        Ok(index)
    }

    async fn upload_files(
        &self,
        index: &IndexReference,
        files: &[PathBuf],
    ) -> Result<UploadSummary, ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::UploadFiles { index: index.id.clone(), files: files.to_vec() });
        Self::check_index_error(&state)?;
        if let Some(error) = state.upload_error.clone() {
            return Err(error);
        }

        let batch_id = state.next_id("vsfb");
        let stored = state
            .indexes
            .iter_mut()
            .find(|i| i.id == index.id)
            .ok_or_else(|| ServiceError::NotFound(format!("vector store {}", index.id)))?;
        stored.file_count += files.len() as u64;
        Ok(UploadSummary { batch_id, completed: files.len() as u64, failed: 0 })
    }

    async fn delete_index(&self, index: &IndexId) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::DeleteIndex { index: index.clone() });
        Self::check_index_error(&state)?;
        state.indexes.retain(|i| &i.id != index);
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<IndexReference>, ServiceError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::ListIndexes);
        Self::check_index_error(&state)?;
        Ok(state.indexes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_run_delivers_reply_once() {
        let mock = MockAssistantService::new()
            .with_script(Role::Planner, AgentScript::completes_with("Step 1: ..."));
        let agent = mock.create_agent(&AgentConfig::planner("plan")).await.unwrap();
        let conversation = mock.create_conversation().await.unwrap();
        mock.post_message(&conversation, MessageRole::User, "hi").await.unwrap();
        let run = mock.create_run(&conversation, &agent).await.unwrap();

        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(mock.fetch_run_status(&run).await.unwrap(), RunStatus::InProgress);
        assert_eq!(mock.fetch_run_status(&run).await.unwrap(), RunStatus::Completed);
        assert_eq!(mock.fetch_run_status(&run).await.unwrap(), RunStatus::Completed);

        let messages = mock.list_messages(&conversation).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content.text(), Some("Step 1: ..."));
        assert_eq!(mock.status_fetches(&run.id), 3);
    }

    #[tokio::test]
    async fn test_fetch_errors_come_first() {
        let mock = MockAssistantService::new().with_script(
            Role::Coder,
            AgentScript::completes_with("code")
                .with_fetch_errors(vec![ServiceError::RequestError("reset".to_string())]),
        );
        let agent = mock.create_agent(&AgentConfig::coder("code")).await.unwrap();
        let conversation = mock.create_conversation().await.unwrap();
        let run = mock.create_run(&conversation, &agent).await.unwrap();

        assert!(mock.fetch_run_status(&run).await.is_err());
        assert_eq!(mock.fetch_run_status(&run).await.unwrap(), RunStatus::InProgress);
    }

    #[tokio::test]
    async fn test_index_lifecycle() {
        let mock = MockAssistantService::new();
        let index = mock.create_index("store", &ChunkingPolicy::default()).await.unwrap();
        let summary =
            mock.upload_files(&index, &[PathBuf::from("a.txt"), PathBuf::from("b.txt")]).await.unwrap();
        assert_eq!(summary.completed, 2);
        assert_eq!(mock.list_indexes().await.unwrap()[0].file_count, 2);

        mock.delete_index(&index.id).await.unwrap();
        assert!(mock.indexes().is_empty());
    }
}
