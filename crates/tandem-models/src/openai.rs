//! OpenAI assistants implementation.
//!
//! This module implements `AssistantService` over OpenAI's assistants v2 REST
//! API: assistants, threads, messages, runs and run steps. The document index
//! half of the client lives in `vector_store`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::env;
use std::time::Duration;
use tandem_abstraction::{
    AgentConfig, AgentId, AssistantService, Capability, ContentPart, ConversationId, Message,
    MessageContent, MessageRole, Run, RunId, RunStatus, RunStep, SearchHit, ServiceError,
    StepDetails, ToolCall,
};
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const PAGE_LIMIT: &str = "100";
const FILE_SEARCH_CONTENT: &str = "step_details.tool_calls[*].file_search.results[*].content";

/// Client for OpenAI's assistants and vector store APIs.
#[derive(Debug, Clone)]
pub struct OpenAIAssistantsClient {
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the OpenAI API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
    /// First delay when waiting on a file batch.
    pub(crate) batch_poll_initial: Duration,
    /// Cap on the exponential batch polling delay.
    pub(crate) batch_poll_max: Duration,
    /// Give up on a file batch after this long.
    pub(crate) batch_timeout: Duration,
}

impl OpenAIAssistantsClient {
    /// Creates a client from `OPENAI_API_KEY` (and `OPENAI_BASE_URL`, if set).
    ///
    /// # Errors
    /// Returns a `ServiceError` if the API key is not found in environment variables.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn from_env() -> Result<Self, ServiceError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ServiceError::AuthenticationError(
                "OPENAI_API_KEY environment variable not set".to_string(),
            )
        })?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self::with_base_url(api_key, base_url))
    }

    /// Creates a client with a custom API key against the public endpoint.
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom endpoint (proxies, test servers).
    #[must_use]
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            batch_poll_initial: Duration::from_secs(1),
            batch_poll_max: Duration::from_secs(10),
            batch_timeout: Duration::from_secs(300),
        }
    }

    /// Overrides the file batch polling delays.
    #[must_use]
    pub fn with_batch_polling(mut self, initial: Duration, max: Duration, timeout: Duration) -> Self {
        self.batch_poll_initial = initial;
        self.batch_poll_max = max;
        self.batch_timeout = timeout;
        self
    }

    /// The endpoint this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Starts an authenticated request against `path`.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Sends a request and decodes a successful JSON response.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|e| {
            error!(error = %e, operation, "Failed to send request to OpenAI API");
            ServiceError::RequestError(format!("Network error during {}: {}", operation, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                status = %status,
                error = %error_text,
                operation,
                "OpenAI API returned error status"
            );
            return Err(map_http_error(status, &error_text, operation));
        }

        response.json().await.map_err(|e| {
            error!(error = %e, operation, "Failed to parse OpenAI API response");
            ServiceError::SerializationError(format!(
                "Failed to parse {} response: {}",
                operation, e
            ))
        })
    }

    /// Collects every page of a cursor-paginated list endpoint.
    pub(crate) async fn list_all<T: DeserializeOwned + HasId>(
        &self,
        path: &str,
        extra_query: &[(&str, &str)],
        operation: &str,
    ) -> Result<Vec<T>, ServiceError> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let request = {
                let mut query: Vec<(&str, &str)> = vec![("limit", PAGE_LIMIT)];
                query.extend_from_slice(extra_query);
                if let Some(cursor) = after.as_deref() {
                    query.push(("after", cursor));
                }
                self.request(Method::GET, path).query(&query)
            };

            let page: ListPage<T> = self.send_json(request, operation).await?;
            let next = page.data.last().map(|item| item.id().to_string());
            items.extend(page.data);

            match next {
                Some(cursor) if page.has_more => after = Some(cursor),
                _ => break,
            }
        }

        debug!(count = items.len(), operation, "Listed items");
        Ok(items)
    }
}

/// Builds the body of an assistant creation request from an agent config.
pub(crate) fn build_assistant_request(config: &AgentConfig) -> AssistantRequest {
    let mut tools = Vec::new();
    if config.has(Capability::CodeExecution) {
        tools.push(json!({ "type": "code_interpreter" }));
    }
    if config.has(Capability::DocumentSearch) {
        tools.push(json!({
            "type": "file_search",
            "file_search": { "max_num_results": config.max_search_results }
        }));
    }

    let tool_resources = match (&config.index, config.has(Capability::DocumentSearch)) {
        (Some(index), true) => Some(json!({
            "file_search": { "vector_store_ids": [index.id.as_str()] }
        })),
        _ => None,
    };

    AssistantRequest {
        name: config.role.display_name().to_string(),
        instructions: config.instructions.clone(),
        model: config.model.name.clone(),
        tools,
        tool_resources,
        temperature: config.model.temperature,
        top_p: config.model.top_p,
    }
}

#[async_trait]
impl AssistantService for OpenAIAssistantsClient {
    async fn create_agent(&self, config: &AgentConfig) -> Result<AgentId, ServiceError> {
        debug!(role = %config.role, model = %config.model.name, "Creating assistant");

        let body = build_assistant_request(config);
        let created: IdOnly = self
            .send_json(self.request(Method::POST, "/assistants").json(&body), "create assistant")
            .await?;

        debug!(role = %config.role, agent_id = %created.id, "Assistant created");
        Ok(AgentId::new(created.id))
    }

    async fn delete_agent(&self, agent: &AgentId) -> Result<(), ServiceError> {
        debug!(agent_id = %agent, "Deleting assistant");

        let _: Value = self
            .send_json(
                self.request(Method::DELETE, &format!("/assistants/{}", agent)),
                "delete assistant",
            )
            .await?;
        Ok(())
    }

    async fn create_conversation(&self) -> Result<ConversationId, ServiceError> {
        let created: IdOnly = self
            .send_json(self.request(Method::POST, "/threads").json(&json!({})), "create thread")
            .await?;

        debug!(conversation_id = %created.id, "Thread created");
        Ok(ConversationId::new(created.id))
    }

    async fn post_message(
        &self,
        conversation: &ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ServiceError> {
        debug!(
            conversation_id = %conversation,
            role = role.as_str(),
            content_len = content.len(),
            "Posting message"
        );

        let body = json!({ "role": role.as_str(), "content": content });
        let _: IdOnly = self
            .send_json(
                self.request(Method::POST, &format!("/threads/{}/messages", conversation))
                    .json(&body),
                "create message",
            )
            .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        conversation: &ConversationId,
        agent: &AgentId,
    ) -> Result<Run, ServiceError> {
        let body = json!({ "assistant_id": agent.as_str() });
        let run: WireRun = self
            .send_json(
                self.request(Method::POST, &format!("/threads/{}/runs", conversation)).json(&body),
                "create run",
            )
            .await?;

        debug!(run_id = %run.id, status = %run.status, "Run created");
        Ok(run.into())
    }

    async fn fetch_run_status(&self, run: &Run) -> Result<RunStatus, ServiceError> {
        let current: WireRun = self
            .send_json(
                self.request(
                    Method::GET,
                    &format!("/threads/{}/runs/{}", run.conversation, run.id),
                ),
                "retrieve run",
            )
            .await?;
        Ok(current.status)
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ServiceError> {
        let messages: Vec<WireMessage> = self
            .list_all(
                &format!("/threads/{}/messages", conversation),
                &[("order", "asc")],
                "list messages",
            )
            .await?;
        Ok(messages.into_iter().map(Message::from).collect())
    }

    async fn list_run_steps(&self, run: &Run) -> Result<Vec<RunStep>, ServiceError> {
        let steps: Vec<WireStep> = self
            .list_all(
                &format!("/threads/{}/runs/{}/steps", run.conversation, run.id),
                &[("order", "asc"), ("include[]", FILE_SEARCH_CONTENT)],
                "list run steps",
            )
            .await?;
        Ok(steps.into_iter().map(RunStep::from).collect())
    }
}

/// Maps HTTP status codes to appropriate ServiceError variants.
pub(crate) fn map_http_error(status: StatusCode, error_text: &str, operation: &str) -> ServiceError {
    match status.as_u16() {
        401 | 403 => ServiceError::AuthenticationError(format!(
            "Authentication failed for {}: {}",
            operation, error_text
        )),
        404 => ServiceError::NotFound(format!("Not found for {}: {}", operation, error_text)),
        402 | 429 => ServiceError::QuotaExceeded {
            message: Some(format!("{} rejected: {}", operation, error_text)),
        },
        code => ServiceError::ApiError {
            status: code,
            message: format!("{} failed: {}", operation, error_text),
        },
    }
}

// OpenAI API request/response structures

pub(crate) trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Serialize)]
pub(crate) struct AssistantRequest {
    pub(crate) name: String,
    pub(crate) instructions: String,
    pub(crate) model: String,
    pub(crate) tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tool_resources: Option<Value>,
    pub(crate) temperature: f32,
    pub(crate) top_p: f32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdOnly {
    pub(crate) id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListPage<T> {
    pub(crate) data: Vec<T>,
    #[serde(default)]
    pub(crate) has_more: bool,
}

#[derive(Debug, Deserialize)]
struct WireRun {
    id: String,
    thread_id: String,
    assistant_id: String,
    status: RunStatus,
}

impl From<WireRun> for Run {
    fn from(run: WireRun) -> Self {
        Self {
            id: RunId::new(run.id),
            conversation: ConversationId::new(run.thread_id),
            agent: AgentId::new(run.assistant_id),
            status: run.status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    role: MessageRole,
    content: WireContent,
    #[serde(default)]
    created_at: i64,
}

impl HasId for WireMessage {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Content arrives either as a bare string or as a list of typed parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Deserialize)]
struct WirePart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<WireText>,
    image_file: Option<WireImageFile>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    value: String,
}

#[derive(Debug, Deserialize)]
struct WireImageFile {
    file_id: String,
}

impl From<WirePart> for ContentPart {
    fn from(part: WirePart) -> Self {
        match (part.kind.as_str(), part.text, part.image_file) {
            ("text", Some(text), _) => Self::Text { value: text.value },
            ("image_file", _, Some(image)) => Self::ImageFile { file_id: image.file_id },
            _ => Self::Other { kind: part.kind },
        }
    }
}

impl From<WireMessage> for Message {
    fn from(message: WireMessage) -> Self {
        let content = match message.content {
            WireContent::Text(text) => MessageContent::Text(text),
            WireContent::Parts(parts) => {
                MessageContent::Structured(parts.into_iter().map(ContentPart::from).collect())
            }
        };
        Self { role: message.role, content, created_at: message.created_at }
    }
}

#[derive(Debug, Deserialize)]
struct WireStep {
    id: String,
    step_details: WireStepDetails,
}

impl HasId for WireStep {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Deserialize)]
struct WireStepDetails {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(rename = "type")]
    kind: String,
    file_search: Option<WireFileSearch>,
    code_interpreter: Option<WireCodeInterpreter>,
}

#[derive(Debug, Deserialize)]
struct WireFileSearch {
    #[serde(default)]
    results: Vec<WireSearchResult>,
}

#[derive(Debug, Deserialize)]
struct WireCodeInterpreter {
    #[serde(default)]
    input: String,
}

#[derive(Debug, Deserialize)]
struct WireSearchResult {
    file_id: String,
    file_name: Option<String>,
    score: Option<f64>,
    #[serde(default)]
    content: Vec<WireResultContent>,
}

#[derive(Debug, Deserialize)]
struct WireResultContent {
    text: Option<String>,
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        match (call.kind.as_str(), call.file_search, call.code_interpreter) {
            ("file_search", Some(search), _) => Self::FileSearch {
                results: search
                    .results
                    .into_iter()
                    .map(|result| SearchHit {
                        file_id: result.file_id,
                        file_name: result.file_name,
                        score: result.score,
                        snippet: result.content.into_iter().find_map(|c| c.text),
                    })
                    .collect(),
            },
            ("code_interpreter", _, Some(code)) => Self::CodeInterpreter { input: code.input },
            _ => Self::Other { kind: call.kind },
        }
    }
}

impl From<WireStep> for RunStep {
    fn from(step: WireStep) -> Self {
        let details = if step.step_details.kind == "tool_calls" {
            StepDetails::ToolCalls(
                step.step_details.tool_calls.into_iter().map(ToolCall::from).collect(),
            )
        } else {
            StepDetails::MessageCreation
        };
        Self { id: step.id, details }
    }
}
