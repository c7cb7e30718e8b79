//! Data model shared by the service boundary and the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier issued by the remote service.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// Handle of a remote agent configuration.
    AgentId
);
opaque_id!(
    /// Handle of a remote conversation (ordered message log).
    ConversationId
);
opaque_id!(
    /// Handle of one execution of an agent against a conversation.
    RunId
);
opaque_id!(
    /// Handle of a managed document index.
    IndexId
);

/// The two pipeline roles. A pipeline always runs `Planner` then `Coder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Turns the user's request into a step-by-step plan.
    Planner,
    /// Turns the plan into code.
    Coder,
}

impl Role {
    /// Stage name used in errors and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Coder => "coder",
        }
    }

    /// Human-readable agent name registered with the remote service.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Planner => "Planner Agent",
            Self::Coder => "Coding Agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool capabilities an agent may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Search over the attached document index.
    DocumentSearch,
    /// Run code in a sandbox hosted by the service.
    CodeExecution,
}

/// Sampling parameters for the underlying language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model name (e.g. "gpt-4o-mini").
    pub name: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
}

impl ModelSettings {
    /// Settings for `name` with deterministic sampling.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), temperature: 0.0, top_p: 1.0 }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::new("gpt-4o-mini")
    }
}

/// Reference to a provisioned document index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReference {
    /// Service-issued identifier.
    pub id: IndexId,
    /// Name given at creation time, if the service reports one.
    pub name: Option<String>,
    /// Number of files the service reports as indexed.
    pub file_count: u64,
}

impl IndexReference {
    /// Reference with only an identifier known.
    pub fn new(id: impl Into<IndexId>) -> Self {
        Self { id: id.into(), name: None, file_count: 0 }
    }
}

/// How the service splits uploaded documents before embedding them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingPolicy {
    /// Maximum tokens per chunk.
    pub max_chunk_size_tokens: u32,
    /// Tokens shared between consecutive chunks.
    pub chunk_overlap_tokens: u32,
}

impl ChunkingPolicy {
    /// Checks the bounds the service enforces: a chunk of 100..=4096 tokens
    /// and an overlap of at most half a chunk.
    pub fn validate(&self) -> Result<(), String> {
        if !(100..=4096).contains(&self.max_chunk_size_tokens) {
            return Err(format!(
                "max_chunk_size_tokens must be between 100 and 4096, got {}",
                self.max_chunk_size_tokens
            ));
        }
        if self.chunk_overlap_tokens > self.max_chunk_size_tokens / 2 {
            return Err(format!(
                "chunk_overlap_tokens ({}) must not exceed half of max_chunk_size_tokens ({})",
                self.chunk_overlap_tokens, self.max_chunk_size_tokens
            ));
        }
        Ok(())
    }
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self { max_chunk_size_tokens: 400, chunk_overlap_tokens: 200 }
    }
}

/// Outcome of uploading a batch of files into an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Service-issued batch identifier.
    pub batch_id: String,
    /// Files indexed successfully.
    pub completed: u64,
    /// Files the service failed to index.
    pub failed: u64,
}

/// Configuration of one agent. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Which pipeline slot this agent fills.
    pub role: Role,
    /// System instructions.
    pub instructions: String,
    /// Granted tool capabilities.
    pub capabilities: BTreeSet<Capability>,
    /// Model and sampling parameters.
    pub model: ModelSettings,
    /// Upper bound on document-search hits per query.
    pub max_search_results: u32,
    /// Index searched by `DocumentSearch`.
    pub index: Option<IndexReference>,
}

impl AgentConfig {
    /// Planner defaults: document search only, up to 15 hits.
    pub fn planner(instructions: impl Into<String>) -> Self {
        Self {
            role: Role::Planner,
            instructions: instructions.into(),
            capabilities: BTreeSet::from([Capability::DocumentSearch]),
            model: ModelSettings::default(),
            max_search_results: 15,
            index: None,
        }
    }

    /// Coder defaults: code execution plus document search, up to 5 hits.
    pub fn coder(instructions: impl Into<String>) -> Self {
        Self {
            role: Role::Coder,
            instructions: instructions.into(),
            capabilities: BTreeSet::from([Capability::CodeExecution, Capability::DocumentSearch]),
            model: ModelSettings::default(),
            max_search_results: 5,
            index: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: IndexReference) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn with_max_search_results(mut self, max: u32) -> Self {
        self.max_search_results = max;
        self
    }

    /// Whether the agent was granted `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Status of a run as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepted, not started.
    Queued,
    /// Executing.
    InProgress,
    /// Paused waiting for client-side tool outputs.
    RequiresAction,
    /// Cancellation requested, not yet effective.
    Cancelling,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before finishing.
    Cancelled,
    /// Ran past the service's deadline.
    Expired,
    /// Stopped early, e.g. on a token limit.
    Incomplete,
}

impl RunStatus {
    /// Whether the run can no longer change.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired | Self::Incomplete
        )
    }

    /// Whether moving from `self` to `to` is a forward transition.
    ///
    /// Terminal states are absorbing and nothing returns to `Queued`.
    /// `InProgress` and `RequiresAction` may alternate.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        if self == to {
            return true;
        }
        match self {
            s if s.is_terminal() => false,
            Self::Queued => true,
            Self::InProgress | Self::RequiresAction => to != Self::Queued,
            Self::Cancelling => to.is_terminal(),
            _ => false,
        }
    }

    /// Wire name, e.g. `in_progress`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of an agent against a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub conversation: ConversationId,
    pub agent: AgentId,
    /// Status as of the last fetch.
    pub status: RunStatus,
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One element of structured message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A block of text.
    Text { value: String },
    /// A file produced by the agent, e.g. a plot.
    ImageFile { file_id: String },
    /// A part this crate does not interpret.
    Other { kind: String },
}

/// Message content, resolved once at the service boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// A list of typed parts.
    Structured(Vec<ContentPart>),
}

impl MessageContent {
    /// Text carried by the message: plain text as-is, or the first text part
    /// of structured content.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(parts) => parts.iter().find_map(|part| match part {
                ContentPart::Text { value } => Some(value.as_str()),
                _ => None,
            }),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
    /// Creation time in seconds since the Unix epoch.
    pub created_at: i64,
}

/// A single document-search hit recorded in a run step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file_id: String,
    pub file_name: Option<String>,
    pub score: Option<f64>,
    /// Matched text, when the service was asked to include it.
    pub snippet: Option<String>,
}

/// A tool invocation recorded in a run step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCall {
    FileSearch { results: Vec<SearchHit> },
    CodeInterpreter { input: String },
    Other { kind: String },
}

/// What a run step did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details", rename_all = "snake_case")]
pub enum StepDetails {
    MessageCreation,
    ToolCalls(Vec<ToolCall>),
}

/// One step of a run, used for inspecting how an agent reached its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    pub id: String,
    pub details: StepDetails,
}
