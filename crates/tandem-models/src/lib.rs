//! Service implementations for Tandem.
//!
//! This crate provides concrete implementations of `AssistantService` and
//! `DocumentIndexService`.
//!
//! # Supported Backends
//!
//! - **OpenAI**: assistants v2 and vector stores (API key required)
//! - **Mock**: scripted, in-memory; for tests and offline runs

pub mod mock;
pub mod openai;
pub mod vector_store;

pub use mock::{AgentScript, MockAssistantService, RecordedCall};
pub use openai::OpenAIAssistantsClient;
