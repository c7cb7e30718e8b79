//! Command implementations.

pub mod index;
pub mod run;

use anyhow::{Context, Result};
use std::sync::Arc;
use tandem_models::OpenAIAssistantsClient;

/// Builds the service client from the environment.
pub(crate) fn connect() -> Result<Arc<OpenAIAssistantsClient>> {
    let client = OpenAIAssistantsClient::from_env()
        .context("Set OPENAI_API_KEY to talk to the assistants service")?;
    Ok(Arc::new(client))
}
