// Instruction documents for the pipeline agents.

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// A YAML document carrying an agent's system instructions.
///
/// ```yaml
/// instructions: |
///   You are a cosmology planner. Break the task into numbered steps.
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct InstructionDocument {
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Parses an instruction document and returns its non-empty `instructions`.
pub fn parse_instructions(source: &str, path: &Path) -> Result<String> {
    let document: InstructionDocument =
        serde_yaml::from_str(source).map_err(|e| PipelineError::Instructions {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    match document.instructions {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(PipelineError::Instructions {
            path: path.display().to_string(),
            reason: "missing or empty `instructions` key".to_string(),
        }),
    }
}

/// Reads the instruction document at `path`.
pub fn load_instructions(path: &Path) -> Result<String> {
    let source = fs::read_to_string(path).map_err(|e| PipelineError::Instructions {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let instructions = parse_instructions(&source, path)?;
    debug!(path = %path.display(), len = instructions.len(), "Loaded instructions");
    Ok(instructions)
}
