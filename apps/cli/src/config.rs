//! CLI configuration file support.
//!
//! Configuration precedence:
//! 1. CLI arguments (handled by clap)
//! 2. Local config file (./tandem.toml), or the file given with `--config`
//! 3. Global config file (~/.tandem/config.toml)
//! 4. Defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tandem_abstraction::{ChunkingPolicy, ModelSettings};
use tandem_orchestrator::{DEFAULT_INDEX_NAME, PollerConfig};
use thiserror::Error;

/// Tandem configuration. Every unset field falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TandemConfig {
    /// Model used by both agents
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub top_p: Option<f32>,

    /// Directory whose files are uploaded into a new index
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Name given to newly provisioned indexes
    #[serde(default)]
    pub index_name: Option<String>,

    /// Reuse this index instead of provisioning one
    #[serde(default)]
    pub index_id: Option<String>,

    #[serde(default)]
    pub chunking: ChunkingSection,

    /// Instruction document of the planner agent
    #[serde(default)]
    pub planner_instructions: Option<PathBuf>,

    /// Instruction document of the coder agent
    #[serde(default)]
    pub coder_instructions: Option<PathBuf>,

    #[serde(default)]
    pub planner_max_search_results: Option<u32>,

    #[serde(default)]
    pub coder_max_search_results: Option<u32>,

    #[serde(default)]
    pub poll: PollSection,

    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,
}

/// `[chunking]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingSection {
    #[serde(default)]
    pub max_chunk_size_tokens: Option<u32>,
    #[serde(default)]
    pub chunk_overlap_tokens: Option<u32>,
}

/// `[poll]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSection {
    #[serde(default)]
    pub interval_ms: Option<u64>,
    /// No timeout when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub fetch_retries: Option<u32>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

impl TandemConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".tandem")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("tandem.toml")
    }

    /// Loads the global config, then `explicit` (or the local config when
    /// no explicit path is given) on top of it.
    ///
    /// Missing discovered files are skipped; an explicit file must exist and
    /// parse. A discovered file that exists but does not parse is an error.
    pub fn discover_and_load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(global) = Self::load_optional(&Self::default_global_path())? {
            config.merge(&global);
        }

        match explicit {
            Some(path) => config.merge(&Self::load_from_file(path)?),
            None => {
                if let Some(local) = Self::load_optional(&Self::default_local_path())? {
                    config.merge(&local);
                }
            }
        }

        Ok(config)
    }

    fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        match Self::load_from_file(path) {
            Ok(config) => Ok(Some(config)),
            Err(ConfigError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &Self) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        take(&mut self.model, &other.model);
        take(&mut self.temperature, &other.temperature);
        take(&mut self.top_p, &other.top_p);
        take(&mut self.data_dir, &other.data_dir);
        take(&mut self.index_name, &other.index_name);
        take(&mut self.index_id, &other.index_id);
        take(&mut self.chunking.max_chunk_size_tokens, &other.chunking.max_chunk_size_tokens);
        take(&mut self.chunking.chunk_overlap_tokens, &other.chunking.chunk_overlap_tokens);
        take(&mut self.planner_instructions, &other.planner_instructions);
        take(&mut self.coder_instructions, &other.coder_instructions);
        take(&mut self.planner_max_search_results, &other.planner_max_search_results);
        take(&mut self.coder_max_search_results, &other.coder_max_search_results);
        take(&mut self.poll.interval_ms, &other.poll.interval_ms);
        take(&mut self.poll.timeout_secs, &other.poll.timeout_secs);
        take(&mut self.poll.fetch_retries, &other.poll.fetch_retries);
        take(&mut self.poll.retry_backoff_ms, &other.poll.retry_backoff_ms);
        take(&mut self.log_level, &other.log_level);
    }

    pub fn model_settings(&self) -> ModelSettings {
        let defaults = ModelSettings::default();
        ModelSettings {
            name: self.model.clone().unwrap_or(defaults.name),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn index_name(&self) -> String {
        self.index_name.clone().unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string())
    }

    pub fn chunking_policy(&self) -> ChunkingPolicy {
        let defaults = ChunkingPolicy::default();
        ChunkingPolicy {
            max_chunk_size_tokens: self
                .chunking
                .max_chunk_size_tokens
                .unwrap_or(defaults.max_chunk_size_tokens),
            chunk_overlap_tokens: self
                .chunking
                .chunk_overlap_tokens
                .unwrap_or(defaults.chunk_overlap_tokens),
        }
    }

    pub fn planner_instructions(&self) -> PathBuf {
        self.planner_instructions
            .clone()
            .unwrap_or_else(|| PathBuf::from("agents/planner_instruct.yaml"))
    }

    pub fn coder_instructions(&self) -> PathBuf {
        self.coder_instructions.clone().unwrap_or_else(|| PathBuf::from("agents/coder_instruct.yaml"))
    }

    pub fn planner_max_search_results(&self) -> u32 {
        self.planner_max_search_results.unwrap_or(15)
    }

    pub fn coder_max_search_results(&self) -> u32 {
        self.coder_max_search_results.unwrap_or(5)
    }

    pub fn poller_config(&self) -> PollerConfig {
        let defaults = PollerConfig::default();
        PollerConfig {
            interval: self.poll.interval_ms.map_or(defaults.interval, Duration::from_millis),
            timeout: self.poll.timeout_secs.map(Duration::from_secs),
            fetch_retries: self.poll.fetch_retries.unwrap_or(defaults.fetch_retries),
            retry_backoff: self
                .poll
                .retry_backoff_ms
                .map_or(defaults.retry_backoff, Duration::from_millis),
        }
    }
}
