//! Pipeline orchestration for Tandem.
//!
//! A user prompt goes to a planner agent; the planner's answer becomes the
//! sole input of a coder agent, and the coder's answer is the result. Both
//! agents search the same document index.

pub mod error;
pub mod instructions;
pub mod pipeline;
pub mod poller;
pub mod provisioner;
pub mod registry;

pub use error::{PipelineError, Result};
pub use instructions::{load_instructions, parse_instructions, InstructionDocument};
pub use pipeline::{PipelineOrchestrator, PipelineResult, PipelineTrace};
pub use poller::{PollError, PollerConfig, RunPoller};
pub use provisioner::{discover_files, IndexProvisioner, DEFAULT_INDEX_NAME};
pub use registry::{configure_agent, AgentRegistry, RegisteredAgent};
