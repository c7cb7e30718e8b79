//! Agent registry for the two pipeline roles.
//!
//! The registry owns one remote agent per role, created once and reused for
//! any number of pipeline executions. Agents are looked up by role, never by
//! position.

use crate::error::{PipelineError, Result};
use tandem_abstraction::{AgentConfig, AgentId, AssistantService, IndexReference, Role};
use tracing::{debug, info, warn};

/// Builds the configuration for `role` with that role's default tools.
pub fn configure_agent(
    role: Role,
    instructions: impl Into<String>,
    index: Option<IndexReference>,
) -> AgentConfig {
    let config = match role {
        Role::Planner => AgentConfig::planner(instructions),
        Role::Coder => AgentConfig::coder(instructions),
    };
    match index {
        Some(index) => config.with_index(index),
        None => config,
    }
}

/// An agent known to the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredAgent {
    /// Handle issued by the service.
    pub id: AgentId,
    /// Configuration it was created with.
    pub config: AgentConfig,
}

impl RegisteredAgent {
    /// The pipeline slot this agent fills.
    pub fn role(&self) -> Role {
        self.config.role
    }
}

/// The planner and coder agents of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRegistry {
    planner: RegisteredAgent,
    coder: RegisteredAgent,
}

impl AgentRegistry {
    /// Creates both agents on the service.
    ///
    /// If the coder cannot be created, the already created planner is
    /// removed again before the error is returned.
    pub async fn create(
        service: &dyn AssistantService,
        planner: AgentConfig,
        coder: AgentConfig,
    ) -> Result<Self> {
        expect_role(Role::Planner, planner.role)?;
        expect_role(Role::Coder, coder.role)?;

        let planner_id = service.create_agent(&planner).await.map_err(|e| {
            PipelineError::Provisioning(format!("failed to create planner agent: {}", e))
        })?;
        info!(agent_id = %planner_id, "Planner agent created");

        let coder_id = match service.create_agent(&coder).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = service.delete_agent(&planner_id).await {
                    warn!(agent_id = %planner_id, error = %cleanup, "Failed to remove planner agent");
                }
                return Err(PipelineError::Provisioning(format!(
                    "failed to create coder agent: {}",
                    e
                )));
            }
        };
        info!(agent_id = %coder_id, "Coder agent created");

        Ok(Self {
            planner: RegisteredAgent { id: planner_id, config: planner },
            coder: RegisteredAgent { id: coder_id, config: coder },
        })
    }

    /// Wraps agents that already exist on the service.
    pub fn from_existing(planner: RegisteredAgent, coder: RegisteredAgent) -> Result<Self> {
        expect_role(Role::Planner, planner.role())?;
        expect_role(Role::Coder, coder.role())?;
        Ok(Self { planner, coder })
    }

    /// Looks up the agent for `role`.
    pub fn get(&self, role: Role) -> &RegisteredAgent {
        match role {
            Role::Planner => &self.planner,
            Role::Coder => &self.coder,
        }
    }

    pub fn planner(&self) -> &RegisteredAgent {
        &self.planner
    }

    pub fn coder(&self) -> &RegisteredAgent {
        &self.coder
    }

    /// Deletes both agents from the service.
    ///
    /// Both deletions are attempted; the first failure is returned.
    pub async fn delete_all(self, service: &dyn AssistantService) -> Result<()> {
        let mut first_error = None;

        for agent in [self.planner, self.coder] {
            debug!(role = %agent.role(), agent_id = %agent.id, "Deleting agent");
            if let Err(e) = service.delete_agent(&agent.id).await {
                warn!(role = %agent.role(), agent_id = %agent.id, error = %e, "Failed to delete agent");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        first_error.map_or(Ok(()), |e| Err(PipelineError::Service(e)))
    }
}

pub(crate) fn expect_role(expected: Role, found: Role) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(PipelineError::RoleMismatch { expected, found })
    }
}
