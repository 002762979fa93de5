use std::sync::Arc;
use tracing::info;

use crate::adapters::EconomyStore;
use crate::domain::Agent;
use crate::error::{EconomyError, Result};

/// Agents are created on first sight and never deleted, only deactivated.
pub struct AgentRegistry {
    store: Arc<dyn EconomyStore>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn EconomyStore>) -> Self {
        Self { store }
    }

    pub async fn register(
        &self,
        agent_id: &str,
        display_name: &str,
        department: Option<&str>,
    ) -> Result<Agent> {
        let agent_id = agent_id.trim();
        if agent_id.is_empty() {
            return Err(EconomyError::Validation("agent id must not be empty".to_string()));
        }

        let name = if display_name.trim().is_empty() {
            agent_id
        } else {
            display_name.trim()
        };
        let mut agent = Agent::new(agent_id, name);
        if let Some(dept) = department.filter(|d| !d.trim().is_empty()) {
            agent = agent.with_department(dept.trim());
        }

        let stored = self.store.upsert_agent(&agent).await?;
        info!(agent = %stored.id, department = ?stored.department, "agent registered");
        Ok(stored)
    }

    /// Fetch the agent, registering it under its id if unknown
    pub async fn ensure(&self, agent_id: &str) -> Result<Agent> {
        match self.store.get_agent(agent_id).await? {
            Some(agent) => Ok(agent),
            None => self.register(agent_id, agent_id, None).await,
        }
    }

    /// [`AgentRegistry::ensure`], refusing deactivated agents
    pub async fn require_active(&self, agent_id: &str) -> Result<Agent> {
        let agent = self.ensure(agent_id).await?;
        if !agent.active {
            return Err(EconomyError::Forbidden(format!(
                "agent {} is deactivated",
                agent_id
            )));
        }
        Ok(agent)
    }

    pub async fn get(&self, agent_id: &str) -> Result<Agent> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| EconomyError::NotFound(format!("agent {}", agent_id)))
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<Agent>> {
        self.store.list_agents(active_only).await
    }

    pub async fn deactivate(&self, agent_id: &str) -> Result<()> {
        if !self.store.set_agent_active(agent_id, false).await? {
            return Err(EconomyError::NotFound(format!("agent {}", agent_id)));
        }
        info!(agent = agent_id, "agent deactivated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let registry = AgentRegistry::new(Arc::new(MemoryStore::new()));
        let first = registry.ensure("amy").await.unwrap();
        let again = registry.ensure("amy").await.unwrap();
        assert_eq!(first.created_at, again.created_at);
        assert_eq!(registry.list(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deactivated_agent_is_refused() {
        let registry = AgentRegistry::new(Arc::new(MemoryStore::new()));
        registry.register("bo", "Bo", Some("Support")).await.unwrap();
        registry.deactivate("bo").await.unwrap();

        let err = registry.require_active("bo").await.unwrap_err();
        assert!(matches!(err, EconomyError::Forbidden(_)));
        assert!(registry.list(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_unknown_agent() {
        let registry = AgentRegistry::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            registry.deactivate("ghost").await,
            Err(EconomyError::NotFound(_))
        ));
    }
}
