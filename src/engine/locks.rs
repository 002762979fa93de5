//! Per-agent serialization
//!
//! Every mutation of one agent's ledger or cap windows runs while holding
//! that agent's guard. Different agents never contend.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::error::{EconomyError, Result};

/// Proof that the holder is the single writer for `agent_id`
pub struct AgentGuard {
    agent_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl AgentGuard {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

pub struct AgentLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl AgentLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Wait for the agent's lock, failing with a retryable
    /// `ConcurrencyConflict` after the configured timeout.
    pub async fn acquire(&self, agent_id: &str) -> Result<AgentGuard> {
        let lock = self
            .locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(AgentGuard {
                agent_id: agent_id.to_string(),
                _guard: guard,
            }),
            Err(_) => {
                warn!(agent = agent_id, "timed out waiting for agent lock");
                Err(EconomyError::ConcurrencyConflict(format!(
                    "agent {} is busy",
                    agent_id
                )))
            }
        }
    }
}

impl Default for AgentLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_agent_times_out_while_held() {
        let locks = AgentLocks::new(Duration::from_millis(20));
        let _held = locks.acquire("a").await.unwrap();

        let err = locks.acquire("a").await.err().unwrap();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_different_agents_do_not_contend() {
        let locks = AgentLocks::new(Duration::from_millis(20));
        let _a = locks.acquire("a").await.unwrap();
        let b = locks.acquire("b").await.unwrap();
        assert_eq!(b.agent_id(), "b");
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let locks = AgentLocks::new(Duration::from_millis(20));
        drop(locks.acquire("a").await.unwrap());
        assert!(locks.acquire("a").await.is_ok());
    }
}
