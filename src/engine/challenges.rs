use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::agents::AgentRegistry;
use super::awards::{AwardReceipt, MetricAwarder};
use super::locks::AgentLocks;
use crate::adapters::EconomyStore;
use crate::config::ChallengeConfig;
use crate::domain::TxSource;
use crate::error::{EconomyError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub bonus_points: i64,
}

impl From<&ChallengeConfig> for Challenge {
    fn from(config: &ChallengeConfig) -> Self {
        Self {
            id: config.id.clone(),
            title: config.title.clone(),
            bonus_points: config.bonus_points,
        }
    }
}

/// Opt-in challenges paying a one-time bonus on completion
pub struct ChallengeBoard {
    store: Arc<dyn EconomyStore>,
    agents: Arc<AgentRegistry>,
    awarder: Arc<MetricAwarder>,
    locks: Arc<AgentLocks>,
    challenges: Vec<Challenge>,
}

impl ChallengeBoard {
    pub fn new(
        store: Arc<dyn EconomyStore>,
        agents: Arc<AgentRegistry>,
        awarder: Arc<MetricAwarder>,
        locks: Arc<AgentLocks>,
        challenges: &[ChallengeConfig],
    ) -> Self {
        Self {
            store,
            agents,
            awarder,
            locks,
            challenges: challenges.iter().map(Challenge::from).collect(),
        }
    }

    pub fn list(&self) -> &[Challenge] {
        &self.challenges
    }

    pub fn get(&self, challenge_id: &str) -> Result<&Challenge> {
        self.challenges
            .iter()
            .find(|c| c.id == challenge_id)
            .ok_or_else(|| EconomyError::NotFound(format!("challenge {}", challenge_id)))
    }

    /// Returns true on first acceptance; repeats are harmless
    pub async fn accept(&self, agent_id: &str, challenge_id: &str) -> Result<bool> {
        self.get(challenge_id)?;
        self.agents.require_active(agent_id).await?;

        let first = self.store.accept_challenge(agent_id, challenge_id).await?;
        if first {
            info!(agent = agent_id, challenge = challenge_id, "challenge accepted");
        }
        Ok(first)
    }

    /// Pay the bonus for an accepted challenge, once
    pub async fn complete(&self, agent_id: &str, challenge_id: &str) -> Result<AwardReceipt> {
        let challenge = self.get(challenge_id)?;
        self.agents.require_active(agent_id).await?;
        if !self
            .store
            .has_accepted_challenge(agent_id, challenge_id)
            .await?
        {
            return Err(EconomyError::Forbidden(format!(
                "agent {} has not accepted challenge {}",
                agent_id, challenge_id
            )));
        }

        let guard = self.locks.acquire(agent_id).await?;
        self.awarder
            .credit_earned(
                &guard,
                challenge.bonus_points,
                TxSource::ChallengeBonus,
                challenge_id,
                false,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::config::CapsConfig;
    use crate::engine::caps::CapEnforcer;
    use crate::engine::clock::SystemClock;
    use crate::engine::ledger::Ledger;

    fn board() -> ChallengeBoard {
        let store: Arc<dyn EconomyStore> = Arc::new(MemoryStore::new());
        let locks = Arc::new(AgentLocks::default());
        let clock = Arc::new(SystemClock);
        let agents = Arc::new(AgentRegistry::new(store.clone()));
        let awarder = Arc::new(MetricAwarder::new(
            agents.clone(),
            Arc::new(Ledger::new(store.clone(), locks.clone(), clock.clone())),
            Arc::new(CapEnforcer::new(store.clone(), CapsConfig::default())),
            locks.clone(),
            clock,
            10,
        ));
        let challenges = vec![ChallengeConfig {
            id: "qa-streak".to_string(),
            title: "Five perfect QA scores".to_string(),
            bonus_points: 150,
        }];
        ChallengeBoard::new(store, agents, awarder, locks, &challenges)
    }

    #[tokio::test]
    async fn test_accept_is_idempotent() {
        let board = board();
        assert!(board.accept("amy", "qa-streak").await.unwrap());
        assert!(!board.accept("amy", "qa-streak").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_challenge() {
        let board = board();
        assert!(matches!(
            board.accept("amy", "nope").await,
            Err(EconomyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_requires_acceptance_and_pays_once() {
        let board = board();
        assert!(matches!(
            board.complete("amy", "qa-streak").await,
            Err(EconomyError::Forbidden(_))
        ));

        board.accept("amy", "qa-streak").await.unwrap();
        let paid = board.complete("amy", "qa-streak").await.unwrap();
        assert_eq!(paid.points, 150);
        assert_eq!(paid.xp, 15);

        let again = board.complete("amy", "qa-streak").await.unwrap();
        assert!(again.replayed);
        assert_eq!(again.balance, 150);
    }
}
