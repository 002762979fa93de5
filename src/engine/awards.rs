//! Metric awards
//!
//! Entry point for points earned from performance metrics. Awards pass
//! through the cap windows before the ledger; a refused award is trimmed
//! to the remaining headroom.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::agents::AgentRegistry;
use super::caps::CapEnforcer;
use super::clock::Clock;
use super::ledger::Ledger;
use super::locks::{AgentGuard, AgentLocks};
use crate::domain::{Currency, IdempotencyKey, TxSource};
use crate::error::{EconomyError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AwardReceipt {
    pub agent_id: String,
    pub requested: i64,
    pub points: i64,
    pub xp: i64,
    /// Points were trimmed to fit a cap
    pub partial: bool,
    /// The reference was already awarded; nothing new was written
    pub replayed: bool,
    pub balance: i64,
}

pub struct MetricAwarder {
    agents: Arc<AgentRegistry>,
    ledger: Arc<Ledger>,
    caps: Arc<CapEnforcer>,
    locks: Arc<AgentLocks>,
    clock: Arc<dyn Clock>,
    points_per_xp: i64,
}

impl MetricAwarder {
    pub fn new(
        agents: Arc<AgentRegistry>,
        ledger: Arc<Ledger>,
        caps: Arc<CapEnforcer>,
        locks: Arc<AgentLocks>,
        clock: Arc<dyn Clock>,
        points_per_xp: i64,
    ) -> Self {
        Self {
            agents,
            ledger,
            caps,
            locks,
            clock,
            points_per_xp,
        }
    }

    pub fn xp_for(&self, points: i64) -> i64 {
        points / self.points_per_xp.max(1)
    }

    /// Award `points` for the metric event `reference_id`.
    pub async fn award(&self, agent_id: &str, points: i64, reference_id: &str) -> Result<AwardReceipt> {
        if points < 0 {
            return Err(EconomyError::InvalidAmount(points));
        }
        if reference_id.trim().is_empty() {
            return Err(EconomyError::Validation("reference id must not be empty".to_string()));
        }

        self.agents.require_active(agent_id).await?;
        if points == 0 {
            return Ok(AwardReceipt {
                agent_id: agent_id.to_string(),
                requested: 0,
                points: 0,
                xp: 0,
                partial: false,
                replayed: false,
                balance: self.ledger.balance(agent_id, Currency::Points).await?,
            });
        }

        let guard = self.locks.acquire(agent_id).await?;
        self.credit_earned(&guard, points, TxSource::MetricAward, reference_id, true)
            .await
    }

    /// Credit earned points plus their XP under the caps. With
    /// `allow_partial`, a refused amount is trimmed to the headroom left.
    pub(crate) async fn credit_earned(
        &self,
        guard: &AgentGuard,
        requested: i64,
        source: TxSource,
        reference_id: &str,
        allow_partial: bool,
    ) -> Result<AwardReceipt> {
        let agent_id = guard.agent_id();
        let points_key = IdempotencyKey::new(agent_id, source, reference_id);
        let xp_key = IdempotencyKey::new(agent_id, source, &format!("{}:xp", reference_id));

        if let Some(existing) = self.ledger.find(&points_key).await? {
            let xp = self
                .ledger
                .find(&xp_key)
                .await?
                .map(|tx| tx.amount)
                .unwrap_or(0);
            debug!(agent = agent_id, reference = reference_id, "award replay");
            return Ok(AwardReceipt {
                agent_id: agent_id.to_string(),
                requested,
                points: existing.amount,
                xp,
                partial: existing.amount < requested,
                replayed: true,
                balance: self.ledger.balance(agent_id, Currency::Points).await?,
            });
        }

        let now = self.clock.now();
        let (hold, points) = match self.caps.reserve_all(agent_id, requested, now).await? {
            Ok(hold) => (hold, requested),
            Err(denial) if allow_partial && denial.remaining > 0 => {
                let headroom = self
                    .caps
                    .headroom(agent_id, now)
                    .await?
                    .unwrap_or(denial.remaining)
                    .min(requested);
                match self.caps.reserve_all(agent_id, headroom, now).await? {
                    Ok(hold) => {
                        warn!(
                            agent = agent_id,
                            requested,
                            awarded = headroom,
                            period = denial.period.as_str(),
                            "award trimmed to cap"
                        );
                        (hold, headroom)
                    }
                    Err(denial) => return Err(denial.into_error(requested)),
                }
            }
            Err(denial) => {
                warn!(
                    agent = agent_id,
                    requested,
                    period = denial.period.as_str(),
                    "award refused by cap"
                );
                return Err(denial.into_error(requested));
            }
        };

        if let Err(e) = self
            .ledger
            .credit_held(guard, Currency::Points, points, source, points_key)
            .await
        {
            self.caps.release(&hold).await?;
            return Err(e);
        }

        let xp = self.xp_for(points);
        if xp > 0 {
            self.ledger
                .credit_held(guard, Currency::Xp, xp, source, xp_key)
                .await?;
        }

        let balance = self.ledger.balance(agent_id, Currency::Points).await?;
        info!(
            agent = agent_id,
            source = source.as_str(),
            reference = reference_id,
            points,
            xp,
            balance,
            "points awarded"
        );
        Ok(AwardReceipt {
            agent_id: agent_id.to_string(),
            requested,
            points,
            xp,
            partial: points < requested,
            replayed: false,
            balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EconomyStore, MemoryStore};
    use crate::config::{CapLimit, CapsConfig};
    use crate::engine::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn awarder(daily: i64) -> MetricAwarder {
        let store: Arc<dyn EconomyStore> = Arc::new(MemoryStore::new());
        let locks = Arc::new(AgentLocks::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 21, 8, 0, 0).unwrap(),
        ));
        let caps = CapsConfig {
            daily: CapLimit {
                enabled: true,
                cap: daily,
            },
            ..CapsConfig::default()
        };
        MetricAwarder::new(
            Arc::new(AgentRegistry::new(store.clone())),
            Arc::new(Ledger::new(store.clone(), locks.clone(), clock.clone())),
            Arc::new(CapEnforcer::new(store, caps)),
            locks,
            clock,
            10,
        )
    }

    #[tokio::test]
    async fn test_award_credits_points_and_xp() {
        let awarder = awarder(500);
        let receipt = awarder.award("amy", 120, "qa-2026-10-21").await.unwrap();
        assert_eq!(receipt.points, 120);
        assert_eq!(receipt.xp, 12);
        assert!(!receipt.partial);
        assert_eq!(awarder.ledger.balance("amy", Currency::Xp).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_award_trimmed_to_headroom() {
        let awarder = awarder(500);
        awarder.award("amy", 450, "aht-1").await.unwrap();
        let trimmed = awarder.award("amy", 200, "aht-2").await.unwrap();
        assert!(trimmed.partial);
        assert_eq!(trimmed.points, 50);
        assert_eq!(trimmed.balance, 500);

        let err = awarder.award("amy", 10, "aht-3").await.unwrap_err();
        assert!(matches!(err, EconomyError::CapExceeded { .. }));
    }

    #[tokio::test]
    async fn test_award_replay_writes_nothing() {
        let awarder = awarder(500);
        awarder.award("amy", 100, "nps-7").await.unwrap();
        let again = awarder.award("amy", 100, "nps-7").await.unwrap();
        assert!(again.replayed);
        assert_eq!(again.balance, 100);
        assert_eq!(awarder.ledger.history("amy").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_award_records_nothing() {
        let awarder = awarder(500);
        let receipt = awarder.award("amy", 0, "noop").await.unwrap();
        assert_eq!(receipt.points, 0);
        assert!(awarder.ledger.history("amy").await.unwrap().is_empty());
    }
}
