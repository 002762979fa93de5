//! Tier Engine
//!
//! Ranks active agents by net XP inside a finished cycle and assigns
//! promotion/safe/demotion bands. A cycle is written once; recomputing it
//! returns the stored assignments. Cycles older than the newest written
//! one are refused.

use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::clock::Clock;
use crate::adapters::EconomyStore;
use crate::config::TierConfig;
use crate::domain::{Agent, Currency, CycleId, Tier, TierAssignment, TransitionType};
use crate::error::{EconomyError, Result};

/// Ranking input for one agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub agent_id: String,
    pub current_tier: usize,
    pub cycle_xp: i64,
    pub lifetime_points: i64,
}

/// Cycle XP descending, then lifetime points descending, then agent id
pub fn compare_standings(a: &Standing, b: &Standing) -> Ordering {
    b.cycle_xp
        .cmp(&a.cycle_xp)
        .then_with(|| b.lifetime_points.cmp(&a.lifetime_points))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}

/// Band for 1-based `rank` out of `population`. An agent exactly on a
/// boundary belongs to the higher band.
pub fn band_for(rank: usize, population: usize, promoted_pct: u32, safe_pct: u32) -> TransitionType {
    let scaled = rank * 100;
    if scaled <= promoted_pct as usize * population {
        TransitionType::Promoted
    } else if scaled <= (promoted_pct + safe_pct) as usize * population {
        TransitionType::Safe
    } else {
        TransitionType::Demoted
    }
}

/// Level and tier summary for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub agent_id: String,
    pub level: i64,
    pub lifetime_xp: i64,
    /// XP since the start of the current reset period
    pub period_xp: i64,
    pub tier: Tier,
}

pub struct TierEngine {
    store: Arc<dyn EconomyStore>,
    clock: Arc<dyn Clock>,
    config: TierConfig,
    running: Mutex<()>,
}

impl TierEngine {
    pub fn new(store: Arc<dyn EconomyStore>, clock: Arc<dyn Clock>, config: TierConfig) -> Self {
        Self {
            store,
            clock,
            config,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn level_for_xp(&self, lifetime_xp: i64) -> i64 {
        lifetime_xp.max(0) / self.config.xp_per_level + 1
    }

    pub fn tier(&self, index: usize) -> Tier {
        Tier::on_ladder(index, &self.config.ladder)
    }

    /// The most recent ranking cycle that has fully ended
    pub fn last_completed_cycle(&self) -> CycleId {
        CycleId::containing(self.config.ranking_cycle, self.clock.now()).previous()
    }

    pub async fn progress(&self, agent: &Agent) -> Result<Progress> {
        let lifetime_xp = self.store.balance(&agent.id, Currency::Xp).await?;
        let period = self.config.xp_reset_period;
        let start = period.period_start(self.clock.now());
        let period_xp = self
            .store
            .net_between(&agent.id, Currency::Xp, start, period.period_end(start))
            .await?;

        Ok(Progress {
            agent_id: agent.id.clone(),
            level: self.level_for_xp(lifetime_xp),
            lifetime_xp,
            period_xp,
            tier: self.tier(agent.current_tier),
        })
    }

    /// Rank and band every active agent for a finished cycle.
    pub async fn recompute_cycle(&self, cycle_id: &CycleId) -> Result<Vec<TierAssignment>> {
        if cycle_id.kind() != self.config.ranking_cycle {
            return Err(EconomyError::Validation(format!(
                "cycle {} is not a {} ranking cycle",
                cycle_id, self.config.ranking_cycle
            )));
        }
        let now = self.clock.now();
        if cycle_id.end_at() > now {
            return Err(EconomyError::Validation(format!(
                "cycle {} has not ended",
                cycle_id
            )));
        }

        let _running = self.running.lock().await;

        let existing = self.store.tier_assignments(cycle_id).await?;
        if !existing.is_empty() {
            debug!(cycle = %cycle_id, agents = existing.len(), "cycle already computed");
            return Ok(existing);
        }
        if let Some(latest) = self.store.latest_tier_cycle().await? {
            if latest > *cycle_id {
                return Err(EconomyError::InvalidStateTransition {
                    from: latest.to_string(),
                    to: cycle_id.to_string(),
                });
            }
        }

        let mut standings = Vec::new();
        for agent in self.store.list_agents(true).await? {
            let cycle_xp = self
                .store
                .net_between(&agent.id, Currency::Xp, cycle_id.start_at(), cycle_id.end_at())
                .await?;
            let lifetime_points = self.store.balance(&agent.id, Currency::Points).await?;
            standings.push(Standing {
                agent_id: agent.id,
                current_tier: agent.current_tier,
                cycle_xp,
                lifetime_points,
            });
        }
        standings.sort_by(compare_standings);

        let population = standings.len();
        let rungs = self.config.ladder.len();
        let assignments: Vec<TierAssignment> = standings
            .into_iter()
            .enumerate()
            .map(|(i, standing)| {
                let rank = i + 1;
                let transition = band_for(
                    rank,
                    population,
                    self.config.promoted_pct,
                    self.config.safe_pct,
                );
                let tier = self.tier(transition.apply(standing.current_tier, rungs));
                TierAssignment {
                    agent_id: standing.agent_id,
                    cycle_id: cycle_id.clone(),
                    rank: rank as u32,
                    percentile: (Decimal::from(rank as u64 * 100) / Decimal::from(population as u64))
                        .round_dp(2),
                    cycle_xp: standing.cycle_xp,
                    lifetime_points: standing.lifetime_points,
                    tier: tier.index,
                    tier_name: tier.name,
                    transition,
                    computed_at: now,
                }
            })
            .collect();

        if !self
            .store
            .insert_tier_assignments(cycle_id, &assignments)
            .await?
        {
            return self.store.tier_assignments(cycle_id).await;
        }

        for assignment in &assignments {
            self.store
                .set_agent_tier(&assignment.agent_id, assignment.tier)
                .await?;
        }

        let promoted = assignments
            .iter()
            .filter(|a| a.transition == TransitionType::Promoted)
            .count();
        let demoted = assignments
            .iter()
            .filter(|a| a.transition == TransitionType::Demoted)
            .count();
        info!(
            cycle = %cycle_id,
            agents = population,
            promoted,
            demoted,
            "tier cycle recomputed"
        );
        Ok(assignments)
    }

    pub async fn assignments(&self, cycle_id: &CycleId) -> Result<Vec<TierAssignment>> {
        self.store.tier_assignments(cycle_id).await
    }

    pub async fn latest(&self) -> Result<Vec<TierAssignment>> {
        self.store.latest_tier_assignments().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, NewTransaction};
    use crate::domain::{IdempotencyKey, TxKind, TxSource};
    use crate::engine::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn standing(id: &str, xp: i64, points: i64) -> Standing {
        Standing {
            agent_id: id.to_string(),
            current_tier: 0,
            cycle_xp: xp,
            lifetime_points: points,
        }
    }

    #[test]
    fn test_ties_break_on_points_then_id() {
        let mut standings = vec![
            standing("cy", 50, 100),
            standing("al", 50, 100),
            standing("bo", 50, 300),
            standing("di", 90, 0),
        ];
        standings.sort_by(compare_standings);
        let order: Vec<&str> = standings.iter().map(|s| s.agent_id.as_str()).collect();
        assert_eq!(order, vec!["di", "bo", "al", "cy"]);
    }

    #[test]
    fn test_band_boundaries_round_toward_higher_band() {
        let bands: Vec<TransitionType> = (1..=10).map(|r| band_for(r, 10, 20, 25)).collect();
        use TransitionType::*;
        assert_eq!(
            bands,
            vec![Promoted, Promoted, Safe, Safe, Demoted, Demoted, Demoted, Demoted, Demoted, Demoted]
        );
        // 20% of 5 is exactly one agent; 45% of 5 is 2.25
        assert_eq!(band_for(1, 5, 20, 25), Promoted);
        assert_eq!(band_for(2, 5, 20, 25), Safe);
        assert_eq!(band_for(3, 5, 20, 25), Demoted);
    }

    async fn seeded(clock: Arc<ManualClock>) -> (Arc<dyn EconomyStore>, TierEngine) {
        let credited_at = Utc.with_ymd_and_hms(2026, 10, 14, 10, 0, 0).unwrap();
        let store: Arc<dyn EconomyStore> = Arc::new(MemoryStore::new());
        for (id, xp) in [("al", 40), ("bo", 90), ("cy", 10), ("di", 60), ("ed", 0)] {
            store.upsert_agent(&Agent::new(id, id)).await.unwrap();
            store.set_agent_tier(id, 2).await.unwrap();
            if xp > 0 {
                store
                    .insert_transaction(NewTransaction {
                        agent_id: id.to_string(),
                        kind: TxKind::Credit,
                        currency: Currency::Xp,
                        amount: xp,
                        source: TxSource::MetricAward,
                        idempotency_key: IdempotencyKey::new(id, TxSource::MetricAward, "w43"),
                        created_at: credited_at,
                    })
                    .await
                    .unwrap();
            }
        }
        let engine = TierEngine::new(store.clone(), clock, TierConfig::default());
        (store, engine)
    }

    #[tokio::test]
    async fn test_recompute_ranks_and_moves_ladder() {
        let week = CycleId::parse("2026-W42").unwrap();
        let clock = Arc::new(ManualClock::new(week.end_at()));
        let (store, engine) = seeded(clock).await;

        let assignments = engine.recompute_cycle(&week).await.unwrap();
        let order: Vec<&str> = assignments.iter().map(|a| a.agent_id.as_str()).collect();
        assert_eq!(order, vec!["bo", "di", "al", "cy", "ed"]);

        assert_eq!(assignments[0].transition, TransitionType::Promoted);
        assert_eq!(assignments[0].tier_name, "Platinum");
        assert_eq!(assignments[0].percentile, dec!(20));
        assert_eq!(assignments[1].transition, TransitionType::Safe);
        assert_eq!(assignments[4].transition, TransitionType::Demoted);
        assert_eq!(assignments[4].tier_name, "Silver");

        let bo = store.get_agent("bo").await.unwrap().unwrap();
        assert_eq!(bo.current_tier, 3);
    }

    #[tokio::test]
    async fn test_recompute_is_written_once() {
        let week = CycleId::parse("2026-W42").unwrap();
        let clock = Arc::new(ManualClock::new(week.end_at()));
        let (store, engine) = seeded(clock).await;

        let first = engine.recompute_cycle(&week).await.unwrap();
        let second = engine.recompute_cycle(&week).await.unwrap();
        assert_eq!(first, second);

        // Tiers moved once, not twice
        let bo = store.get_agent("bo").await.unwrap().unwrap();
        assert_eq!(bo.current_tier, 3);
    }

    #[tokio::test]
    async fn test_unfinished_cycle_is_refused() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 21, 12, 0, 0).unwrap(),
        ));
        let (_, engine) = seeded(clock).await;
        let current = CycleId::parse("2026-W43").unwrap();
        assert!(matches!(
            engine.recompute_cycle(&current).await,
            Err(EconomyError::Validation(_))
        ));
        assert_eq!(engine.last_completed_cycle().to_string(), "2026-W42");
    }

    #[tokio::test]
    async fn test_older_cycle_after_newer_is_refused() {
        let week = CycleId::parse("2026-W42").unwrap();
        let clock = Arc::new(ManualClock::new(week.end_at()));
        let (store, engine) = seeded(clock).await;

        engine.recompute_cycle(&week).await.unwrap();
        let bo_after = store.get_agent("bo").await.unwrap().unwrap().current_tier;

        let older = CycleId::parse("2026-W40").unwrap();
        let err = engine.recompute_cycle(&older).await.unwrap_err();
        assert!(matches!(err, EconomyError::InvalidStateTransition { .. }));

        assert!(store.tier_assignments(&older).await.unwrap().is_empty());
        let latest = engine.latest().await.unwrap();
        assert_eq!(latest[0].cycle_id, week);
        assert_eq!(
            store.get_agent("bo").await.unwrap().unwrap().current_tier,
            bo_after
        );
    }

    #[tokio::test]
    async fn test_xp_correction_lowers_rank() {
        let week = CycleId::parse("2026-W42").unwrap();
        let clock = Arc::new(ManualClock::new(week.end_at()));
        let (store, engine) = seeded(clock).await;

        // bo leads on 90 XP until a correction takes back 85
        store
            .insert_transaction(NewTransaction {
                agent_id: "bo".to_string(),
                kind: TxKind::Debit,
                currency: Currency::Xp,
                amount: 85,
                source: TxSource::ManualAdjustment,
                idempotency_key: IdempotencyKey::new("bo", TxSource::ManualAdjustment, "fix-w42"),
                created_at: Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap(),
            })
            .await
            .unwrap();

        let assignments = engine.recompute_cycle(&week).await.unwrap();
        let order: Vec<&str> = assignments.iter().map(|a| a.agent_id.as_str()).collect();
        assert_eq!(order, vec!["di", "al", "cy", "bo", "ed"]);
        assert_eq!(assignments[3].cycle_xp, 5);
    }

    #[test]
    fn test_level_for_xp() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = TierEngine::new(Arc::new(MemoryStore::new()), clock, TierConfig::default());
        assert_eq!(engine.level_for_xp(0), 1);
        assert_eq!(engine.level_for_xp(99), 1);
        assert_eq!(engine.level_for_xp(100), 2);
        assert_eq!(engine.level_for_xp(1_250), 13);
    }
}
