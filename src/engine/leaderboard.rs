//! Leaderboard View
//!
//! Read-only projection rebuilt from the ledger, agent rows and the latest
//! tier cycle. Rank and percentile come from the latest TierAssignment;
//! agents that cycle did not rank follow, ordered by live cycle XP. Holds
//! no state that a rebuild cannot regenerate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use super::clock::Clock;
use super::tier::{compare_standings, Standing, TierEngine};
use crate::adapters::EconomyStore;
use crate::domain::{CycleId, Currency, TierAssignment, TransitionType};
use crate::error::{EconomyError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based rank from the latest computed cycle. Unranked agents are
    /// numbered after the ranked population.
    pub rank: u32,
    /// Percentile from the latest computed cycle, None if unranked there
    pub percentile: Option<Decimal>,
    pub agent_id: String,
    pub display_name: String,
    pub department: Option<String>,
    /// Net XP in the ranking cycle in progress
    pub cycle_xp: i64,
    /// XP since the last reset
    pub period_xp: i64,
    pub lifetime_xp: i64,
    pub level: i64,
    pub points: i64,
    pub tier: usize,
    pub tier_name: String,
    /// Band from the most recent computed cycle, if the agent was ranked in it
    pub last_transition: Option<TransitionType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardSnapshot {
    pub cycle_id: CycleId,
    pub last_computed_cycle: Option<CycleId>,
    pub entries: Vec<LeaderboardEntry>,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardPage {
    pub entries: Vec<LeaderboardEntry>,
    /// Pass back to fetch the following page
    pub next_cursor: Option<usize>,
    pub total: usize,
}

pub struct LeaderboardView {
    store: Arc<dyn EconomyStore>,
    tiers: Arc<TierEngine>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    snapshot: RwLock<Option<Arc<LeaderboardSnapshot>>>,
}

impl LeaderboardView {
    pub fn new(
        store: Arc<dyn EconomyStore>,
        tiers: Arc<TierEngine>,
        clock: Arc<dyn Clock>,
        max_age: Duration,
    ) -> Self {
        Self {
            store,
            tiers,
            clock,
            max_age,
            snapshot: RwLock::new(None),
        }
    }

    /// Rebuild from source state and swap it in
    pub async fn refresh(&self) -> Result<Arc<LeaderboardSnapshot>> {
        let now = self.clock.now();
        let cycle_id = CycleId::containing(self.tiers.config().ranking_cycle, now);

        let latest = self.store.latest_tier_assignments().await?;
        let last_computed_cycle = latest.first().map(|a| a.cycle_id.clone());
        let ranked_population = latest.iter().map(|a| a.rank).max().unwrap_or(0);
        let assigned: HashMap<String, TierAssignment> = latest
            .into_iter()
            .map(|a| (a.agent_id.clone(), a))
            .collect();

        let agents = self.store.list_agents(true).await?;
        let mut ranked = Vec::new();
        let mut unranked = Vec::new();
        for agent in agents {
            let cycle_xp = self
                .store
                .net_between(&agent.id, Currency::Xp, cycle_id.start_at(), cycle_id.end_at())
                .await?;
            let points = self.store.balance(&agent.id, Currency::Points).await?;
            let progress = self.tiers.progress(&agent).await?;
            let assignment = assigned.get(&agent.id);

            let standing = Standing {
                agent_id: agent.id.clone(),
                current_tier: agent.current_tier,
                cycle_xp,
                lifetime_points: points,
            };
            let entry = LeaderboardEntry {
                rank: assignment.map_or(0, |a| a.rank),
                percentile: assignment.map(|a| a.percentile),
                last_transition: assignment.map(|a| a.transition),
                agent_id: agent.id,
                display_name: agent.display_name,
                department: agent.department,
                cycle_xp,
                period_xp: progress.period_xp,
                lifetime_xp: progress.lifetime_xp,
                level: progress.level,
                points,
                tier: progress.tier.index,
                tier_name: progress.tier.name,
            };
            if assignment.is_some() {
                ranked.push(entry);
            } else {
                unranked.push((standing, entry));
            }
        }

        ranked.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.agent_id.cmp(&b.agent_id)));
        unranked.sort_by(|a, b| compare_standings(&a.0, &b.0));
        let entries: Vec<LeaderboardEntry> = ranked
            .into_iter()
            .chain(
                unranked
                    .into_iter()
                    .enumerate()
                    .map(|(i, (_, mut entry))| {
                        entry.rank = ranked_population + i as u32 + 1;
                        entry
                    }),
            )
            .collect();

        let snapshot = Arc::new(LeaderboardSnapshot {
            cycle_id,
            last_computed_cycle,
            entries,
            built_at: now,
        });
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = Some(snapshot.clone());
        }
        debug!(agents = snapshot.entries.len(), "leaderboard rebuilt");
        Ok(snapshot)
    }

    /// Snapshot no older than the configured max age
    pub async fn current(&self) -> Result<Arc<LeaderboardSnapshot>> {
        let cached = self.snapshot.read().ok().and_then(|slot| slot.clone());
        if let Some(snapshot) = cached {
            let age = self.clock.now() - snapshot.built_at;
            if age.to_std().map_or(true, |age| age < self.max_age) {
                return Ok(snapshot);
            }
        }
        self.refresh().await
    }

    pub async fn top_n(&self, n: usize, department: Option<&str>) -> Result<Vec<LeaderboardEntry>> {
        let snapshot = self.current().await?;
        Ok(filtered(&snapshot, department).take(n).cloned().collect())
    }

    pub async fn rank_of(&self, agent_id: &str) -> Result<LeaderboardEntry> {
        let snapshot = self.current().await?;
        snapshot
            .entries
            .iter()
            .find(|e| e.agent_id == agent_id)
            .cloned()
            .ok_or_else(|| EconomyError::NotFound(format!("agent {} is not ranked", agent_id)))
    }

    /// `cursor` is the number of (filtered) entries already returned
    pub async fn page(
        &self,
        cursor: Option<usize>,
        size: usize,
        department: Option<&str>,
    ) -> Result<LeaderboardPage> {
        if size == 0 {
            return Err(EconomyError::Validation("page size must be positive".to_string()));
        }
        let snapshot = self.current().await?;
        let start = cursor.unwrap_or(0);
        let total = filtered(&snapshot, department).count();
        let entries: Vec<LeaderboardEntry> = filtered(&snapshot, department)
            .skip(start)
            .take(size)
            .cloned()
            .collect();
        let end = start + entries.len();

        Ok(LeaderboardPage {
            next_cursor: (end < total).then_some(end),
            entries,
            total,
        })
    }
}

fn filtered<'a>(
    snapshot: &'a LeaderboardSnapshot,
    department: Option<&'a str>,
) -> impl Iterator<Item = &'a LeaderboardEntry> {
    snapshot.entries.iter().filter(move |e| match department {
        Some(dept) => e.department.as_deref() == Some(dept),
        None => true,
    })
}
