//! Cycle Scheduler
//!
//! Recomputes the last finished ranking cycle once it closes and keeps the
//! leaderboard projection fresh. Runs off the request path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::domain::CycleId;
use crate::engine::{LeaderboardView, TierEngine};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub last_cycle: Option<CycleId>,
    pub last_error: Option<String>,
}

pub struct CycleScheduler {
    tiers: Arc<TierEngine>,
    leaderboard: Arc<LeaderboardView>,
    interval: Duration,
    stats: Arc<RwLock<SchedulerStats>>,
    running: Arc<AtomicBool>,
}

impl CycleScheduler {
    pub fn new(tiers: Arc<TierEngine>, leaderboard: Arc<LeaderboardView>, interval: Duration) -> Self {
        Self {
            tiers,
            leaderboard,
            interval,
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Recompute the last finished cycle if needed, then rebuild the
    /// leaderboard. Returns the cycle that was checked.
    pub async fn tick(&self) -> Result<CycleId> {
        tick(&self.tiers, &self.leaderboard, &self.stats).await
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(interval_secs = self.interval.as_secs(), "cycle scheduler started");

        let tiers = self.tiers.clone();
        let leaderboard = self.leaderboard.clone();
        let stats = self.stats.clone();
        let running = self.running.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            while running.load(Ordering::SeqCst) {
                timer.tick().await;
                if let Err(e) = tick(&tiers, &leaderboard, &stats).await {
                    error!(error = %e, "cycle scheduler tick failed");
                    stats.write().await.last_error = Some(e.to_string());
                }
            }
            info!("cycle scheduler stopped");
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }
}

async fn tick(
    tiers: &TierEngine,
    leaderboard: &LeaderboardView,
    stats: &RwLock<SchedulerStats>,
) -> Result<CycleId> {
    let cycle = tiers.last_completed_cycle();
    let is_new = stats.read().await.last_cycle.as_ref() != Some(&cycle);
    if is_new {
        // recompute_cycle returns stored rows for a cycle already written
        tiers.recompute_cycle(&cycle).await?;
    }
    leaderboard.refresh().await?;

    let mut s = stats.write().await;
    s.ticks += 1;
    s.last_cycle = Some(cycle.clone());
    Ok(cycle)
}
