//! Expiry Sweeper
//!
//! Moves pending outcomes past their expiry to `expired` on a fixed
//! interval, a batch at a time, under each agent's lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::SweeperConfig;
use crate::engine::{ClaimProcessor, Clock};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct SweeperStats {
    pub runs: u64,
    pub outcomes_expired: u64,
    pub last_run: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

pub struct ExpirySweeper {
    claims: Arc<ClaimProcessor>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    batch_size: usize,
    stats: Arc<RwLock<SweeperStats>>,
    running: Arc<AtomicBool>,
}

impl ExpirySweeper {
    pub fn new(claims: Arc<ClaimProcessor>, clock: Arc<dyn Clock>, config: &SweeperConfig) -> Self {
        Self {
            claims,
            clock,
            interval: Duration::from_secs(config.interval_secs),
            batch_size: config.batch_size,
            stats: Arc::new(RwLock::new(SweeperStats::default())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One pass: keep taking batches until a short one comes back
    pub async fn sweep_once(&self) -> Result<u64> {
        sweep(&self.claims, self.clock.as_ref(), self.batch_size, &self.stats).await
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            interval_secs = self.interval.as_secs(),
            batch = self.batch_size,
            "expiry sweeper started"
        );

        let claims = self.claims.clone();
        let clock = self.clock.clone();
        let stats = self.stats.clone();
        let running = self.running.clone();
        let interval = self.interval;
        let batch_size = self.batch_size;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            while running.load(Ordering::SeqCst) {
                timer.tick().await;
                if let Err(e) = sweep(&claims, clock.as_ref(), batch_size, &stats).await {
                    error!(error = %e, "expiry sweep failed");
                    stats.write().await.last_error = Some(e.to_string());
                }
            }
            info!("expiry sweeper stopped");
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn stats(&self) -> SweeperStats {
        self.stats.read().await.clone()
    }
}

async fn sweep(
    claims: &ClaimProcessor,
    clock: &dyn Clock,
    batch_size: usize,
    stats: &RwLock<SweeperStats>,
) -> Result<u64> {
    let now = clock.now();
    let mut total = 0u64;
    loop {
        let expired = claims.expire_due(now, batch_size).await?;
        total += expired as u64;
        if expired == 0 || expired < batch_size {
            break;
        }
    }

    let mut s = stats.write().await;
    s.runs += 1;
    s.outcomes_expired += total;
    s.last_run = Some(now);
    if total > 0 {
        info!(expired = total, "expiry sweep complete");
    } else {
        debug!("expiry sweep found nothing due");
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::config::AppConfig;
    use crate::domain::{Currency, GameType};
    use crate::engine::{DrawRequest, Economy, ManualClock};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    #[tokio::test]
    async fn test_sweep_expires_abandoned_draws() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 21, 9, 0, 0).unwrap(),
        ));
        let economy = Economy::bootstrap(
            Arc::new(MemoryStore::new()),
            &AppConfig::default(),
            clock.clone(),
        )
        .await
        .unwrap();
        economy
            .adjust("amy", Currency::Tokens, 500, "grant")
            .await
            .unwrap();
        for _ in 0..3 {
            economy
                .claims
                .draw(DrawRequest::new("amy", GameType::ScratchCard))
                .await
                .unwrap();
        }

        let config = SweeperConfig {
            batch_size: 2,
            ..SweeperConfig::default()
        };
        let sweeper = ExpirySweeper::new(economy.claims.clone(), clock.clone(), &config);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

        clock.advance(ChronoDuration::days(2));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 3);
        assert_eq!(sweeper.stats().await.outcomes_expired, 3);
    }
}
