//! Economy engine
//!
//! Components, leaf first: ledger, caps, catalog, draw, claims, tiers and
//! the leaderboard projection. [`Economy`] wires them over one store.

pub mod agents;
pub mod awards;
pub mod caps;
pub mod catalog;
pub mod challenges;
pub mod claim;
pub mod clock;
pub mod draw;
pub mod leaderboard;
pub mod ledger;
pub mod locks;
pub mod tier;

pub use agents::AgentRegistry;
pub use awards::{AwardReceipt, MetricAwarder};
pub use caps::{CapDecision, CapEnforcer};
pub use catalog::{CatalogFile, RewardCatalog};
pub use challenges::{Challenge, ChallengeBoard};
pub use claim::{ClaimProcessor, ClaimReceipt, DrawReceipt, DrawRequest, Reward};
pub use clock::{Clock, ManualClock, SystemClock};
pub use draw::DrawEngine;
pub use leaderboard::{LeaderboardEntry, LeaderboardPage, LeaderboardSnapshot, LeaderboardView};
pub use ledger::{Balances, Ledger};
pub use locks::AgentLocks;
pub use tier::{Progress, TierEngine};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::adapters::EconomyStore;
use crate::config::AppConfig;
use crate::domain::{Currency, IdempotencyKey, Transaction, TxSource};
use crate::error::{EconomyError, Result};

/// Every engine component, sharing one store, lock table and clock
pub struct Economy {
    pub store: Arc<dyn EconomyStore>,
    pub clock: Arc<dyn Clock>,
    pub agents: Arc<AgentRegistry>,
    pub ledger: Arc<Ledger>,
    pub caps: Arc<CapEnforcer>,
    pub catalog: Arc<RewardCatalog>,
    pub claims: Arc<ClaimProcessor>,
    pub tiers: Arc<TierEngine>,
    pub leaderboard: Arc<LeaderboardView>,
    pub awards: Arc<MetricAwarder>,
    pub challenges: Arc<ChallengeBoard>,
}

impl Economy {
    pub fn new(store: Arc<dyn EconomyStore>, config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let locks = Arc::new(AgentLocks::new(Duration::from_millis(
            config.claims.lock_timeout_ms,
        )));
        let agents = Arc::new(AgentRegistry::new(store.clone()));
        let ledger = Arc::new(Ledger::new(store.clone(), locks.clone(), clock.clone()));
        let caps = Arc::new(CapEnforcer::new(store.clone(), config.caps.clone()));
        let catalog = Arc::new(RewardCatalog::new(store.clone()));
        let claims = Arc::new(ClaimProcessor::new(
            store.clone(),
            agents.clone(),
            ledger.clone(),
            caps.clone(),
            catalog.clone(),
            Arc::new(DrawEngine::new()),
            locks.clone(),
            clock.clone(),
            config.games.clone(),
            config.claims.clone(),
            config.rng_seed,
        ));
        let tiers = Arc::new(TierEngine::new(
            store.clone(),
            clock.clone(),
            config.tiers.clone(),
        ));
        let leaderboard = Arc::new(LeaderboardView::new(
            store.clone(),
            tiers.clone(),
            clock.clone(),
            Duration::from_secs(config.sweeper.leaderboard_refresh_secs),
        ));
        let awards = Arc::new(MetricAwarder::new(
            agents.clone(),
            ledger.clone(),
            caps.clone(),
            locks.clone(),
            clock.clone(),
            config.tiers.points_per_xp,
        ));
        let challenges = Arc::new(ChallengeBoard::new(
            store.clone(),
            agents.clone(),
            awards.clone(),
            locks,
            &config.challenges,
        ));

        Self {
            store,
            clock,
            agents,
            ledger,
            caps,
            catalog,
            claims,
            tiers,
            leaderboard,
            awards,
            challenges,
        }
    }

    /// Build the engine, restore published catalogs and seed any game type
    /// that has none yet.
    pub async fn bootstrap(
        store: Arc<dyn EconomyStore>,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let economy = Self::new(store, config, clock);

        let restored = economy.catalog.load().await?;
        let seed = match &config.catalog.path {
            Some(path) => CatalogFile::from_path(path)?,
            None => CatalogFile::builtin(),
        };
        economy.catalog.seed(&seed).await?;

        info!(restored_versions = restored, "economy ready");
        Ok(economy)
    }

    /// Admin correction. Positive `delta` credits, negative debits; caps
    /// do not apply.
    pub async fn adjust(
        &self,
        agent_id: &str,
        currency: Currency,
        delta: i64,
        reference_id: &str,
    ) -> Result<Transaction> {
        if reference_id.trim().is_empty() {
            return Err(EconomyError::Validation("reference id must not be empty".to_string()));
        }
        self.agents.ensure(agent_id).await?;

        let key = IdempotencyKey::new(agent_id, TxSource::ManualAdjustment, reference_id);
        let tx = if delta >= 0 {
            self.ledger
                .credit(agent_id, currency, delta, TxSource::ManualAdjustment, key)
                .await?
        } else {
            let amount = delta.checked_neg().ok_or(EconomyError::InvalidAmount(delta))?;
            self.ledger
                .debit(agent_id, currency, amount, TxSource::ManualAdjustment, key)
                .await?
        };

        info!(
            agent = agent_id,
            currency = currency.as_str(),
            delta,
            reference = reference_id,
            "manual adjustment"
        );
        Ok(tx)
    }
}
