//! Claim Processor
//!
//! Two-phase play: `draw` debits the entry fee and records a pending
//! outcome; `claim` later credits the stored reward exactly once.
//!
//! ```text
//! Requested -> Pending -> Claimed
//!                 |-----> Expired  (sweeper or late claim)
//!                 `-----> Capped   (cap refused the credit; forfeited)
//! ```
//!
//! Cap reservation and the ledger credit for one outcome run while holding
//! the agent's guard, so a concurrent second claim sees the first one's
//! reservation and status change.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::agents::AgentRegistry;
use super::caps::{CapEnforcer, CapHold};
use super::catalog::RewardCatalog;
use super::clock::Clock;
use super::draw::{DrawEngine, DrawRng};
use super::ledger::Ledger;
use super::locks::{AgentGuard, AgentLocks};
use crate::adapters::EconomyStore;
use crate::config::{ClaimConfig, GamesConfig};
use crate::domain::{
    Currency, DrawOutcome, GameType, IdempotencyKey, OutcomeStatus, TxSource,
};
use crate::error::{EconomyError, Result};

fn entry_source(game_type: GameType) -> TxSource {
    match game_type {
        GameType::SpinWheel => TxSource::SpinEntry,
        GameType::ScratchCard => TxSource::ScratchEntry,
    }
}

fn claim_source(game_type: GameType) -> TxSource {
    match game_type {
        GameType::SpinWheel => TxSource::SpinClaim,
        GameType::ScratchCard => TxSource::ScratchClaim,
    }
}

/// Ledger keys of the points and XP credits for claiming `outcome`
fn claim_keys(outcome: &DrawOutcome) -> (IdempotencyKey, IdempotencyKey) {
    let source = claim_source(outcome.game_type);
    (
        IdempotencyKey::new(&outcome.agent_id, source, &outcome.id.to_string()),
        IdempotencyKey::new(&outcome.agent_id, source, &format!("{}:xp", outcome.id)),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRequest {
    pub agent_id: String,
    pub game_type: GameType,
    /// Fee the client believes it is paying; must match the configured fee
    pub token_cost: Option<i64>,
    /// Client replay key; the same key returns the same outcome
    pub request_key: Option<String>,
}

impl DrawRequest {
    pub fn new(agent_id: impl Into<String>, game_type: GameType) -> Self {
        Self {
            agent_id: agent_id.into(),
            game_type,
            token_cost: None,
            request_key: None,
        }
    }

    pub fn with_token_cost(mut self, cost: i64) -> Self {
        self.token_cost = Some(cost);
        self
    }

    pub fn with_request_key(mut self, key: impl Into<String>) -> Self {
        self.request_key = Some(key.into());
        self
    }
}

/// What the client learns from a draw. The reward value stays server-side
/// until the claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawReceipt {
    pub outcome_id: Uuid,
    pub game_type: GameType,
    pub segment_index: u32,
    pub catalog_version: u32,
    pub entry_fee: i64,
    pub expires_at: DateTime<Utc>,
    pub replayed: bool,
}

impl DrawReceipt {
    fn from_outcome(outcome: &DrawOutcome, entry_fee: i64, replayed: bool) -> Self {
        Self {
            outcome_id: outcome.id,
            game_type: outcome.game_type,
            segment_index: outcome.segment_index,
            catalog_version: outcome.catalog_version,
            entry_fee,
            expires_at: outcome.expires_at,
            replayed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reward {
    pub label: String,
    pub points: i64,
    pub xp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub outcome_id: Uuid,
    pub reward: Reward,
    /// Points balance after the claim
    pub new_balance: i64,
    /// True when this call found the outcome already claimed by the caller
    pub replayed: bool,
}

impl ClaimReceipt {
    fn from_outcome(outcome: &DrawOutcome, new_balance: i64, replayed: bool) -> Self {
        Self {
            outcome_id: outcome.id,
            reward: Reward {
                label: outcome.label.clone(),
                points: outcome.point_value,
                xp: outcome.xp_value,
            },
            new_balance,
            replayed,
        }
    }
}

pub struct ClaimProcessor {
    store: Arc<dyn EconomyStore>,
    agents: Arc<AgentRegistry>,
    ledger: Arc<Ledger>,
    caps: Arc<CapEnforcer>,
    catalog: Arc<RewardCatalog>,
    engine: Arc<DrawEngine>,
    rng: DrawRng,
    locks: Arc<AgentLocks>,
    clock: Arc<dyn Clock>,
    games: GamesConfig,
    config: ClaimConfig,
}

impl ClaimProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn EconomyStore>,
        agents: Arc<AgentRegistry>,
        ledger: Arc<Ledger>,
        caps: Arc<CapEnforcer>,
        catalog: Arc<RewardCatalog>,
        engine: Arc<DrawEngine>,
        locks: Arc<AgentLocks>,
        clock: Arc<dyn Clock>,
        games: GamesConfig,
        config: ClaimConfig,
        rng_seed: Option<u64>,
    ) -> Self {
        Self {
            store,
            agents,
            ledger,
            caps,
            catalog,
            engine,
            rng: DrawRng::new(rng_seed),
            locks,
            clock,
            games,
            config,
        }
    }

    /// Pay the entry fee and draw against the active catalog.
    pub async fn draw(&self, request: DrawRequest) -> Result<DrawReceipt> {
        self.retrying("draw", || self.draw_once(&request)).await
    }

    /// Credit a pending outcome's reward. A repeat by the owner returns the
    /// original receipt with `replayed` set and credits nothing.
    pub async fn claim(
        &self,
        agent_id: &str,
        outcome_id: Uuid,
        game_type: Option<GameType>,
    ) -> Result<ClaimReceipt> {
        self.retrying("claim", || self.claim_once(agent_id, outcome_id, game_type))
            .await
    }

    /// Outcome as seen by its owner; other agents get `NotFound`
    pub async fn outcome(&self, agent_id: &str, outcome_id: Uuid) -> Result<DrawOutcome> {
        match self.store.get_outcome(outcome_id).await? {
            Some(outcome) if outcome.agent_id == agent_id => Ok(outcome),
            _ => Err(EconomyError::NotFound(format!("outcome {}", outcome_id))),
        }
    }

    /// Move one due outcome to `expired`. Returns false if it is not due or
    /// already terminal; a claimed outcome reports `AlreadyClaimed`.
    pub async fn expire_outcome(&self, outcome_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let agent_id = self
            .store
            .get_outcome(outcome_id)
            .await?
            .map(|o| o.agent_id)
            .ok_or_else(|| EconomyError::NotFound(format!("outcome {}", outcome_id)))?;

        let guard = self.locks.acquire(&agent_id).await?;
        let outcome = self.outcome(&agent_id, outcome_id).await?;

        match outcome.status {
            OutcomeStatus::Claimed => Err(EconomyError::AlreadyClaimed(outcome_id)),
            OutcomeStatus::Pending if outcome.is_due(now) => {
                let (points_key, xp_key) = claim_keys(&outcome);
                if self.credit_started(&points_key, &xp_key).await? {
                    self.finish_claim(&guard, &outcome, &points_key, &xp_key, now)
                        .await?;
                    info!(agent = %agent_id, outcome = %outcome_id, "interrupted claim completed by sweep");
                    return Err(EconomyError::AlreadyClaimed(outcome_id));
                }
                let moved = self
                    .store
                    .transition_outcome(outcome_id, OutcomeStatus::Pending, OutcomeStatus::Expired, now)
                    .await?;
                if moved {
                    info!(agent = %agent_id, outcome = %outcome_id, "outcome expired");
                }
                Ok(moved)
            }
            _ => Ok(false),
        }
    }

    /// Expire up to `batch` due outcomes. Returns how many moved.
    pub async fn expire_due(&self, now: DateTime<Utc>, batch: usize) -> Result<usize> {
        let due = self.store.due_outcomes(now, batch).await?;
        let mut expired = 0;

        for outcome in due {
            match self.expire_outcome(outcome.id, now).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(EconomyError::AlreadyClaimed(id)) => {
                    debug!(outcome = %id, "claimed before sweep reached it");
                }
                Err(e) if e.is_retryable() => {
                    debug!(outcome = %outcome.id, error = %e, "agent busy, leaving for next sweep");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(expired)
    }

    async fn retrying<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0u32;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && attempts + 1 < self.config.retry_attempts => {
                    attempts += 1;
                    let backoff = self
                        .config
                        .retry_backoff_ms
                        .saturating_mul(1u64 << attempts.min(10));
                    warn!(op, attempts, backoff_ms = backoff, error = %e, "retrying after conflict");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                other => return other,
            }
        }
    }

    async fn draw_once(&self, request: &DrawRequest) -> Result<DrawReceipt> {
        let game = self.games.game(request.game_type);
        if let Some(cost) = request.token_cost {
            if cost != game.entry_fee {
                return Err(EconomyError::Validation(format!(
                    "{} costs {} {}, request offered {}",
                    request.game_type, game.entry_fee, game.entry_currency, cost
                )));
            }
        }

        let agent_id = request.agent_id.as_str();
        self.agents.require_active(agent_id).await?;
        let guard = self.locks.acquire(agent_id).await?;

        if let Some(key) = &request.request_key {
            if let Some(existing) = self.store.find_outcome_by_request(agent_id, key).await? {
                if existing.game_type != request.game_type {
                    return Err(EconomyError::Validation(format!(
                        "request key {} was already used for a {} draw",
                        key, existing.game_type
                    )));
                }
                debug!(agent = agent_id, outcome = %existing.id, "draw replay");
                return Ok(DrawReceipt::from_outcome(&existing, game.entry_fee, true));
            }
        }

        let version = self.catalog.get_version(request.game_type)?;
        let segment_index = self.rng.draw(&self.engine, &version)?;
        let reward = version.segment(segment_index).ok_or_else(|| {
            EconomyError::Internal(format!(
                "segment {} missing from {} catalog v{}",
                segment_index, version.game_type, version.version
            ))
        })?;

        let outcome_id = Uuid::new_v4();
        let source = entry_source(request.game_type);
        if game.entry_fee > 0 {
            self.ledger
                .debit_held(
                    &guard,
                    game.entry_currency,
                    game.entry_fee,
                    source,
                    IdempotencyKey::new(agent_id, source, &outcome_id.to_string()),
                )
                .await?;
        }

        let now = self.clock.now();
        let outcome = DrawOutcome {
            id: outcome_id,
            agent_id: agent_id.to_string(),
            game_type: request.game_type,
            catalog_version: version.version,
            segment_index,
            label: reward.label.clone(),
            point_value: reward.point_value,
            xp_value: reward.xp_value,
            status: OutcomeStatus::Pending,
            request_key: request
                .request_key
                .clone()
                .unwrap_or_else(|| outcome_id.to_string()),
            created_at: now,
            expires_at: now + ChronoDuration::seconds(game.claim_ttl_secs as i64),
            resolved_at: None,
        };

        if let Err(e) = self.store.insert_outcome(&outcome).await {
            if game.entry_fee > 0 {
                let refund = IdempotencyKey::new(agent_id, source, &format!("{}:refund", outcome_id));
                if let Err(refund_err) = self
                    .ledger
                    .credit_held(&guard, game.entry_currency, game.entry_fee, source, refund)
                    .await
                {
                    error!(agent = agent_id, outcome = %outcome_id, error = %refund_err, "entry refund failed");
                }
            }
            return Err(e);
        }

        info!(
            agent = agent_id,
            outcome = %outcome_id,
            game = %request.game_type,
            catalog_version = version.version,
            segment = segment_index,
            fee = game.entry_fee,
            "draw recorded"
        );
        Ok(DrawReceipt::from_outcome(&outcome, game.entry_fee, false))
    }

    async fn claim_once(
        &self,
        agent_id: &str,
        outcome_id: Uuid,
        game_type: Option<GameType>,
    ) -> Result<ClaimReceipt> {
        let guard = self.locks.acquire(agent_id).await?;
        let outcome = self.outcome(agent_id, outcome_id).await?;

        if let Some(game) = game_type {
            if outcome.game_type != game {
                return Err(EconomyError::Forbidden(format!(
                    "outcome {} is a {} outcome, not {}",
                    outcome_id, outcome.game_type, game
                )));
            }
        }

        match outcome.status {
            OutcomeStatus::Claimed => {
                let balance = self.ledger.balance(agent_id, Currency::Points).await?;
                debug!(agent = agent_id, outcome = %outcome_id, "claim replay");
                return Ok(ClaimReceipt::from_outcome(&outcome, balance, true));
            }
            OutcomeStatus::Expired => return Err(EconomyError::Expired(outcome_id)),
            OutcomeStatus::Capped => {
                let at = outcome.resolved_at.unwrap_or(outcome.created_at);
                let denial = self.caps.denial_at(agent_id, outcome.point_value, at).await?;
                return Err(match denial {
                    Some(denial) => denial.into_error(outcome.point_value),
                    None => EconomyError::InvalidStateTransition {
                        from: OutcomeStatus::Capped.to_string(),
                        to: OutcomeStatus::Claimed.to_string(),
                    },
                });
            }
            OutcomeStatus::Pending => {}
        }

        let (points_key, xp_key) = claim_keys(&outcome);
        let now = self.clock.now();
        if self.credit_started(&points_key, &xp_key).await? {
            // Credits are on the ledger; finish the claim whatever the expiry
            self.finish_claim(&guard, &outcome, &points_key, &xp_key, now)
                .await?;
            let balance = self.ledger.balance(agent_id, Currency::Points).await?;
            info!(agent = agent_id, outcome = %outcome_id, balance, "interrupted claim completed");
            return Ok(ClaimReceipt::from_outcome(&outcome, balance, false));
        }

        if now >= outcome.expires_at {
            self.store
                .transition_outcome(outcome_id, OutcomeStatus::Pending, OutcomeStatus::Expired, now)
                .await?;
            info!(agent = agent_id, outcome = %outcome_id, "late claim, outcome expired");
            return Err(EconomyError::Expired(outcome_id));
        }

        let points = outcome.point_value;
        let mut hold = None;
        if points > 0 {
            match self.caps.reserve_all(agent_id, points, now).await? {
                Ok(reserved) => hold = Some(reserved),
                Err(denial) => {
                    self.store
                        .transition_outcome(outcome_id, OutcomeStatus::Pending, OutcomeStatus::Capped, now)
                        .await?;
                    warn!(
                        agent = agent_id,
                        outcome = %outcome_id,
                        period = denial.period.as_str(),
                        earned = denial.earned,
                        cap = denial.cap,
                        points,
                        "claim capped, reward forfeited"
                    );
                    return Err(denial.into_error(points));
                }
            }
        }

        if let Err(e) = self.credit_reward(&guard, &outcome, &points_key, &xp_key).await {
            self.release_uncommitted(hold.as_ref(), &points_key).await;
            return Err(e);
        }

        if !self
            .store
            .transition_outcome(outcome_id, OutcomeStatus::Pending, OutcomeStatus::Claimed, now)
            .await?
        {
            return Err(EconomyError::ConcurrencyConflict(format!(
                "outcome {} changed during claim",
                outcome_id
            )));
        }

        let balance = self.ledger.balance(agent_id, Currency::Points).await?;
        info!(
            agent = agent_id,
            outcome = %outcome_id,
            points,
            xp = outcome.xp_value,
            balance,
            "reward claimed"
        );
        Ok(ClaimReceipt::from_outcome(&outcome, balance, false))
    }

    async fn credit_started(&self, points_key: &IdempotencyKey, xp_key: &IdempotencyKey) -> Result<bool> {
        Ok(self.ledger.find(points_key).await?.is_some() || self.ledger.find(xp_key).await?.is_some())
    }

    /// Complete the credits of a claim that already wrote some of them, then
    /// mark the outcome claimed
    async fn finish_claim(
        &self,
        guard: &AgentGuard,
        outcome: &DrawOutcome,
        points_key: &IdempotencyKey,
        xp_key: &IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.credit_reward(guard, outcome, points_key, xp_key).await?;
        if !self
            .store
            .transition_outcome(outcome.id, OutcomeStatus::Pending, OutcomeStatus::Claimed, now)
            .await?
        {
            return Err(EconomyError::ConcurrencyConflict(format!(
                "outcome {} changed during claim",
                outcome.id
            )));
        }
        Ok(())
    }

    async fn credit_reward(
        &self,
        guard: &AgentGuard,
        outcome: &DrawOutcome,
        points_key: &IdempotencyKey,
        xp_key: &IdempotencyKey,
    ) -> Result<()> {
        let source = claim_source(outcome.game_type);
        if outcome.point_value > 0 {
            self.ledger
                .credit_held(guard, Currency::Points, outcome.point_value, source, points_key.clone())
                .await?;
        }
        if outcome.xp_value > 0 {
            self.ledger
                .credit_held(guard, Currency::Xp, outcome.xp_value, source, xp_key.clone())
                .await?;
        }
        Ok(())
    }

    async fn release_uncommitted(&self, hold: Option<&CapHold>, points_key: &IdempotencyKey) {
        let Some(hold) = hold else { return };
        match self.ledger.find(points_key).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(e) = self.caps.release(hold).await {
                    error!(agent = %hold.agent_id, error = %e, "cap release failed");
                }
            }
            Err(e) => error!(agent = %hold.agent_id, error = %e, "could not check points credit"),
        }
    }
}
