use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Agent, CapReservation, CapWindow, Currency, CycleId, DrawOutcome, GameType, IdempotencyKey,
    OutcomeStatus, PeriodKind, RewardCatalogVersion, TierAssignment, Transaction, TxKind,
    TxSource,
};
use crate::error::Result;

/// A transaction before the store assigns its id and sequence
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub agent_id: String,
    pub kind: TxKind,
    pub currency: Currency,
    pub amount: i64,
    pub source: TxSource,
    pub idempotency_key: IdempotencyKey,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an idempotent ledger insert
#[derive(Debug, Clone)]
pub enum TxInsert {
    /// A new row was written
    Inserted(Transaction),
    /// The idempotency key was already used; nothing was written
    Existing(Transaction),
    /// Debit refused; it would have taken the balance below zero
    Insufficient { balance: i64 },
}

/// Persistence seam for the economy.
///
/// Every method is a single atomic step. Compound invariants
/// (no overdraft, cap check-and-increment, outcome compare-and-set) are
/// enforced here so they also hold across processes.
#[async_trait]
pub trait EconomyStore: Send + Sync {
    /// Liveness probe for the backing storage
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    // ==================== Agents ====================

    /// Insert the agent if unknown; otherwise refresh name/department and
    /// return the stored row.
    async fn upsert_agent(&self, agent: &Agent) -> Result<Agent>;

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>>;

    async fn list_agents(&self, active_only: bool) -> Result<Vec<Agent>>;

    /// Returns false if the agent does not exist
    async fn set_agent_active(&self, agent_id: &str, active: bool) -> Result<bool>;

    async fn set_agent_tier(&self, agent_id: &str, tier: usize) -> Result<()>;

    // ==================== Ledger ====================

    /// Append a transaction unless its idempotency key exists. Debits are
    /// refused atomically if they would overdraw the currency balance.
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<TxInsert>;

    async fn find_transaction(&self, key: &IdempotencyKey) -> Result<Option<Transaction>>;

    /// All transactions for an agent in commit order
    async fn transactions_for(&self, agent_id: &str) -> Result<Vec<Transaction>>;

    /// Signed sum of transactions in one currency
    async fn balance(&self, agent_id: &str, currency: Currency) -> Result<i64>;

    /// Signed sum (credits minus debits) in `[from, to)`
    async fn net_between(
        &self,
        agent_id: &str,
        currency: Currency,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64>;

    // ==================== Caps ====================

    /// Check-and-increment as one step, creating the window at zero if absent
    async fn reserve_cap(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
        amount: i64,
        cap: i64,
    ) -> Result<CapReservation>;

    /// Undo a reservation whose credit never committed
    async fn release_cap(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
        amount: i64,
    ) -> Result<()>;

    async fn cap_window(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
    ) -> Result<Option<CapWindow>>;

    // ==================== Catalogs ====================

    /// Append a version; fails if (game_type, version) already exists
    async fn insert_catalog_version(&self, version: &RewardCatalogVersion) -> Result<()>;

    /// All versions for a game type, oldest first
    async fn catalog_versions(&self, game_type: GameType) -> Result<Vec<RewardCatalogVersion>>;

    // ==================== Outcomes ====================

    async fn insert_outcome(&self, outcome: &DrawOutcome) -> Result<()>;

    async fn get_outcome(&self, id: Uuid) -> Result<Option<DrawOutcome>>;

    async fn find_outcome_by_request(
        &self,
        agent_id: &str,
        request_key: &str,
    ) -> Result<Option<DrawOutcome>>;

    /// Compare-and-set on status. Returns false if the outcome was not in `from`.
    async fn transition_outcome(
        &self,
        id: Uuid,
        from: OutcomeStatus,
        to: OutcomeStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Pending outcomes whose expiry is at or before `now`
    async fn due_outcomes(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DrawOutcome>>;

    // ==================== Challenges ====================

    /// Returns true on first acceptance, false on a repeat
    async fn accept_challenge(&self, agent_id: &str, challenge_id: &str) -> Result<bool>;

    async fn has_accepted_challenge(&self, agent_id: &str, challenge_id: &str) -> Result<bool>;

    // ==================== Tiers ====================

    /// Write a cycle's assignments once. Returns false if the cycle was
    /// already written; existing rows are left untouched.
    async fn insert_tier_assignments(
        &self,
        cycle_id: &CycleId,
        assignments: &[TierAssignment],
    ) -> Result<bool>;

    async fn tier_assignments(&self, cycle_id: &CycleId) -> Result<Vec<TierAssignment>>;

    /// Newest cycle written so far, by cycle start
    async fn latest_tier_cycle(&self) -> Result<Option<CycleId>>;

    /// Assignments of the newest cycle written so far
    async fn latest_tier_assignments(&self) -> Result<Vec<TierAssignment>> {
        match self.latest_tier_cycle().await? {
            Some(cycle_id) => self.tier_assignments(&cycle_id).await,
            None => Ok(Vec::new()),
        }
    }
}
