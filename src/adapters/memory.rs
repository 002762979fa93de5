//! In-memory store
//!
//! Default backend when no database is configured, and the backend every
//! test runs against. Each trait method takes the write guard once, so
//! compound checks are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::store::{EconomyStore, NewTransaction, TxInsert};
use crate::domain::{
    Agent, CapReservation, CapWindow, Currency, CycleId, DrawOutcome, GameType, IdempotencyKey,
    OutcomeStatus, PeriodKind, RewardCatalogVersion, TierAssignment, Transaction, TxKind,
};
use crate::error::{EconomyError, Result};

type CapKey = (String, PeriodKind, DateTime<Utc>);

#[derive(Default)]
struct Inner {
    agents: BTreeMap<String, Agent>,
    /// Per-agent transactions in sequence order
    transactions: HashMap<String, Vec<Transaction>>,
    /// Idempotency key -> (agent, index into `transactions`)
    tx_by_key: HashMap<String, (String, usize)>,
    cap_windows: HashMap<CapKey, CapWindow>,
    catalogs: HashMap<GameType, Vec<RewardCatalogVersion>>,
    outcomes: HashMap<Uuid, DrawOutcome>,
    outcome_by_request: HashMap<(String, String), Uuid>,
    challenges: HashSet<(String, String)>,
    /// Written cycles in write order
    tier_cycles: Vec<(CycleId, Vec<TierAssignment>)>,
}

impl Inner {
    fn balance(&self, agent_id: &str, currency: Currency) -> i64 {
        self.transactions
            .get(agent_id)
            .map(|txs| {
                txs.iter()
                    .filter(|tx| tx.currency == currency)
                    .map(Transaction::signed_amount)
                    .sum()
            })
            .unwrap_or(0)
    }

    fn entries(&self, agent_id: &str, currency: Currency) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .get(agent_id)
            .into_iter()
            .flatten()
            .filter(move |tx| tx.currency == currency)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EconomyStore for MemoryStore {
    async fn upsert_agent(&self, agent: &Agent) -> Result<Agent> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .agents
            .entry(agent.id.clone())
            .and_modify(|existing| {
                existing.display_name = agent.display_name.clone();
                if agent.department.is_some() {
                    existing.department = agent.department.clone();
                }
            })
            .or_insert_with(|| agent.clone());
        Ok(stored.clone())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.inner.read().await.agents.get(agent_id).cloned())
    }

    async fn list_agents(&self, active_only: bool) -> Result<Vec<Agent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .agents
            .values()
            .filter(|a| !active_only || a.active)
            .cloned()
            .collect())
    }

    async fn set_agent_active(&self, agent_id: &str, active: bool) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.agents.get_mut(agent_id) {
            Some(agent) => {
                agent.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_agent_tier(&self, agent_id: &str, tier: usize) -> Result<()> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| EconomyError::NotFound(format!("agent {}", agent_id)))?;
        agent.current_tier = tier;
        Ok(())
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<TxInsert> {
        let mut inner = self.inner.write().await;

        if let Some((agent, idx)) = inner.tx_by_key.get(tx.idempotency_key.as_str()) {
            let existing = inner.transactions[agent][*idx].clone();
            debug!(key = %tx.idempotency_key, "idempotent replay, returning existing transaction");
            return Ok(TxInsert::Existing(existing));
        }

        if tx.kind == TxKind::Debit {
            let balance = inner.balance(&tx.agent_id, tx.currency);
            if balance < tx.amount {
                return Ok(TxInsert::Insufficient { balance });
            }
        }

        let entries = inner.transactions.entry(tx.agent_id.clone()).or_default();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            agent_id: tx.agent_id.clone(),
            kind: tx.kind,
            currency: tx.currency,
            amount: tx.amount,
            source: tx.source,
            idempotency_key: tx.idempotency_key.clone(),
            sequence: entries.len() as i64 + 1,
            created_at: tx.created_at,
        };
        entries.push(transaction.clone());
        let idx = entries.len() - 1;
        inner
            .tx_by_key
            .insert(tx.idempotency_key.as_str().to_string(), (tx.agent_id, idx));

        Ok(TxInsert::Inserted(transaction))
    }

    async fn find_transaction(&self, key: &IdempotencyKey) -> Result<Option<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tx_by_key
            .get(key.as_str())
            .map(|(agent, idx)| inner.transactions[agent][*idx].clone()))
    }

    async fn transactions_for(&self, agent_id: &str) -> Result<Vec<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner.transactions.get(agent_id).cloned().unwrap_or_default())
    }

    async fn balance(&self, agent_id: &str, currency: Currency) -> Result<i64> {
        Ok(self.inner.read().await.balance(agent_id, currency))
    }

    async fn net_between(
        &self,
        agent_id: &str,
        currency: Currency,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries(agent_id, currency)
            .filter(|tx| tx.created_at >= from && tx.created_at < to)
            .map(Transaction::signed_amount)
            .sum())
    }

    async fn reserve_cap(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
        amount: i64,
        cap: i64,
    ) -> Result<CapReservation> {
        let mut inner = self.inner.write().await;
        let window = inner
            .cap_windows
            .entry((agent_id.to_string(), period, period_start))
            .or_insert_with(|| CapWindow {
                agent_id: agent_id.to_string(),
                period,
                period_start,
                amount_earned: 0,
                cap,
            });
        window.cap = cap;

        let next = window
            .amount_earned
            .checked_add(amount)
            .filter(|next| *next <= cap);
        let allowed = next.is_some();
        if let Some(next) = next {
            window.amount_earned = next;
        }
        Ok(CapReservation {
            allowed,
            remaining: window.remaining(),
            amount_earned: window.amount_earned,
        })
    }

    async fn release_cap(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
        amount: i64,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(window) = inner
            .cap_windows
            .get_mut(&(agent_id.to_string(), period, period_start))
        {
            window.amount_earned = (window.amount_earned - amount).max(0);
        }
        Ok(())
    }

    async fn cap_window(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
    ) -> Result<Option<CapWindow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .cap_windows
            .get(&(agent_id.to_string(), period, period_start))
            .cloned())
    }

    async fn insert_catalog_version(&self, version: &RewardCatalogVersion) -> Result<()> {
        let mut inner = self.inner.write().await;
        let versions = inner.catalogs.entry(version.game_type).or_default();
        if versions.iter().any(|v| v.version == version.version) {
            return Err(EconomyError::ConcurrencyConflict(format!(
                "{} catalog version {} already published",
                version.game_type, version.version
            )));
        }
        versions.push(version.clone());
        Ok(())
    }

    async fn catalog_versions(&self, game_type: GameType) -> Result<Vec<RewardCatalogVersion>> {
        let inner = self.inner.read().await;
        Ok(inner.catalogs.get(&game_type).cloned().unwrap_or_default())
    }

    async fn insert_outcome(&self, outcome: &DrawOutcome) -> Result<()> {
        let mut inner = self.inner.write().await;
        let request = (outcome.agent_id.clone(), outcome.request_key.clone());
        if inner.outcome_by_request.contains_key(&request) {
            return Err(EconomyError::ConcurrencyConflict(format!(
                "draw request {} already recorded",
                outcome.request_key
            )));
        }
        inner.outcome_by_request.insert(request, outcome.id);
        inner.outcomes.insert(outcome.id, outcome.clone());
        Ok(())
    }

    async fn get_outcome(&self, id: Uuid) -> Result<Option<DrawOutcome>> {
        Ok(self.inner.read().await.outcomes.get(&id).cloned())
    }

    async fn find_outcome_by_request(
        &self,
        agent_id: &str,
        request_key: &str,
    ) -> Result<Option<DrawOutcome>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outcome_by_request
            .get(&(agent_id.to_string(), request_key.to_string()))
            .and_then(|id| inner.outcomes.get(id))
            .cloned())
    }

    async fn transition_outcome(
        &self,
        id: Uuid,
        from: OutcomeStatus,
        to: OutcomeStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.outcomes.get_mut(&id) {
            Some(outcome) if outcome.status == from => {
                outcome.status = to;
                outcome.resolved_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn due_outcomes(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DrawOutcome>> {
        let inner = self.inner.read().await;
        let mut due: Vec<DrawOutcome> = inner
            .outcomes
            .values()
            .filter(|o| o.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|o| o.expires_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn accept_challenge(&self, agent_id: &str, challenge_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .challenges
            .insert((agent_id.to_string(), challenge_id.to_string())))
    }

    async fn has_accepted_challenge(&self, agent_id: &str, challenge_id: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .challenges
            .contains(&(agent_id.to_string(), challenge_id.to_string())))
    }

    async fn insert_tier_assignments(
        &self,
        cycle_id: &CycleId,
        assignments: &[TierAssignment],
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.tier_cycles.iter().any(|(id, _)| id == cycle_id) {
            return Ok(false);
        }
        inner
            .tier_cycles
            .push((cycle_id.clone(), assignments.to_vec()));
        Ok(true)
    }

    async fn tier_assignments(&self, cycle_id: &CycleId) -> Result<Vec<TierAssignment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tier_cycles
            .iter()
            .find(|(id, _)| id == cycle_id)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn latest_tier_cycle(&self) -> Result<Option<CycleId>> {
        let inner = self.inner.read().await;
        Ok(inner.tier_cycles.iter().map(|(id, _)| id).max().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TxSource;

    fn credit(agent: &str, amount: i64, reference: &str) -> NewTransaction {
        NewTransaction {
            agent_id: agent.to_string(),
            kind: TxKind::Credit,
            currency: Currency::Points,
            amount,
            source: TxSource::ManualAdjustment,
            idempotency_key: IdempotencyKey::new(agent, TxSource::ManualAdjustment, reference),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_returns_existing() {
        let store = MemoryStore::new();
        let first = store.insert_transaction(credit("a", 10, "r1")).await.unwrap();
        let second = store.insert_transaction(credit("a", 99, "r1")).await.unwrap();

        let (TxInsert::Inserted(first), TxInsert::Existing(second)) = (first, second) else {
            panic!("expected insert then replay");
        };
        assert_eq!(first, second);
        assert_eq!(store.balance("a", Currency::Points).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_sequence_is_per_agent() {
        let store = MemoryStore::new();
        store.insert_transaction(credit("a", 1, "r1")).await.unwrap();
        store.insert_transaction(credit("b", 1, "r1")).await.unwrap();
        store.insert_transaction(credit("a", 1, "r2")).await.unwrap();

        let seqs: Vec<i64> = store
            .transactions_for("a")
            .await
            .unwrap()
            .iter()
            .map(|t| t.sequence)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_reserve_cap_is_check_and_increment() {
        let store = MemoryStore::new();
        let start = Utc::now();
        let r1 = store
            .reserve_cap("a", PeriodKind::Daily, start, 300, 500)
            .await
            .unwrap();
        let r2 = store
            .reserve_cap("a", PeriodKind::Daily, start, 300, 500)
            .await
            .unwrap();
        assert!(r1.allowed);
        assert!(!r2.allowed);
        assert_eq!(r2.remaining, 200);

        store
            .release_cap("a", PeriodKind::Daily, start, 300)
            .await
            .unwrap();
        let window = store
            .cap_window("a", PeriodKind::Daily, start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(window.amount_earned, 0);
    }
}
