//! Ledger
//!
//! Authoritative, append-only record of point, token and XP movements.
//! Balances are always the signed sum of transactions; nothing else is
//! stored. Knows nothing about game rules.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::locks::{AgentGuard, AgentLocks};
use crate::adapters::{EconomyStore, NewTransaction, TxInsert};
use crate::domain::{Currency, IdempotencyKey, Transaction, TxKind, TxSource};
use crate::error::{EconomyError, Result};

/// All currency balances for one agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    pub points: i64,
    pub tokens: i64,
    pub xp: i64,
}

pub struct Ledger {
    store: Arc<dyn EconomyStore>,
    locks: Arc<AgentLocks>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(store: Arc<dyn EconomyStore>, locks: Arc<AgentLocks>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            locks,
            clock,
        }
    }

    /// Credit `amount` to the agent. Replaying an idempotency key returns
    /// the original transaction and writes nothing.
    pub async fn credit(
        &self,
        agent_id: &str,
        currency: Currency,
        amount: i64,
        source: TxSource,
        key: IdempotencyKey,
    ) -> Result<Transaction> {
        let guard = self.locks.acquire(agent_id).await?;
        self.credit_held(&guard, currency, amount, source, key).await
    }

    /// Debit `amount` from the agent; refused if it would overdraw.
    pub async fn debit(
        &self,
        agent_id: &str,
        currency: Currency,
        amount: i64,
        source: TxSource,
        key: IdempotencyKey,
    ) -> Result<Transaction> {
        let guard = self.locks.acquire(agent_id).await?;
        self.debit_held(&guard, currency, amount, source, key).await
    }

    /// [`Ledger::credit`] for callers already holding the agent's guard
    pub async fn credit_held(
        &self,
        guard: &AgentGuard,
        currency: Currency,
        amount: i64,
        source: TxSource,
        key: IdempotencyKey,
    ) -> Result<Transaction> {
        self.commit(guard, TxKind::Credit, currency, amount, source, key)
            .await
    }

    /// [`Ledger::debit`] for callers already holding the agent's guard
    pub async fn debit_held(
        &self,
        guard: &AgentGuard,
        currency: Currency,
        amount: i64,
        source: TxSource,
        key: IdempotencyKey,
    ) -> Result<Transaction> {
        self.commit(guard, TxKind::Debit, currency, amount, source, key)
            .await
    }

    async fn commit(
        &self,
        guard: &AgentGuard,
        kind: TxKind,
        currency: Currency,
        amount: i64,
        source: TxSource,
        key: IdempotencyKey,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(EconomyError::InvalidAmount(amount));
        }

        let agent_id = guard.agent_id();
        if kind == TxKind::Credit {
            let balance = self.store.balance(agent_id, currency).await?;
            if balance.checked_add(amount).is_none() {
                if let Some(existing) = self.store.find_transaction(&key).await? {
                    return Ok(existing);
                }
                return Err(EconomyError::InvalidAmount(amount));
            }
        }

        let inserted = self
            .store
            .insert_transaction(NewTransaction {
                agent_id: agent_id.to_string(),
                kind,
                currency,
                amount,
                source,
                idempotency_key: key,
                created_at: self.clock.now(),
            })
            .await?;

        match inserted {
            TxInsert::Inserted(tx) => {
                info!(
                    agent = agent_id,
                    kind = kind.as_str(),
                    currency = currency.as_str(),
                    amount,
                    source = source.as_str(),
                    sequence = tx.sequence,
                    "ledger commit"
                );
                Ok(tx)
            }
            TxInsert::Existing(tx) => {
                debug!(agent = agent_id, key = %tx.idempotency_key, "ledger replay");
                Ok(tx)
            }
            TxInsert::Insufficient { balance } => {
                warn!(
                    agent = agent_id,
                    currency = currency.as_str(),
                    balance,
                    requested = amount,
                    "debit refused"
                );
                Err(EconomyError::InsufficientBalance {
                    currency: currency.to_string(),
                    balance,
                    requested: amount,
                })
            }
        }
    }

    pub async fn balance(&self, agent_id: &str, currency: Currency) -> Result<i64> {
        self.store.balance(agent_id, currency).await
    }

    pub async fn balances(&self, agent_id: &str) -> Result<Balances> {
        Ok(Balances {
            points: self.store.balance(agent_id, Currency::Points).await?,
            tokens: self.store.balance(agent_id, Currency::Tokens).await?,
            xp: self.store.balance(agent_id, Currency::Xp).await?,
        })
    }

    pub async fn history(&self, agent_id: &str) -> Result<Vec<Transaction>> {
        self.store.transactions_for(agent_id).await
    }

    pub async fn find(&self, key: &IdempotencyKey) -> Result<Option<Transaction>> {
        self.store.find_transaction(key).await
    }

    /// Recompute a balance from raw transactions and check it against the
    /// store's aggregate.
    pub async fn reconcile(&self, agent_id: &str, currency: Currency) -> Result<i64> {
        let summed: i64 = self
            .store
            .transactions_for(agent_id)
            .await?
            .iter()
            .filter(|tx| tx.currency == currency)
            .map(Transaction::signed_amount)
            .sum();
        let reported = self.store.balance(agent_id, currency).await?;
        if summed != reported {
            return Err(EconomyError::Internal(format!(
                "{} {} balance {} does not match transaction sum {}",
                agent_id, currency, reported, summed
            )));
        }
        Ok(summed)
    }
}
