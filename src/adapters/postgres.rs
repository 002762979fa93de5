use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::store::{EconomyStore, NewTransaction, TxInsert};
use crate::domain::{
    Agent, CapReservation, CapWindow, Currency, CycleId, DrawOutcome, GameType, IdempotencyKey,
    OutcomeStatus, PeriodKind, RewardCatalogVersion, RewardDefinition, TierAssignment,
    Transaction, TransitionType, TxKind, TxSource,
};
use crate::error::{EconomyError, Result};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode<T>(value: std::result::Result<T, String>) -> Result<T> {
    value.map_err(EconomyError::Internal)
}

fn row_to_agent(row: &PgRow) -> Result<Agent> {
    Ok(Agent {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        department: row.try_get("department")?,
        current_tier: row.try_get::<i32, _>("current_tier")?.max(0) as usize,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
    let kind: String = row.try_get("kind")?;
    let currency: String = row.try_get("currency")?;
    let source: String = row.try_get("source")?;
    let key: String = row.try_get("idempotency_key")?;
    Ok(Transaction {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        kind: decode(TxKind::try_from(kind.as_str()))?,
        currency: decode(Currency::try_from(currency.as_str()))?,
        amount: row.try_get("amount")?,
        source: decode(TxSource::try_from(source.as_str()))?,
        idempotency_key: IdempotencyKey::from_raw(key),
        sequence: row.try_get("sequence")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_outcome(row: &PgRow) -> Result<DrawOutcome> {
    let game_type: String = row.try_get("game_type")?;
    let status: String = row.try_get("status")?;
    Ok(DrawOutcome {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        game_type: decode(GameType::try_from(game_type.as_str()))?,
        catalog_version: row.try_get::<i32, _>("catalog_version")? as u32,
        segment_index: row.try_get::<i32, _>("segment_index")? as u32,
        label: row.try_get("label")?,
        point_value: row.try_get("point_value")?,
        xp_value: row.try_get("xp_value")?,
        status: decode(OutcomeStatus::try_from(status.as_str()))?,
        request_key: row.try_get("request_key")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn row_to_assignment(row: &PgRow) -> Result<TierAssignment> {
    let cycle_id: String = row.try_get("cycle_id")?;
    let transition: String = row.try_get("transition")?;
    Ok(TierAssignment {
        agent_id: row.try_get("agent_id")?,
        cycle_id: CycleId::parse(&cycle_id)?,
        rank: row.try_get::<i32, _>("rank")? as u32,
        percentile: row.try_get("percentile")?,
        cycle_xp: row.try_get("cycle_xp")?,
        lifetime_points: row.try_get("lifetime_points")?,
        tier: row.try_get::<i32, _>("tier")?.max(0) as usize,
        tier_name: row.try_get("tier_name")?,
        transition: decode(TransitionType::try_from(transition.as_str()))?,
        computed_at: row.try_get("computed_at")?,
    })
}

const TX_COLUMNS: &str =
    "id, agent_id, kind, currency, amount, source, idempotency_key, sequence, created_at";

const OUTCOME_COLUMNS: &str = "id, agent_id, game_type, catalog_version, segment_index, label, \
     point_value, xp_value, status, request_key, created_at, expires_at, resolved_at";

const ASSIGNMENT_COLUMNS: &str = "cycle_id, agent_id, rank, percentile, cycle_xp, \
     lifetime_points, tier, tier_name, transition, computed_at";

#[async_trait]
impl EconomyStore for PostgresStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    // ==================== Agents ====================

    async fn upsert_agent(&self, agent: &Agent) -> Result<Agent> {
        let row = sqlx::query(
            r#"
            INSERT INTO agents (id, display_name, department, current_tier, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                department = COALESCE(EXCLUDED.department, agents.department)
            RETURNING id, display_name, department, current_tier, active, created_at
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.display_name)
        .bind(&agent.department)
        .bind(agent.current_tier as i32)
        .bind(agent.active)
        .bind(agent.created_at)
        .fetch_one(&self.pool)
        .await?;

        row_to_agent(&row)
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query(
            "SELECT id, display_name, department, current_tier, active, created_at FROM agents WHERE id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_agent).transpose()
    }

    async fn list_agents(&self, active_only: bool) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, display_name, department, current_tier, active, created_at
            FROM agents
            WHERE active OR NOT $1
            ORDER BY id
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_agent).collect()
    }

    async fn set_agent_active(&self, agent_id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE agents SET active = $2 WHERE id = $1")
            .bind(agent_id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_agent_tier(&self, agent_id: &str, tier: usize) -> Result<()> {
        let result = sqlx::query("UPDATE agents SET current_tier = $2 WHERE id = $1")
            .bind(agent_id)
            .bind(tier as i32)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EconomyError::NotFound(format!("agent {}", agent_id)));
        }
        Ok(())
    }

    // ==================== Ledger ====================

    #[instrument(skip(self, tx), fields(agent = %tx.agent_id, key = %tx.idempotency_key))]
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<TxInsert> {
        let mut db = self.pool.begin().await?;

        // Serialize writers for this agent so the overdraft check, the
        // sequence number and the insert see one consistent ledger.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&tx.agent_id)
            .execute(&mut *db)
            .await?;

        let existing = sqlx::query(&format!(
            "SELECT {} FROM ledger_transactions WHERE idempotency_key = $1",
            TX_COLUMNS
        ))
        .bind(tx.idempotency_key.as_str())
        .fetch_optional(&mut *db)
        .await?;
        if let Some(row) = existing {
            db.rollback().await?;
            return Ok(TxInsert::Existing(row_to_transaction(&row)?));
        }

        if tx.kind == TxKind::Debit {
            let balance: i64 = sqlx::query_scalar(
                r#"
                SELECT COALESCE(SUM(CASE WHEN kind = 'credit' THEN amount ELSE -amount END), 0)::BIGINT
                FROM ledger_transactions
                WHERE agent_id = $1 AND currency = $2
                "#,
            )
            .bind(&tx.agent_id)
            .bind(tx.currency.as_str())
            .fetch_one(&mut *db)
            .await?;
            if balance < tx.amount {
                db.rollback().await?;
                return Ok(TxInsert::Insufficient { balance });
            }
        }

        let sequence: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0)::BIGINT + 1 FROM ledger_transactions WHERE agent_id = $1",
        )
        .bind(&tx.agent_id)
        .fetch_one(&mut *db)
        .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO ledger_transactions
                (id, agent_id, kind, currency, amount, source, idempotency_key, sequence, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            TX_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&tx.agent_id)
        .bind(tx.kind.as_str())
        .bind(tx.currency.as_str())
        .bind(tx.amount)
        .bind(tx.source.as_str())
        .bind(tx.idempotency_key.as_str())
        .bind(sequence)
        .bind(tx.created_at)
        .fetch_one(&mut *db)
        .await?;

        db.commit().await?;
        debug!(sequence, "ledger transaction committed");
        Ok(TxInsert::Inserted(row_to_transaction(&row)?))
    }

    async fn find_transaction(&self, key: &IdempotencyKey) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ledger_transactions WHERE idempotency_key = $1",
            TX_COLUMNS
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn transactions_for(&self, agent_id: &str) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_transactions WHERE agent_id = $1 ORDER BY sequence ASC",
            TX_COLUMNS
        ))
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn balance(&self, agent_id: &str, currency: Currency) -> Result<i64> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN kind = 'credit' THEN amount ELSE -amount END), 0)::BIGINT
            FROM ledger_transactions
            WHERE agent_id = $1 AND currency = $2
            "#,
        )
        .bind(agent_id)
        .bind(currency.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(balance)
    }

    async fn net_between(
        &self,
        agent_id: &str,
        currency: Currency,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN kind = 'credit' THEN amount ELSE -amount END), 0)::BIGINT
            FROM ledger_transactions
            WHERE agent_id = $1 AND currency = $2
              AND created_at >= $3 AND created_at < $4
            "#,
        )
        .bind(agent_id)
        .bind(currency.as_str())
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    // ==================== Caps ====================

    async fn reserve_cap(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
        amount: i64,
        cap: i64,
    ) -> Result<CapReservation> {
        let mut db = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cap_windows (agent_id, period, period_start, amount_earned, cap)
            VALUES ($1, $2, $3, 0, $4)
            ON CONFLICT (agent_id, period, period_start) DO NOTHING
            "#,
        )
        .bind(agent_id)
        .bind(period.as_str())
        .bind(period_start)
        .bind(cap)
        .execute(&mut *db)
        .await?;

        // The conditional UPDATE is the check-and-increment; its row lock
        // makes concurrent reservations queue behind each other.
        let reserved: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE cap_windows
            SET amount_earned = amount_earned + $4, cap = $5
            WHERE agent_id = $1 AND period = $2 AND period_start = $3
              AND amount_earned <= $5 - $4
            RETURNING amount_earned
            "#,
        )
        .bind(agent_id)
        .bind(period.as_str())
        .bind(period_start)
        .bind(amount)
        .bind(cap)
        .fetch_optional(&mut *db)
        .await?;

        let reservation = match reserved {
            Some(earned) => CapReservation {
                allowed: true,
                remaining: (cap - earned).max(0),
                amount_earned: earned,
            },
            None => {
                let earned: i64 = sqlx::query_scalar(
                    r#"
                    SELECT amount_earned FROM cap_windows
                    WHERE agent_id = $1 AND period = $2 AND period_start = $3
                    "#,
                )
                .bind(agent_id)
                .bind(period.as_str())
                .bind(period_start)
                .fetch_one(&mut *db)
                .await?;
                CapReservation {
                    allowed: false,
                    remaining: (cap - earned).max(0),
                    amount_earned: earned,
                }
            }
        };

        db.commit().await?;
        Ok(reservation)
    }

    async fn release_cap(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
        amount: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE cap_windows
            SET amount_earned = GREATEST(amount_earned - $4, 0)
            WHERE agent_id = $1 AND period = $2 AND period_start = $3
            "#,
        )
        .bind(agent_id)
        .bind(period.as_str())
        .bind(period_start)
        .bind(amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cap_window(
        &self,
        agent_id: &str,
        period: PeriodKind,
        period_start: DateTime<Utc>,
    ) -> Result<Option<CapWindow>> {
        let row = sqlx::query(
            r#"
            SELECT amount_earned, cap FROM cap_windows
            WHERE agent_id = $1 AND period = $2 AND period_start = $3
            "#,
        )
        .bind(agent_id)
        .bind(period.as_str())
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<CapWindow> {
            Ok(CapWindow {
                agent_id: agent_id.to_string(),
                period,
                period_start,
                amount_earned: r.try_get("amount_earned")?,
                cap: r.try_get("cap")?,
            })
        })
        .transpose()
    }

    // ==================== Catalogs ====================

    async fn insert_catalog_version(&self, version: &RewardCatalogVersion) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO reward_catalog_versions (game_type, version, rewards, fingerprint, published_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (game_type, version) DO NOTHING
            "#,
        )
        .bind(version.game_type.as_str())
        .bind(version.version as i32)
        .bind(serde_json::to_value(&version.rewards)?)
        .bind(&version.fingerprint)
        .bind(version.published_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EconomyError::ConcurrencyConflict(format!(
                "{} catalog version {} already published",
                version.game_type, version.version
            )));
        }
        Ok(())
    }

    async fn catalog_versions(&self, game_type: GameType) -> Result<Vec<RewardCatalogVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT version, rewards, fingerprint, published_at
            FROM reward_catalog_versions
            WHERE game_type = $1
            ORDER BY version ASC
            "#,
        )
        .bind(game_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<RewardCatalogVersion> {
                let rewards: serde_json::Value = row.try_get("rewards")?;
                let rewards: Vec<RewardDefinition> = serde_json::from_value(rewards)?;
                Ok(RewardCatalogVersion {
                    game_type,
                    version: row.try_get::<i32, _>("version")? as u32,
                    rewards,
                    fingerprint: row.try_get("fingerprint")?,
                    published_at: row.try_get("published_at")?,
                })
            })
            .collect()
    }

    // ==================== Outcomes ====================

    async fn insert_outcome(&self, outcome: &DrawOutcome) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO draw_outcomes
                (id, agent_id, game_type, catalog_version, segment_index, label,
                 point_value, xp_value, status, request_key, created_at, expires_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (agent_id, request_key) DO NOTHING
            "#,
        )
        .bind(outcome.id)
        .bind(&outcome.agent_id)
        .bind(outcome.game_type.as_str())
        .bind(outcome.catalog_version as i32)
        .bind(outcome.segment_index as i32)
        .bind(&outcome.label)
        .bind(outcome.point_value)
        .bind(outcome.xp_value)
        .bind(outcome.status.as_str())
        .bind(&outcome.request_key)
        .bind(outcome.created_at)
        .bind(outcome.expires_at)
        .bind(outcome.resolved_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EconomyError::ConcurrencyConflict(format!(
                "draw request {} already recorded",
                outcome.request_key
            )));
        }
        Ok(())
    }

    async fn get_outcome(&self, id: Uuid) -> Result<Option<DrawOutcome>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM draw_outcomes WHERE id = $1",
            OUTCOME_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_outcome).transpose()
    }

    async fn find_outcome_by_request(
        &self,
        agent_id: &str,
        request_key: &str,
    ) -> Result<Option<DrawOutcome>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM draw_outcomes WHERE agent_id = $1 AND request_key = $2",
            OUTCOME_COLUMNS
        ))
        .bind(agent_id)
        .bind(request_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_outcome).transpose()
    }

    async fn transition_outcome(
        &self,
        id: Uuid,
        from: OutcomeStatus,
        to: OutcomeStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE draw_outcomes SET status = $3, resolved_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn due_outcomes(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DrawOutcome>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM draw_outcomes
            WHERE status = 'pending' AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
            OUTCOME_COLUMNS
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_outcome).collect()
    }

    // ==================== Challenges ====================

    async fn accept_challenge(&self, agent_id: &str, challenge_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO challenge_acceptances (agent_id, challenge_id)
            VALUES ($1, $2)
            ON CONFLICT (agent_id, challenge_id) DO NOTHING
            "#,
        )
        .bind(agent_id)
        .bind(challenge_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn has_accepted_challenge(&self, agent_id: &str, challenge_id: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM challenge_acceptances WHERE agent_id = $1 AND challenge_id = $2",
        )
        .bind(agent_id)
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    // ==================== Tiers ====================

    async fn insert_tier_assignments(
        &self,
        cycle_id: &CycleId,
        assignments: &[TierAssignment],
    ) -> Result<bool> {
        let mut db = self.pool.begin().await?;

        let claimed: Option<String> = sqlx::query_scalar(
            "INSERT INTO tier_cycles (cycle_id, cycle_start) VALUES ($1, $2) ON CONFLICT DO NOTHING RETURNING cycle_id",
        )
        .bind(cycle_id.to_string())
        .bind(cycle_id.start_at())
        .fetch_optional(&mut *db)
        .await?;
        if claimed.is_none() {
            db.rollback().await?;
            return Ok(false);
        }

        for a in assignments {
            sqlx::query(&format!(
                "INSERT INTO tier_assignments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                ASSIGNMENT_COLUMNS
            ))
            .bind(a.cycle_id.to_string())
            .bind(&a.agent_id)
            .bind(a.rank as i32)
            .bind(a.percentile)
            .bind(a.cycle_xp)
            .bind(a.lifetime_points)
            .bind(a.tier as i32)
            .bind(&a.tier_name)
            .bind(a.transition.as_str())
            .bind(a.computed_at)
            .execute(&mut *db)
            .await?;
        }

        db.commit().await?;
        debug!("Inserted {} tier assignments for {}", assignments.len(), cycle_id);
        Ok(true)
    }

    async fn tier_assignments(&self, cycle_id: &CycleId) -> Result<Vec<TierAssignment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tier_assignments WHERE cycle_id = $1 ORDER BY rank ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(cycle_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_assignment).collect()
    }

    async fn latest_tier_cycle(&self) -> Result<Option<CycleId>> {
        let latest: Option<String> = sqlx::query_scalar(
            "SELECT cycle_id FROM tier_cycles ORDER BY cycle_start DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        latest.map(|raw| CycleId::parse(&raw)).transpose()
    }
}
