//! Durable [`LedgerStore`] on `PostgreSQL`.
//!
//! Every participant commit runs in its own transaction:
//!
//! ```text
//! BEGIN
//!   SELECT ... FROM participants WHERE id = $1 FOR UPDATE
//!   -- mutator runs against the locked row
//!   UPDATE participants ...
//!   INSERT INTO transactions ...
//! COMMIT
//! ```
//!
//! The row lock serializes racing passes on the same participant, and the
//! partial unique index on `(participant_id, kind, cycle_id)` rejects a
//! second close or hazard record for one cycle even if a writer bypassed
//! the lock. The phenomenon singleton is committed the same way.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgConnection;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use colony_ledger::{Commit, CommitOutcome, LedgerStore, PhenomenonCommit, StoreError};
use colony_types::{
    EconomyConfig, MarketBoard, Participant, ParticipantId, PhenomenonKind, PhenomenonState,
    Role, Strike, TransactionId, TransactionKind, TransactionRecord, TransactionStatus,
};

use crate::error::DbError;
use crate::postgres::PostgresPool;

const PARTICIPANT_SELECT: &str = r"SELECT id, email, role::TEXT AS role, balance, active, cycles_completed, last_settled_cycle, last_hazard_cycle, last_investment_at, protected_until, production_holdings, equity_holdings
  FROM participants";

const PHENOMENON_SELECT: &str = r"SELECT active, kind::TEXT AS kind, damage_pct, cycles_remaining, warning_active, last_advanced_cycle, last_strike
  FROM phenomenon
  WHERE id = 1";

/// `PostgreSQL`-backed ledger store.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a store over an open pool.
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    /// Write `economy` and `market` only where nothing is stored yet.
    ///
    /// Returns whether the economy row was created. Existing parameters
    /// are never overwritten, so restarting with an edited config file
    /// does not change a running colony.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a write fails.
    pub async fn seed(&self, economy: &EconomyConfig, market: &MarketBoard) -> Result<bool, DbError> {
        let mut tx = self.pool.begin().await?;
        let created = sqlx::query(
            r"INSERT INTO economy (id, config) VALUES (1, $1)
              ON CONFLICT (id) DO NOTHING",
        )
        .bind(Json(economy))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let (categories, prices): (Vec<String>, Vec<Decimal>) = market
            .prices
            .iter()
            .map(|(category, price)| (category.clone(), *price))
            .unzip();
        sqlx::query(
            r"INSERT INTO market_prices (category, price)
              SELECT * FROM UNNEST($1::TEXT[], $2::NUMERIC[])
              ON CONFLICT (category) DO NOTHING",
        )
        .bind(&categories)
        .bind(&prices)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(created, categories = categories.len(), "Economy seeded");
        Ok(created)
    }

    async fn fetch_participants(&self) -> Result<Vec<Participant>, DbError> {
        let sql = format!("{PARTICIPANT_SELECT} ORDER BY id");
        let rows: Vec<ParticipantRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(ParticipantRow::into_participant).collect()
    }

    async fn fetch_participant(&self, id: ParticipantId) -> Result<Option<Participant>, DbError> {
        let sql = format!("{PARTICIPANT_SELECT} WHERE id = $1");
        let row: Option<ParticipantRow> = sqlx::query_as(&sql)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ParticipantRow::into_participant).transpose()
    }

    async fn store_participant(&self, participant: &Participant) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        write_participant(&mut conn, participant).await
    }

    async fn delete_participant(&self, id: ParticipantId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM participants WHERE id = $1")
            .bind(id.into_inner())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock_and_commit<F>(&self, id: ParticipantId, mutator: F) -> Result<CommitOutcome, DbError>
    where
        F: FnOnce(&mut Participant) -> Commit + Send,
    {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{PARTICIPANT_SELECT} WHERE id = $1 FOR UPDATE");
        let row: Option<ParticipantRow> = sqlx::query_as(&sql)
            .bind(id.into_inner())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(CommitOutcome::Missing);
        };
        let current = row.into_participant()?;

        let mut working = current.clone();
        match mutator(&mut working) {
            Commit::Skip => {
                tx.rollback().await?;
                Ok(CommitOutcome::Skipped(current))
            }
            Commit::Write(records) => {
                write_participant(&mut tx, &working).await?;
                insert_records(&mut tx, &records).await?;
                tx.commit().await?;
                debug!(
                    participant_id = %id,
                    records = records.len(),
                    balance = %working.balance,
                    "Participant committed"
                );
                Ok(CommitOutcome::Applied(working))
            }
        }
    }

    async fn fetch_phenomenon(&self) -> Result<PhenomenonState, DbError> {
        let row: Option<PhenomenonRow> = sqlx::query_as(PHENOMENON_SELECT)
            .fetch_optional(&self.pool)
            .await?;
        row.map_or_else(|| Ok(PhenomenonState::default()), PhenomenonRow::into_state)
    }

    async fn lock_and_commit_phenomenon<F>(&self, mutator: F) -> Result<PhenomenonCommit, DbError>
    where
        F: FnOnce(&mut PhenomenonState) -> bool + Send,
    {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO phenomenon (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
            .execute(&mut *tx)
            .await?;
        let sql = format!("{PHENOMENON_SELECT} FOR UPDATE");
        let row: PhenomenonRow = sqlx::query_as(&sql).fetch_one(&mut *tx).await?;
        let current = row.into_state()?;

        let mut working = current.clone();
        if !mutator(&mut working) {
            tx.rollback().await?;
            return Ok(PhenomenonCommit::Unchanged(current));
        }

        sqlx::query(
            r"UPDATE phenomenon
              SET active = $1, kind = $2::phenomenon_kind, damage_pct = $3, cycles_remaining = $4,
                  warning_active = $5, last_advanced_cycle = $6, last_strike = $7
              WHERE id = 1",
        )
        .bind(working.active)
        .bind(working.kind.map(phenomenon_kind_to_db))
        .bind(working.damage_pct)
        .bind(i32::try_from(working.cycles_remaining).unwrap_or(i32::MAX))
        .bind(working.warning_active)
        .bind(working.last_advanced_cycle.map(counter_to_db))
        .bind(working.last_strike.map(Json))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            active = working.active,
            cycles_remaining = working.cycles_remaining,
            last_advanced_cycle = ?working.last_advanced_cycle,
            "Phenomenon committed"
        );
        Ok(PhenomenonCommit::Applied(working))
    }

    async fn fetch_economy(&self) -> Result<EconomyConfig, DbError> {
        let row: Option<(Json<EconomyConfig>,)> =
            sqlx::query_as("SELECT config FROM economy WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(config),)| config).unwrap_or_default())
    }

    async fn store_economy(&self, economy: &EconomyConfig) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO economy (id, config) VALUES (1, $1)
              ON CONFLICT (id) DO UPDATE SET config = EXCLUDED.config",
        )
        .bind(Json(economy))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_market(&self) -> Result<MarketBoard, DbError> {
        let rows: Vec<(String, Decimal)> =
            sqlx::query_as("SELECT category, price FROM market_prices")
                .fetch_all(&self.pool)
                .await?;
        Ok(MarketBoard::from_prices(rows))
    }

    async fn store_market(&self, market: &MarketBoard) -> Result<(), DbError> {
        let (categories, prices): (Vec<String>, Vec<Decimal>) = market
            .prices
            .iter()
            .map(|(category, price)| (category.clone(), *price))
            .unzip();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM market_prices")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r"INSERT INTO market_prices (category, price)
              SELECT * FROM UNNEST($1::TEXT[], $2::NUMERIC[])",
        )
        .bind(&categories)
        .bind(&prices)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn store_record(&self, record: &TransactionRecord) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        insert_records(&mut conn, std::slice::from_ref(record)).await
    }

    async fn fetch_transactions(
        &self,
        id: ParticipantId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, DbError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r"SELECT id, participant_id, kind::TEXT AS kind, amount, detail, cycle_id, created_at
              FROM transactions
              WHERE participant_id = $1
              ORDER BY created_at DESC, id DESC
              LIMIT $2",
        )
        .bind(id.into_inner())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TransactionRow::into_record).collect()
    }
}

impl LedgerStore for PgLedgerStore {
    async fn participants(&self) -> Result<Vec<Participant>, StoreError> {
        Ok(self.fetch_participants().await?)
    }

    async fn read_participant(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        Ok(self.fetch_participant(id).await?)
    }

    async fn upsert_participant(&self, participant: Participant) -> Result<(), StoreError> {
        Ok(self.store_participant(&participant).await?)
    }

    async fn remove_participant(&self, id: ParticipantId) -> Result<bool, StoreError> {
        Ok(self.delete_participant(id).await?)
    }

    async fn commit_participant<F>(
        &self,
        id: ParticipantId,
        mutator: F,
    ) -> Result<CommitOutcome, StoreError>
    where
        F: FnOnce(&mut Participant) -> Commit + Send,
    {
        Ok(self.lock_and_commit(id, mutator).await?)
    }

    async fn load_phenomenon(&self) -> Result<PhenomenonState, StoreError> {
        Ok(self.fetch_phenomenon().await?)
    }

    async fn commit_phenomenon<F>(&self, mutator: F) -> Result<PhenomenonCommit, StoreError>
    where
        F: FnOnce(&mut PhenomenonState) -> bool + Send,
    {
        Ok(self.lock_and_commit_phenomenon(mutator).await?)
    }

    async fn load_economy(&self) -> Result<EconomyConfig, StoreError> {
        Ok(self.fetch_economy().await?)
    }

    async fn save_economy(&self, economy: EconomyConfig) -> Result<(), StoreError> {
        Ok(self.store_economy(&economy).await?)
    }

    async fn load_market(&self) -> Result<MarketBoard, StoreError> {
        Ok(self.fetch_market().await?)
    }

    async fn save_market(&self, market: MarketBoard) -> Result<(), StoreError> {
        Ok(self.store_market(&market).await?)
    }

    async fn append_transaction(&self, record: TransactionRecord) -> Result<(), StoreError> {
        Ok(self.store_record(&record).await?)
    }

    async fn transactions_for(
        &self,
        id: ParticipantId,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self.fetch_transactions(id, limit).await?)
    }
}

async fn write_participant(conn: &mut PgConnection, p: &Participant) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO participants (id, email, role, balance, active, cycles_completed, last_settled_cycle, last_hazard_cycle, last_investment_at, protected_until, production_holdings, equity_holdings, updated_at)
          VALUES ($1, $2, $3::participant_role, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
          ON CONFLICT (id) DO UPDATE SET
              email = EXCLUDED.email,
              role = EXCLUDED.role,
              balance = EXCLUDED.balance,
              active = EXCLUDED.active,
              cycles_completed = EXCLUDED.cycles_completed,
              last_settled_cycle = EXCLUDED.last_settled_cycle,
              last_hazard_cycle = EXCLUDED.last_hazard_cycle,
              last_investment_at = EXCLUDED.last_investment_at,
              protected_until = EXCLUDED.protected_until,
              production_holdings = EXCLUDED.production_holdings,
              equity_holdings = EXCLUDED.equity_holdings,
              updated_at = NOW()",
    )
    .bind(p.id.into_inner())
    .bind(&p.email)
    .bind(role_to_db(p.role))
    .bind(p.balance)
    .bind(p.active)
    .bind(counter_to_db(p.cycles_completed))
    .bind(p.last_settled_cycle.map(counter_to_db))
    .bind(p.last_hazard_cycle.map(counter_to_db))
    .bind(p.last_investment_at)
    .bind(p.protected_until)
    .bind(Json(&p.production_holdings))
    .bind(Json(&p.equity_holdings))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert records with one UNNEST statement.
async fn insert_records(conn: &mut PgConnection, records: &[TransactionRecord]) -> Result<(), DbError> {
    if records.is_empty() {
        return Ok(());
    }

    let len = records.len();
    let mut ids = Vec::with_capacity(len);
    let mut participants = Vec::with_capacity(len);
    let mut kinds = Vec::with_capacity(len);
    let mut amounts = Vec::with_capacity(len);
    let mut details = Vec::with_capacity(len);
    let mut cycles: Vec<Option<i64>> = Vec::with_capacity(len);
    let mut statuses = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);

    for record in records {
        ids.push(record.id.into_inner());
        participants.push(record.participant_id.into_inner());
        kinds.push(kind_to_db(record.kind).to_owned());
        amounts.push(record.amount);
        details.push(record.detail.clone());
        cycles.push(record.cycle_id.map(counter_to_db));
        statuses.push(status_to_db(record.status).to_owned());
        timestamps.push(record.created_at);
    }

    sqlx::query(
        r"INSERT INTO transactions (id, participant_id, kind, amount, detail, cycle_id, status, created_at)
          SELECT * FROM UNNEST($1::UUID[], $2::UUID[], $3::transaction_kind[], $4::NUMERIC[], $5::TEXT[], $6::BIGINT[], $7::TEXT[], $8::TIMESTAMPTZ[])",
    )
    .bind(&ids)
    .bind(&participants)
    .bind(&kinds)
    .bind(&amounts)
    .bind(&details)
    .bind(&cycles)
    .bind(&statuses)
    .bind(&timestamps)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// A row from the `participants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipantRow {
    /// Participant UUID.
    pub id: Uuid,
    /// Display identity.
    pub email: String,
    /// Role as a string (cast from the `PostgreSQL` enum).
    pub role: String,
    /// Current balance.
    pub balance: Decimal,
    /// Whether financial close applies.
    pub active: bool,
    /// Closes applied so far.
    pub cycles_completed: i64,
    /// Last closed cycle.
    pub last_settled_cycle: Option<i64>,
    /// Last damaged cycle.
    pub last_hazard_cycle: Option<i64>,
    /// Last qualifying investment.
    pub last_investment_at: Option<DateTime<Utc>>,
    /// End of the insurance window.
    pub protected_until: Option<DateTime<Utc>>,
    /// Production license holdings.
    pub production_holdings: Json<BTreeMap<String, u32>>,
    /// Market asset holdings.
    pub equity_holdings: Json<BTreeMap<String, u32>>,
}

impl ParticipantRow {
    /// Decode into the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] for an unknown role or a negative counter.
    pub fn into_participant(self) -> Result<Participant, DbError> {
        let id = self.id;
        let role = role_from_db(&self.role)
            .ok_or_else(|| DbError::corrupt(id, format!("unknown role {}", self.role)))?;
        Ok(Participant {
            id: ParticipantId::from(id),
            email: self.email,
            role,
            balance: self.balance,
            active: self.active,
            cycles_completed: counter_from_db(id, self.cycles_completed)?,
            last_settled_cycle: self
                .last_settled_cycle
                .map(|c| counter_from_db(id, c))
                .transpose()?,
            last_hazard_cycle: self
                .last_hazard_cycle
                .map(|c| counter_from_db(id, c))
                .transpose()?,
            last_investment_at: self.last_investment_at,
            protected_until: self.protected_until,
            production_holdings: self.production_holdings.0,
            equity_holdings: self.equity_holdings.0,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PhenomenonRow {
    active: bool,
    kind: Option<String>,
    damage_pct: Decimal,
    cycles_remaining: i32,
    warning_active: bool,
    last_advanced_cycle: Option<i64>,
    last_strike: Option<Json<Strike>>,
}

impl PhenomenonRow {
    fn into_state(self) -> Result<PhenomenonState, DbError> {
        let kind = self
            .kind
            .map(|k| {
                phenomenon_kind_from_db(&k)
                    .ok_or_else(|| DbError::corrupt("phenomenon", format!("unknown kind {k}")))
            })
            .transpose()?;
        let cycles_remaining = u32::try_from(self.cycles_remaining)
            .map_err(|e| DbError::corrupt("phenomenon", format!("cycles_remaining: {e}")))?;
        Ok(PhenomenonState {
            active: self.active,
            kind,
            damage_pct: self.damage_pct,
            cycles_remaining,
            warning_active: self.warning_active,
            last_advanced_cycle: self
                .last_advanced_cycle
                .map(|c| counter_from_db("phenomenon", c))
                .transpose()?,
            last_strike: self.last_strike.map(|Json(strike)| strike),
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    participant_id: Uuid,
    kind: String,
    amount: Decimal,
    detail: String,
    cycle_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_record(self) -> Result<TransactionRecord, DbError> {
        let id = self.id;
        let kind = kind_from_db(&self.kind)
            .ok_or_else(|| DbError::corrupt(id, format!("unknown kind {}", self.kind)))?;
        Ok(TransactionRecord {
            id: TransactionId::from(id),
            participant_id: ParticipantId::from(self.participant_id),
            kind,
            amount: self.amount,
            detail: self.detail,
            cycle_id: self.cycle_id.map(|c| counter_from_db(id, c)).transpose()?,
            status: TransactionStatus::Approved,
            created_at: self.created_at,
        })
    }
}

fn counter_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn counter_from_db(id: impl ToString, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|e| DbError::corrupt(id, format!("negative counter {value}: {e}")))
}

/// Convert a [`Role`] to its `PostgreSQL` enum string.
const fn role_to_db(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Admin => "admin",
    }
}

fn role_from_db(s: &str) -> Option<Role> {
    match s {
        "user" => Some(Role::User),
        "admin" => Some(Role::Admin),
        _ => None,
    }
}

/// Convert a [`TransactionKind`] to its `PostgreSQL` enum string.
const fn kind_to_db(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::LifeCost => "life_cost",
        TransactionKind::ProductionDividend => "production_dividend",
        TransactionKind::InactivityTax => "inactivity_tax",
        TransactionKind::EquityDividend => "equity_dividend",
        TransactionKind::NoInvestmentPenalty => "no_investment_penalty",
        TransactionKind::HazardDamage => "hazard_damage",
        TransactionKind::InsurancePurchase => "insurance_purchase",
        TransactionKind::Transfer => "transfer",
        TransactionKind::Dividends => "dividends",
        TransactionKind::Work => "work",
    }
}

fn kind_from_db(s: &str) -> Option<TransactionKind> {
    Some(match s {
        "life_cost" => TransactionKind::LifeCost,
        "production_dividend" => TransactionKind::ProductionDividend,
        "inactivity_tax" => TransactionKind::InactivityTax,
        "equity_dividend" => TransactionKind::EquityDividend,
        "no_investment_penalty" => TransactionKind::NoInvestmentPenalty,
        "hazard_damage" => TransactionKind::HazardDamage,
        "insurance_purchase" => TransactionKind::InsurancePurchase,
        "transfer" => TransactionKind::Transfer,
        "dividends" => TransactionKind::Dividends,
        "work" => TransactionKind::Work,
        _ => return None,
    })
}

/// Convert a [`PhenomenonKind`] to its `PostgreSQL` enum string.
const fn phenomenon_kind_to_db(kind: PhenomenonKind) -> &'static str {
    match kind {
        PhenomenonKind::SolarStorm => "solar_storm",
        PhenomenonKind::AlienAttack => "alien_attack",
        PhenomenonKind::MeteorShower => "meteor_shower",
    }
}

fn phenomenon_kind_from_db(s: &str) -> Option<PhenomenonKind> {
    PhenomenonKind::ALL
        .into_iter()
        .find(|kind| phenomenon_kind_to_db(*kind) == s)
}

const fn status_to_db(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Approved => "APPROVED",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    const ALL_KINDS: [TransactionKind; 10] = [
        TransactionKind::LifeCost,
        TransactionKind::ProductionDividend,
        TransactionKind::InactivityTax,
        TransactionKind::EquityDividend,
        TransactionKind::NoInvestmentPenalty,
        TransactionKind::HazardDamage,
        TransactionKind::InsurancePurchase,
        TransactionKind::Transfer,
        TransactionKind::Dividends,
        TransactionKind::Work,
    ];

    fn row() -> ParticipantRow {
        ParticipantRow {
            id: Uuid::now_v7(),
            email: "a@colony.test".to_owned(),
            role: "admin".to_owned(),
            balance: dec!(12.50),
            active: true,
            cycles_completed: 3,
            last_settled_cycle: Some(41),
            last_hazard_cycle: None,
            last_investment_at: None,
            protected_until: None,
            production_holdings: Json(BTreeMap::from([("mineria".to_owned(), 2)])),
            equity_holdings: Json(BTreeMap::new()),
        }
    }

    #[test]
    fn every_kind_maps_both_ways() {
        for kind in ALL_KINDS {
            assert_eq!(kind_from_db(kind_to_db(kind)), Some(kind));
        }
        assert_eq!(kind_from_db("DIVIDENDS"), None);
    }

    #[test]
    fn every_phenomenon_kind_maps_both_ways() {
        for kind in PhenomenonKind::ALL {
            assert_eq!(phenomenon_kind_from_db(phenomenon_kind_to_db(kind)), Some(kind));
        }
    }

    #[test]
    fn participant_row_decodes() {
        let participant = row().into_participant().unwrap();
        assert_eq!(participant.role, Role::Admin);
        assert_eq!(participant.cycles_completed, 3);
        assert_eq!(participant.last_settled_cycle, Some(41));
        assert_eq!(participant.production_holdings.get("mineria"), Some(&2));
    }

    #[test]
    fn negative_counter_is_corrupt() {
        let mut bad = row();
        bad.last_settled_cycle = Some(-1);
        assert!(matches!(bad.into_participant(), Err(DbError::Corrupt { .. })));
    }

    #[test]
    fn unknown_role_is_corrupt() {
        let mut bad = row();
        bad.role = "overlord".to_owned();
        assert!(matches!(bad.into_participant(), Err(DbError::Corrupt { .. })));
    }

    #[test]
    fn phenomenon_row_restores_strike() {
        let strike = Strike {
            cycle_id: 9,
            kind: PhenomenonKind::AlienAttack,
            damage_pct: dec!(12),
        };
        let state = PhenomenonRow {
            active: true,
            kind: Some("alien_attack".to_owned()),
            damage_pct: dec!(12),
            cycles_remaining: 2,
            warning_active: false,
            last_advanced_cycle: Some(9),
            last_strike: Some(Json(strike)),
        }
        .into_state()
        .unwrap();
        assert_eq!(state.kind, Some(PhenomenonKind::AlienAttack));
        assert_eq!(state.last_strike, Some(strike));
        assert_eq!(state.cycles_remaining, 2);
    }
}
