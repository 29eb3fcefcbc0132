//! Postgres-backed stock store.
//!
//! Every mutation runs in one transaction and follows the same locking order:
//!
//! 1. Lock the `stock_totals` row of each touched `(tenant, type, grade)` pair
//!    (`SELECT ... FOR UPDATE`, pairs sorted so two writers never wait on each
//!    other in opposite order).
//! 2. Lock the batch rows involved (`FOR UPDATE`).
//! 3. Decide (validate / plan) in the domain layer; nothing is written before
//!    the decision succeeds.
//! 4. Write batches and journal, then rewrite the pair total from a server-side
//!    `SUM(quantity_g)` in the same transaction.
//!
//! Any error rolls the transaction back (explicitly, or by dropping it), so a
//! failed depletion leaves no partial decrements behind.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError |
//! |------------|----------------------|-------------|
//! | Database (unique violation) | `23505` | `Domain(Conflict)` |
//! | Database (check constraint violation) | `23514` | `Domain(InvariantViolation)` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Domain(Conflict)` |
//! | Database (other) | Any other | `Store` |
//! | PoolClosed, PoolTimedOut, Io, ... | N/A | `Store` |

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use agristock_core::{BatchId, DomainError, MovementId, TenantId};
use agristock_stock::{
    BatchNumber, BatchPatch, Depletion, DepletionOrder, MovementKind, Quantity, StockBatch, StockKey,
    StockMovement, StockTotals, plan_depletion,
};

use super::r#trait::{StockSnapshot, StockStore};
use crate::error::LedgerError;

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

const BATCH_COLUMNS: &str =
    "batch_id, veg_type, quality_grade, batch_number, quantity_g, exp_date, date_added";

type Tx = Transaction<'static, Postgres>;

/// Postgres-backed stock store.
///
/// `Send + Sync`; share it behind an `Arc`. The pool handles connection reuse.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the (idempotent) schema.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        info!("stock ledger schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Tx, LedgerError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn commit(tx: Tx) -> Result<(), LedgerError> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

async fn rollback(tx: Tx) -> Result<(), LedgerError> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))
}

/// Lock the totals rows of `keys`, creating them on first use.
async fn lock_pairs(tx: &mut Tx, tenant_id: TenantId, keys: &[StockKey]) -> Result<(), LedgerError> {
    let mut keys = keys.to_vec();
    keys.sort();
    keys.dedup();

    for key in keys {
        sqlx::query(
            r#"
            INSERT INTO stock_totals (tenant_id, veg_type, quality_grade, total_g)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (tenant_id, veg_type, quality_grade) DO NOTHING
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(key.veg_type.as_str())
        .bind(key.quality_grade.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_pair", e))?;

        sqlx::query(
            r#"
            SELECT total_g
            FROM stock_totals
            WHERE tenant_id = $1 AND veg_type = $2 AND quality_grade = $3
            FOR UPDATE
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(key.veg_type.as_str())
        .bind(key.quality_grade.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_pair", e))?;
    }
    Ok(())
}

/// Rewrite the total of `key` from its batches.
async fn refresh_total(tx: &mut Tx, tenant_id: TenantId, key: StockKey) -> Result<Quantity, LedgerError> {
    let total: i64 = sqlx::query_scalar(
        r#"
        UPDATE stock_totals
        SET total_g = (
                SELECT COALESCE(SUM(quantity_g), 0)::BIGINT
                FROM stock_batches
                WHERE tenant_id = $1 AND veg_type = $2 AND quality_grade = $3
            ),
            updated_at = NOW()
        WHERE tenant_id = $1 AND veg_type = $2 AND quality_grade = $3
        RETURNING total_g
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(key.veg_type.as_str())
    .bind(key.quality_grade.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("refresh_total", e))?;

    Ok(Quantity::from_grams(total)?)
}

async fn fetch_batch(
    tx: &mut Tx,
    tenant_id: TenantId,
    batch_id: BatchId,
    for_update: bool,
) -> Result<StockBatch, LedgerError> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE tenant_id = $1 AND batch_id = $2{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(tenant_id.as_uuid())
        .bind(batch_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("fetch_batch", e))?
        .ok_or(DomainError::NotFound)?;
    batch_from_row(&row)
}

/// Lock the pairs `batch` currently belongs to (plus `extra`), then re-read it
/// under a row lock. Fails with `Conflict` if a concurrent edit moved the batch
/// to a different pair in between.
async fn lock_batch(
    tx: &mut Tx,
    tenant_id: TenantId,
    seen: &StockBatch,
    extra: Option<StockKey>,
) -> Result<StockBatch, LedgerError> {
    let mut keys = vec![seen.key()];
    keys.extend(extra);
    lock_pairs(tx, tenant_id, &keys).await?;

    let locked = fetch_batch(tx, tenant_id, seen.batch_id(), true).await?;
    if locked.key() != seen.key() {
        return Err(DomainError::conflict(format!(
            "batch {} was moved to {} concurrently",
            seen.batch_id(),
            locked.key()
        ))
        .into());
    }
    Ok(locked)
}

async fn insert_movements(tx: &mut Tx, tenant_id: TenantId, movements: &[StockMovement]) -> Result<(), LedgerError> {
    for m in movements {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                tenant_id,
                movement_id,
                batch_id,
                veg_type,
                quality_grade,
                kind,
                delta_g,
                occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(m.id.as_uuid())
        .bind(m.batch_id.as_uuid())
        .bind(m.veg_type.as_str())
        .bind(m.quality_grade.as_str())
        .bind(m.kind.as_str())
        .bind(m.delta_grams)
        .bind(m.occurred_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl StockStore for PostgresStockStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(
        skip(self, batch),
        fields(tenant_id = %tenant_id, batch_id = %batch.batch_id(), pair = %batch.key()),
        err
    )]
    async fn insert_batch(&self, tenant_id: TenantId, batch: StockBatch) -> Result<StockBatch, LedgerError> {
        let mut tx = self.begin().await?;
        lock_pairs(&mut tx, tenant_id, &[batch.key()]).await?;

        // Hand back the stored row: TIMESTAMPTZ keeps microseconds only.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO stock_batches (
                tenant_id,
                batch_id,
                veg_type,
                quality_grade,
                batch_number,
                quantity_g,
                exp_date,
                date_added
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(batch.batch_id().as_uuid())
        .bind(batch.veg_type().as_str())
        .bind(batch.quality_grade().as_str())
        .bind(batch.batch_number().as_str())
        .bind(batch.quantity().grams())
        .bind(batch.exp_date())
        .bind(batch.date_added())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_batch", e))?;
        let stored = batch_from_row(&row)?;

        insert_movements(&mut tx, tenant_id, &[StockMovement::intake(&stored)]).await?;
        refresh_total(&mut tx, tenant_id, stored.key()).await?;
        commit(tx).await?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, batch_id = %batch_id), err)]
    async fn get_batch(&self, tenant_id: TenantId, batch_id: BatchId) -> Result<StockBatch, LedgerError> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE tenant_id = $1 AND batch_id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(batch_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_batch", e))?
        .ok_or(DomainError::NotFound)?;
        batch_from_row(&row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn snapshot(&self, tenant_id: TenantId) -> Result<StockSnapshot, LedgerError> {
        // One repeatable-read transaction so batches and totals agree.
        let mut tx = self.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE tenant_id = $1 ORDER BY seq ASC"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_batches", e))?;
        let batches = rows.iter().map(batch_from_row).collect::<Result<Vec<_>, _>>()?;

        let total_rows = sqlx::query(
            "SELECT veg_type, quality_grade, total_g FROM stock_totals WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_totals", e))?;

        let mut totals = StockTotals::new();
        for row in &total_rows {
            let key = key_from_row(row)?;
            let grams: i64 = row.try_get("total_g").map_err(|e| map_sqlx_error("decode_total", e))?;
            totals.set(key, Quantity::from_grams(grams)?);
        }

        rollback(tx).await?;
        Ok(StockSnapshot { batches, totals })
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, pair = %key), err)]
    async fn total_for(&self, tenant_id: TenantId, key: StockKey) -> Result<Quantity, LedgerError> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT total_g
            FROM stock_totals
            WHERE tenant_id = $1 AND veg_type = $2 AND quality_grade = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(key.veg_type.as_str())
        .bind(key.quality_grade.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("total_for", e))?;

        Ok(Quantity::from_grams(total.unwrap_or(0))?)
    }

    #[instrument(skip(self, patch), fields(tenant_id = %tenant_id, batch_id = %batch_id), err)]
    async fn update_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        patch: &BatchPatch,
        at: DateTime<Utc>,
    ) -> Result<StockBatch, LedgerError> {
        let mut tx = self.begin().await?;

        let seen = fetch_batch(&mut tx, tenant_id, batch_id, false).await?;
        let target = seen.patched(patch)?.key();
        let before = lock_batch(&mut tx, tenant_id, &seen, Some(target)).await?;
        let after = before.patched(patch)?;

        sqlx::query(
            r#"
            UPDATE stock_batches
            SET veg_type = $3,
                quality_grade = $4,
                batch_number = $5,
                quantity_g = $6,
                exp_date = $7
            WHERE tenant_id = $1 AND batch_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(batch_id.as_uuid())
        .bind(after.veg_type().as_str())
        .bind(after.quality_grade().as_str())
        .bind(after.batch_number().as_str())
        .bind(after.quantity().grams())
        .bind(after.exp_date())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_batch", e))?;

        insert_movements(&mut tx, tenant_id, &StockMovement::adjustment(&before, &after, at)).await?;
        refresh_total(&mut tx, tenant_id, before.key()).await?;
        if after.key() != before.key() {
            refresh_total(&mut tx, tenant_id, after.key()).await?;
        }
        commit(tx).await?;
        Ok(after)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, batch_id = %batch_id), err)]
    async fn delete_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        at: DateTime<Utc>,
    ) -> Result<StockBatch, LedgerError> {
        let mut tx = self.begin().await?;

        let seen = fetch_batch(&mut tx, tenant_id, batch_id, false).await?;
        let batch = lock_batch(&mut tx, tenant_id, &seen, None).await?;

        sqlx::query("DELETE FROM stock_batches WHERE tenant_id = $1 AND batch_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(batch_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_batch", e))?;

        let movements: Vec<_> = StockMovement::removal(&batch, at).into_iter().collect();
        insert_movements(&mut tx, tenant_id, &movements).await?;
        refresh_total(&mut tx, tenant_id, batch.key()).await?;
        commit(tx).await?;
        Ok(batch)
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, pair = %key, amount = %amount, order = order.as_str()),
        err
    )]
    async fn remove_quantity(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        amount: Quantity,
        order: DepletionOrder,
        at: DateTime<Utc>,
    ) -> Result<Depletion, LedgerError> {
        let mut tx = self.begin().await?;
        lock_pairs(&mut tx, tenant_id, &[key]).await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM stock_batches
            WHERE tenant_id = $1 AND veg_type = $2 AND quality_grade = $3
            ORDER BY seq ASC
            FOR UPDATE
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(key.veg_type.as_str())
        .bind(key.quality_grade.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_pair_batches", e))?;
        let batches = rows.iter().map(batch_from_row).collect::<Result<Vec<_>, _>>()?;

        let plan = match plan_depletion(&batches, key, amount, order) {
            Ok(plan) => plan,
            Err(e) => {
                rollback(tx).await?;
                return Err(e.into());
            }
        };

        for draw in &plan.draws {
            sqlx::query(
                r#"
                UPDATE stock_batches
                SET quantity_g = $3
                WHERE tenant_id = $1 AND batch_id = $2
                "#,
            )
            .bind(tenant_id.as_uuid())
            .bind(draw.batch_id.as_uuid())
            .bind(draw.remaining.grams())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("deplete_batch", e))?;
        }

        let movements: Vec<_> = plan
            .draws
            .iter()
            .map(|draw| StockMovement::depletion(key, draw, at))
            .collect();
        insert_movements(&mut tx, tenant_id, &movements).await?;
        refresh_total(&mut tx, tenant_id, key).await?;
        commit(tx).await?;
        Ok(plan)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn movements(&self, tenant_id: TenantId) -> Result<Vec<StockMovement>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT
                movement_id,
                batch_id,
                veg_type,
                quality_grade,
                kind,
                delta_g,
                occurred_at
            FROM stock_movements
            WHERE tenant_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }
}

fn key_from_row(row: &PgRow) -> Result<StockKey, LedgerError> {
    let veg: String = row.try_get("veg_type").map_err(|e| map_sqlx_error("decode_row", e))?;
    let grade: String = row
        .try_get("quality_grade")
        .map_err(|e| map_sqlx_error("decode_row", e))?;
    Ok(StockKey::new(
        veg.parse().map_err(corrupt_row)?,
        grade.parse().map_err(corrupt_row)?,
    ))
}

fn batch_from_row(row: &PgRow) -> Result<StockBatch, LedgerError> {
    let decode = |e| map_sqlx_error("decode_batch", e);

    let batch_id: Uuid = row.try_get("batch_id").map_err(decode)?;
    let batch_number: String = row.try_get("batch_number").map_err(decode)?;
    let quantity_g: i64 = row.try_get("quantity_g").map_err(decode)?;
    let exp_date: NaiveDate = row.try_get("exp_date").map_err(decode)?;
    let date_added: DateTime<Utc> = row.try_get("date_added").map_err(decode)?;

    StockBatch::restore(
        BatchId::from_uuid(batch_id),
        key_from_row(row)?,
        BatchNumber::parse(&batch_number).map_err(corrupt_row)?,
        Quantity::from_grams(quantity_g).map_err(corrupt_row)?,
        exp_date,
        date_added,
    )
    .map_err(corrupt_row)
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement, LedgerError> {
    let decode = |e| map_sqlx_error("decode_movement", e);

    let movement_id: Uuid = row.try_get("movement_id").map_err(decode)?;
    let batch_id: Uuid = row.try_get("batch_id").map_err(decode)?;
    let kind: String = row.try_get("kind").map_err(decode)?;
    let delta_grams: i64 = row.try_get("delta_g").map_err(decode)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(decode)?;
    let key = key_from_row(row)?;

    Ok(StockMovement {
        id: MovementId::from_uuid(movement_id),
        batch_id: BatchId::from_uuid(batch_id),
        veg_type: key.veg_type,
        quality_grade: key.quality_grade,
        kind: kind.parse::<MovementKind>().map_err(corrupt_row)?,
        delta_grams,
        occurred_at,
    })
}

fn corrupt_row(err: DomainError) -> LedgerError {
    LedgerError::store(format!("corrupt stock row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => DomainError::conflict(msg).into(),
                // Check constraint violation (negative quantity, bad enum text)
                Some("23514") => DomainError::invariant(msg).into(),
                // Serialization failure / deadlock detected
                Some("40001") | Some("40P01") => DomainError::conflict(msg).into(),
                _ => LedgerError::Store(msg),
            }
        }
        sqlx::Error::PoolClosed => LedgerError::Store(format!("connection pool closed in {}", operation)),
        sqlx::Error::PoolTimedOut => {
            LedgerError::Store(format!("timed out acquiring a connection in {}", operation))
        }
        _ => LedgerError::Store(format!("sqlx error in {}: {}", operation, err)),
    }
}
