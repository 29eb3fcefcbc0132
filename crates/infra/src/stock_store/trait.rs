use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use agristock_core::{BatchId, TenantId};
use agristock_stock::{
    BatchPatch, Depletion, DepletionOrder, Quantity, StockBatch, StockKey, StockMovement, StockTotals,
};

use crate::error::LedgerError;

/// Every batch of a tenant plus the matching per-pair totals, read at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockSnapshot {
    pub batches: Vec<StockBatch>,
    pub totals: StockTotals,
}

/// Tenant-scoped storage of stock batches, pair totals and the movement journal.
///
/// ## Atomicity
///
/// Each mutating call is one unit of work: batch rows, the pair total(s) and the
/// journal entries are committed together or not at all. In particular
/// `remove_quantity` must check feasibility before writing and must leave no
/// partial decrements behind when it fails.
///
/// ## Concurrency
///
/// Concurrent calls touching the same `(tenant, vegType, grade)` pair must be
/// serialized by the implementation (no lost updates, never a negative
/// quantity). Calls on different pairs need not coordinate.
///
/// ## Ordering
///
/// `snapshot().batches` and `movements()` are returned in insertion order.
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    /// Short name of the backend (`memory`, `postgres`).
    fn backend(&self) -> &'static str;

    async fn insert_batch(&self, tenant_id: TenantId, batch: StockBatch) -> Result<StockBatch, LedgerError>;

    async fn get_batch(&self, tenant_id: TenantId, batch_id: BatchId) -> Result<StockBatch, LedgerError>;

    async fn snapshot(&self, tenant_id: TenantId) -> Result<StockSnapshot, LedgerError>;

    async fn total_for(&self, tenant_id: TenantId, key: StockKey) -> Result<Quantity, LedgerError>;

    async fn update_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        patch: &BatchPatch,
        at: DateTime<Utc>,
    ) -> Result<StockBatch, LedgerError>;

    async fn delete_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        at: DateTime<Utc>,
    ) -> Result<StockBatch, LedgerError>;

    async fn remove_quantity(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        amount: Quantity,
        order: DepletionOrder,
        at: DateTime<Utc>,
    ) -> Result<Depletion, LedgerError>;

    async fn movements(&self, tenant_id: TenantId) -> Result<Vec<StockMovement>, LedgerError>;
}

#[async_trait::async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    async fn insert_batch(&self, tenant_id: TenantId, batch: StockBatch) -> Result<StockBatch, LedgerError> {
        (**self).insert_batch(tenant_id, batch).await
    }

    async fn get_batch(&self, tenant_id: TenantId, batch_id: BatchId) -> Result<StockBatch, LedgerError> {
        (**self).get_batch(tenant_id, batch_id).await
    }

    async fn snapshot(&self, tenant_id: TenantId) -> Result<StockSnapshot, LedgerError> {
        (**self).snapshot(tenant_id).await
    }

    async fn total_for(&self, tenant_id: TenantId, key: StockKey) -> Result<Quantity, LedgerError> {
        (**self).total_for(tenant_id, key).await
    }

    async fn update_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        patch: &BatchPatch,
        at: DateTime<Utc>,
    ) -> Result<StockBatch, LedgerError> {
        (**self).update_batch(tenant_id, batch_id, patch, at).await
    }

    async fn delete_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        at: DateTime<Utc>,
    ) -> Result<StockBatch, LedgerError> {
        (**self).delete_batch(tenant_id, batch_id, at).await
    }

    async fn remove_quantity(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        amount: Quantity,
        order: DepletionOrder,
        at: DateTime<Utc>,
    ) -> Result<Depletion, LedgerError> {
        (**self).remove_quantity(tenant_id, key, amount, order, at).await
    }

    async fn movements(&self, tenant_id: TenantId) -> Result<Vec<StockMovement>, LedgerError> {
        (**self).movements(tenant_id).await
    }
}
