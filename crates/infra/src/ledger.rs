//! Stock ledger service.
//!
//! Thin coordinator over a [`StockStore`]: assigns ids and timestamps, bounds
//! every store call with the configured timeout and logs committed changes.
//! Consistency (atomic multi-row writes, per-pair serialization) is the store's
//! job; see the trait docs.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, instrument, warn};

use agristock_core::{BatchId, DomainError, TenantId};
use agristock_stock::{
    BatchPatch, Depletion, DepletionOrder, NewBatch, Quantity, StockBatch, StockKey, StockMovement,
};

use crate::error::LedgerError;
use crate::stock_store::{StockSnapshot, StockStore};

/// Current time at the precision Postgres `TIMESTAMPTZ` keeps (microseconds),
/// so a value handed back by a write equals the one read later.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound for a single operation, including waiting on locks.
    pub op_timeout: Duration,
    pub depletion_order: DepletionOrder,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(5),
            depletion_order: DepletionOrder::Fifo,
        }
    }
}

#[derive(Debug)]
pub struct StockLedger<S> {
    store: S,
    config: LedgerConfig,
}

impl<S> StockLedger<S>
where
    S: StockStore,
{
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.config.op_timeout.as_millis() as u64,
                    "stock operation timed out"
                );
                Err(LedgerError::Timeout(self.config.op_timeout))
            }
        }
    }

    /// Record a new batch; the pair total grows by its quantity.
    #[instrument(skip(self, new), fields(tenant_id = %tenant_id, pair = %new.key()), err)]
    pub async fn add_batch(&self, tenant_id: TenantId, new: NewBatch) -> Result<StockBatch, LedgerError> {
        let batch = StockBatch::create(BatchId::new(), new, now());
        let batch = self
            .bounded("add_batch", self.store.insert_batch(tenant_id, batch))
            .await?;

        info!(
            batch_id = %batch.batch_id(),
            batch_number = %batch.batch_number(),
            quantity = %batch.quantity(),
            "stock batch added"
        );
        Ok(batch)
    }

    /// All batches with per-pair totals (absent pairs are zero).
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn list_all(&self, tenant_id: TenantId) -> Result<StockSnapshot, LedgerError> {
        self.bounded("list_all", self.store.snapshot(tenant_id)).await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, batch_id = %batch_id), err)]
    pub async fn get_batch(&self, tenant_id: TenantId, batch_id: BatchId) -> Result<StockBatch, LedgerError> {
        self.bounded("get_batch", self.store.get_batch(tenant_id, batch_id))
            .await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, pair = %key), err)]
    pub async fn total_for(&self, tenant_id: TenantId, key: StockKey) -> Result<Quantity, LedgerError> {
        self.bounded("total_for", self.store.total_for(tenant_id, key))
            .await
    }

    /// Edit a batch. A re-grade or re-type moves its quantity between pair totals.
    #[instrument(skip(self, patch), fields(tenant_id = %tenant_id, batch_id = %batch_id), err)]
    pub async fn update_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        patch: BatchPatch,
    ) -> Result<StockBatch, LedgerError> {
        if patch.is_empty() {
            return Err(DomainError::validation("update must change at least one field").into());
        }

        let batch = self
            .bounded(
                "update_batch",
                self.store.update_batch(tenant_id, batch_id, &patch, now()),
            )
            .await?;

        info!(pair = %batch.key(), quantity = %batch.quantity(), "stock batch updated");
        Ok(batch)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, batch_id = %batch_id), err)]
    pub async fn delete_batch(&self, tenant_id: TenantId, batch_id: BatchId) -> Result<(), LedgerError> {
        let batch = self
            .bounded(
                "delete_batch",
                self.store.delete_batch(tenant_id, batch_id, now()),
            )
            .await?;

        info!(pair = %batch.key(), quantity = %batch.quantity(), "stock batch deleted");
        Ok(())
    }

    /// Draw `amount` from the batches of `key` in the configured order.
    ///
    /// All or nothing: on `InsufficientStock` no batch is touched.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, pair = %key, amount = %amount), err)]
    pub async fn remove_quantity(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        amount: Quantity,
    ) -> Result<Depletion, LedgerError> {
        if amount.is_zero() {
            return Err(DomainError::validation("amount must be greater than zero").into());
        }

        let result = self
            .bounded(
                "remove_quantity",
                self.store.remove_quantity(
                    tenant_id,
                    key,
                    amount,
                    self.config.depletion_order,
                    now(),
                ),
            )
            .await;

        match &result {
            Ok(depletion) => info!(batches = depletion.draws.len(), "stock depleted"),
            Err(e) if e.is_insufficient_stock() => warn!("stock depletion rejected: {e}"),
            Err(_) => {}
        }
        result
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn movements(&self, tenant_id: TenantId) -> Result<Vec<StockMovement>, LedgerError> {
        self.bounded("movements", self.store.movements(tenant_id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::stock_store::InMemoryStockStore;
    use agristock_stock::{BatchNumber, QualityGrade, VegType};

    fn kg(v: f64) -> Quantity {
        Quantity::from_kg(v).unwrap()
    }

    fn carrot_a() -> StockKey {
        StockKey::new(VegType::Carrot, QualityGrade::A)
    }

    fn carrot(number: &str, grade: QualityGrade, kg_amount: f64) -> NewBatch {
        NewBatch::new(
            VegType::Carrot,
            grade,
            BatchNumber::parse(number).unwrap(),
            kg(kg_amount),
            NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
        )
        .unwrap()
    }

    fn ledger() -> StockLedger<Arc<InMemoryStockStore>> {
        StockLedger::new(Arc::new(InMemoryStockStore::new()), LedgerConfig::default())
    }

    #[tokio::test]
    async fn add_then_list_reflects_new_batch_and_total() {
        let ledger = ledger();
        let tenant = TenantId::new();

        let batch = ledger.add_batch(tenant, carrot("CRT0001", QualityGrade::A, 30.0)).await.unwrap();
        let snapshot = ledger.list_all(tenant).await.unwrap();

        assert_eq!(snapshot.batches, vec![batch]);
        assert_eq!(snapshot.totals.get(carrot_a()), kg(30.0));

        // Reads are idempotent.
        assert_eq!(ledger.list_all(tenant).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn timestamps_are_stamped_at_microsecond_precision() {
        let ledger = ledger();
        let tenant = TenantId::new();

        let batch = ledger.add_batch(tenant, carrot("CRT0001", QualityGrade::A, 3.0)).await.unwrap();
        ledger.remove_quantity(tenant, carrot_a(), kg(1.0)).await.unwrap();

        assert_eq!(batch.date_added().timestamp_subsec_nanos() % 1_000, 0);
        let movements = ledger.movements(tenant).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].occurred_at, batch.date_added());
        assert!(movements.iter().all(|m| m.occurred_at.timestamp_subsec_nanos() % 1_000 == 0));
    }

    #[tokio::test]
    async fn remove_quantity_drains_oldest_batch_first() {
        let ledger = ledger();
        let tenant = TenantId::new();
        let first = ledger.add_batch(tenant, carrot("CRT0001", QualityGrade::A, 30.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = ledger.add_batch(tenant, carrot("CRT0002", QualityGrade::A, 20.0)).await.unwrap();

        let depletion = ledger.remove_quantity(tenant, carrot_a(), kg(40.0)).await.unwrap();

        assert_eq!(depletion.draws[0].batch_id, first.batch_id());
        assert_eq!(ledger.get_batch(tenant, first.batch_id()).await.unwrap().quantity(), Quantity::ZERO);
        assert_eq!(ledger.get_batch(tenant, second.batch_id()).await.unwrap().quantity(), kg(10.0));
        assert_eq!(ledger.total_for(tenant, carrot_a()).await.unwrap(), kg(10.0));
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_totals_unchanged() {
        let ledger = ledger();
        let tenant = TenantId::new();
        ledger.add_batch(tenant, carrot("CRT0001", QualityGrade::A, 15.0)).await.unwrap();
        ledger.add_batch(tenant, carrot("CRT0002", QualityGrade::A, 10.0)).await.unwrap();
        let before = ledger.list_all(tenant).await.unwrap();

        let err = ledger.remove_quantity(tenant, carrot_a(), kg(30.0)).await.unwrap_err();

        assert!(err.is_insufficient_stock());
        assert_eq!(ledger.list_all(tenant).await.unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_depletions_never_oversell() {
        let ledger = Arc::new(ledger());
        let tenant = TenantId::new();
        ledger.add_batch(tenant, carrot("CRT0001", QualityGrade::A, 12.0)).await.unwrap();
        ledger.add_batch(tenant, carrot("CRT0002", QualityGrade::A, 8.0)).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.remove_quantity(tenant, carrot_a(), kg(15.0)).await })
            })
            .collect();

        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) if e.is_insufficient_stock() => insufficient += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!((ok, insufficient), (1, 1));
        assert_eq!(ledger.total_for(tenant, carrot_a()).await.unwrap(), kg(5.0));
        let snapshot = ledger.list_all(tenant).await.unwrap();
        let sum = Quantity::sum(snapshot.batches.iter().map(|b| b.quantity())).unwrap();
        assert_eq!(sum, kg(5.0));
    }

    #[tokio::test]
    async fn update_regrade_moves_total_and_delete_subtracts() {
        let ledger = ledger();
        let tenant = TenantId::new();
        let batch = ledger.add_batch(tenant, carrot("CRT0001", QualityGrade::A, 9.0)).await.unwrap();
        let carrot_b = StockKey::new(VegType::Carrot, QualityGrade::B);

        let patch = BatchPatch {
            quality_grade: Some(QualityGrade::B),
            ..BatchPatch::default()
        };
        ledger.update_batch(tenant, batch.batch_id(), patch).await.unwrap();
        assert!(ledger.total_for(tenant, carrot_a()).await.unwrap().is_zero());
        assert_eq!(ledger.total_for(tenant, carrot_b).await.unwrap(), kg(9.0));

        ledger.delete_batch(tenant, batch.batch_id()).await.unwrap();
        assert!(ledger.total_for(tenant, carrot_b).await.unwrap().is_zero());
        assert!(ledger.get_batch(tenant, batch.batch_id()).await.unwrap_err().is_not_found());

        let kinds: Vec<_> = ledger
            .movements(tenant)
            .await
            .unwrap()
            .iter()
            .map(|m| m.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["intake", "adjustment", "adjustment", "removal"]);
    }

    #[tokio::test]
    async fn empty_patch_and_zero_amount_are_validation_errors() {
        let ledger = ledger();
        let tenant = TenantId::new();

        let err = ledger
            .update_batch(tenant, BatchId::new(), BatchPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Domain(DomainError::Validation(_))));

        let err = ledger.remove_quantity(tenant, carrot_a(), Quantity::ZERO).await.unwrap_err();
        assert!(matches!(err, LedgerError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn slow_operations_time_out() {
        let ledger = StockLedger::new(
            Arc::new(InMemoryStockStore::new()),
            LedgerConfig {
                op_timeout: Duration::from_millis(20),
                ..LedgerConfig::default()
            },
        );

        let err = ledger
            .bounded("stalled", std::future::pending::<Result<(), LedgerError>>())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Timeout(d) if d == Duration::from_millis(20)));
    }
}
