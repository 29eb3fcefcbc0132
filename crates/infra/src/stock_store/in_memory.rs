use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use agristock_core::{BatchId, DomainError, TenantId};
use agristock_stock::{
    BatchPatch, Depletion, DepletionOrder, Quantity, StockBatch, StockBook, StockKey, StockMovement,
    plan_depletion,
};

use super::r#trait::{StockSnapshot, StockStore};
use crate::error::LedgerError;

/// In-memory stock store.
///
/// Intended for tests/dev. One `StockBook` per tenant; every mutation runs under
/// a single write guard, which makes it atomic and serializes writers.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    books: RwLock<HashMap<TenantId, StockBook>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a tenant's book (for inspection in tests).
    pub fn book(&self, tenant_id: TenantId) -> Option<StockBook> {
        self.read().ok()?.get(&tenant_id).cloned()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<TenantId, StockBook>>, LedgerError> {
        self.books
            .read()
            .map_err(|_| LedgerError::store("lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<TenantId, StockBook>>, LedgerError> {
        self.books
            .write()
            .map_err(|_| LedgerError::store("lock poisoned"))
    }
}

#[async_trait::async_trait]
impl StockStore for InMemoryStockStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_batch(&self, tenant_id: TenantId, batch: StockBatch) -> Result<StockBatch, LedgerError> {
        let mut books = self.write()?;
        Ok(books.entry(tenant_id).or_default().add(batch)?)
    }

    async fn get_batch(&self, tenant_id: TenantId, batch_id: BatchId) -> Result<StockBatch, LedgerError> {
        let books = self.read()?;
        let book = books.get(&tenant_id).ok_or(DomainError::NotFound)?;
        Ok(book.get(batch_id)?.clone())
    }

    async fn snapshot(&self, tenant_id: TenantId) -> Result<StockSnapshot, LedgerError> {
        let books = self.read()?;
        Ok(match books.get(&tenant_id) {
            Some(book) => StockSnapshot {
                batches: book.batches().to_vec(),
                totals: book.totals().clone(),
            },
            None => StockSnapshot {
                batches: Vec::new(),
                totals: Default::default(),
            },
        })
    }

    async fn total_for(&self, tenant_id: TenantId, key: StockKey) -> Result<Quantity, LedgerError> {
        let books = self.read()?;
        Ok(books
            .get(&tenant_id)
            .map(|book| book.total(key))
            .unwrap_or(Quantity::ZERO))
    }

    async fn update_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        patch: &BatchPatch,
        at: DateTime<Utc>,
    ) -> Result<StockBatch, LedgerError> {
        let mut books = self.write()?;
        let book = books.get_mut(&tenant_id).ok_or(DomainError::NotFound)?;
        Ok(book.update(batch_id, patch, at)?)
    }

    async fn delete_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        at: DateTime<Utc>,
    ) -> Result<StockBatch, LedgerError> {
        let mut books = self.write()?;
        let book = books.get_mut(&tenant_id).ok_or(DomainError::NotFound)?;
        Ok(book.delete(batch_id, at)?)
    }

    async fn remove_quantity(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        amount: Quantity,
        order: DepletionOrder,
        at: DateTime<Utc>,
    ) -> Result<Depletion, LedgerError> {
        let mut books = self.write()?;
        match books.get_mut(&tenant_id) {
            Some(book) => Ok(book.deplete(key, amount, order, at)?),
            // Nothing on record: same outcome as an empty book, without creating one.
            None => Ok(plan_depletion(&[] as &[StockBatch], key, amount, order)?),
        }
    }

    async fn movements(&self, tenant_id: TenantId) -> Result<Vec<StockMovement>, LedgerError> {
        let books = self.read()?;
        Ok(books
            .get(&tenant_id)
            .map(|book| book.movements().to_vec())
            .unwrap_or_default())
    }
}
