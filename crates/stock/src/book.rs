//! In-memory stock ledger state for one tenant.
//!
//! Every operation validates and plans first, then commits batches, totals and
//! journal together. A failed operation leaves the book untouched.

use chrono::{DateTime, Utc};

use agristock_core::{BatchId, DomainError, DomainResult};

use crate::batch::{BatchPatch, StockBatch};
use crate::depletion::{Depletion, DepletionOrder, plan_depletion};
use crate::movement::StockMovement;
use crate::quantity::Quantity;
use crate::totals::StockTotals;
use crate::types::StockKey;

#[derive(Debug, Clone, Default)]
pub struct StockBook {
    /// Insertion order.
    batches: Vec<StockBatch>,
    totals: StockTotals,
    movements: Vec<StockMovement>,
}

impl StockBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> &[StockBatch] {
        &self.batches
    }

    pub fn totals(&self) -> &StockTotals {
        &self.totals
    }

    pub fn total(&self, key: StockKey) -> Quantity {
        self.totals.get(key)
    }

    pub fn movements(&self) -> &[StockMovement] {
        &self.movements
    }

    pub fn get(&self, id: BatchId) -> DomainResult<&StockBatch> {
        self.batches
            .iter()
            .find(|b| b.batch_id() == id)
            .ok_or(DomainError::NotFound)
    }

    fn position(&self, id: BatchId) -> DomainResult<usize> {
        self.batches
            .iter()
            .position(|b| b.batch_id() == id)
            .ok_or(DomainError::NotFound)
    }

    pub fn add(&mut self, batch: StockBatch) -> DomainResult<StockBatch> {
        if self.get(batch.batch_id()).is_ok() {
            return Err(DomainError::conflict(format!("batch {} already exists", batch.batch_id())));
        }

        let mut totals = self.totals.clone();
        totals.credit(batch.key(), batch.quantity())?;

        self.totals = totals;
        self.movements.push(StockMovement::intake(&batch));
        self.batches.push(batch.clone());
        Ok(batch)
    }

    /// Edit a batch; totals of both the old and the new pair follow.
    pub fn update(&mut self, id: BatchId, patch: &BatchPatch, at: DateTime<Utc>) -> DomainResult<StockBatch> {
        let idx = self.position(id)?;
        let before = &self.batches[idx];
        let after = before.patched(patch)?;

        let mut totals = self.totals.clone();
        totals.debit(before.key(), before.quantity())?;
        totals.credit(after.key(), after.quantity())?;
        let movements = StockMovement::adjustment(before, &after, at);

        self.totals = totals;
        self.movements.extend(movements);
        self.batches[idx] = after.clone();
        Ok(after)
    }

    pub fn delete(&mut self, id: BatchId, at: DateTime<Utc>) -> DomainResult<StockBatch> {
        let idx = self.position(id)?;
        let batch = &self.batches[idx];

        let mut totals = self.totals.clone();
        totals.debit(batch.key(), batch.quantity())?;
        let movement = StockMovement::removal(batch, at);

        self.totals = totals;
        self.movements.extend(movement);
        Ok(self.batches.remove(idx))
    }

    /// Draw `amount` from the batches of `key`, all or nothing.
    pub fn deplete(
        &mut self,
        key: StockKey,
        amount: Quantity,
        order: DepletionOrder,
        at: DateTime<Utc>,
    ) -> DomainResult<Depletion> {
        let plan = plan_depletion(&self.batches, key, amount, order)?;

        let mut totals = self.totals.clone();
        totals.debit(key, amount)?;
        let positions = plan
            .draws
            .iter()
            .map(|draw| self.position(draw.batch_id))
            .collect::<DomainResult<Vec<_>>>()?;

        for (idx, draw) in positions.into_iter().zip(&plan.draws) {
            self.batches[idx].set_quantity(draw.remaining);
            self.movements.push(StockMovement::depletion(key, draw, at));
        }
        self.totals = totals;
        Ok(plan)
    }

    /// Check the maintained totals and the journal against the batches.
    pub fn verify(&self) -> DomainResult<()> {
        let recomputed = StockTotals::from_batches(&self.batches)?;
        for (key, total) in self.totals.iter() {
            if recomputed.get(key) != total {
                return Err(DomainError::invariant(format!(
                    "total for {key} is {total}, batches sum to {}",
                    recomputed.get(key)
                )));
            }
            let journal: i64 = self
                .movements
                .iter()
                .filter(|m| m.key() == key)
                .map(|m| m.delta_grams)
                .sum();
            if journal != total.grams() {
                return Err(DomainError::invariant(format!(
                    "journal for {key} sums to {journal} g, total is {}",
                    total.grams()
                )));
            }
        }
        Ok(())
    }
}
