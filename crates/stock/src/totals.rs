//! Per-type/per-grade aggregate totals.

use serde::ser::{Serialize, SerializeMap, Serializer};

use agristock_core::{DomainError, DomainResult};

use crate::batch::StockBatch;
use crate::quantity::Quantity;
use crate::types::{QualityGrade, StockKey, VegType};

const TYPES: usize = VegType::ALL.len();
const GRADES: usize = QualityGrade::ALL.len();

/// Aggregate total for every `(vegType, grade)` pair. Absent pairs are zero.
///
/// Serializes as `{"Carrot": {"A": 30.0, "B": 0.0, ...}, ...}` in kilograms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockTotals {
    grid: [[Quantity; GRADES]; TYPES],
}

impl StockTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute totals from scratch.
    pub fn from_batches<'a, I>(batches: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = &'a StockBatch>,
    {
        let mut totals = Self::new();
        for batch in batches {
            totals.credit(batch.key(), batch.quantity())?;
        }
        Ok(totals)
    }

    pub fn get(&self, key: StockKey) -> Quantity {
        self.grid[key.veg_type.index()][key.quality_grade.index()]
    }

    pub fn set(&mut self, key: StockKey, quantity: Quantity) {
        self.grid[key.veg_type.index()][key.quality_grade.index()] = quantity;
    }

    pub fn credit(&mut self, key: StockKey, quantity: Quantity) -> DomainResult<()> {
        let next = self
            .get(key)
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant(format!("total for {key} overflowed")))?;
        self.set(key, next);
        Ok(())
    }

    pub fn debit(&mut self, key: StockKey, quantity: Quantity) -> DomainResult<()> {
        let next = self
            .get(key)
            .checked_sub(quantity)
            .ok_or_else(|| DomainError::invariant(format!("total for {key} would go negative")))?;
        self.set(key, next);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (StockKey, Quantity)> + '_ {
        StockKey::all().map(move |key| (key, self.get(key)))
    }
}

struct GradeRow<'a>(&'a [Quantity; GRADES]);

impl Serialize for GradeRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(GRADES))?;
        for grade in QualityGrade::ALL {
            map.serialize_entry(grade.as_str(), &self.0[grade.index()])?;
        }
        map.end()
    }
}

impl Serialize for StockTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(TYPES))?;
        for veg in VegType::ALL {
            map.serialize_entry(veg.as_str(), &GradeRow(&self.grid[veg.index()]))?;
        }
        map.end()
    }
}
