use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use agristock_core::{BatchId, DomainError, DomainResult, Entity};

use crate::quantity::Quantity;
use crate::types::{BatchNumber, QualityGrade, StockKey, VegType};

/// One recorded intake of produce.
///
/// A batch is never removed when it reaches zero; only an explicit delete drops it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockBatch {
    id: BatchId,
    veg_type: VegType,
    quality_grade: QualityGrade,
    batch_number: BatchNumber,
    quantity: Quantity,
    exp_date: NaiveDate,
    date_added: DateTime<Utc>,
}

impl Entity for StockBatch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl StockBatch {
    /// Materialize a validated intake.
    pub fn create(id: BatchId, new: NewBatch, date_added: DateTime<Utc>) -> Self {
        Self {
            id,
            veg_type: new.veg_type,
            quality_grade: new.quality_grade,
            batch_number: new.batch_number,
            quantity: new.quantity,
            exp_date: new.exp_date,
            date_added,
        }
    }

    /// Rebuild a batch read back from storage.
    pub fn restore(
        id: BatchId,
        key: StockKey,
        batch_number: BatchNumber,
        quantity: Quantity,
        exp_date: NaiveDate,
        date_added: DateTime<Utc>,
    ) -> DomainResult<Self> {
        batch_number.ensure_matches(key.veg_type)?;
        Ok(Self {
            id,
            veg_type: key.veg_type,
            quality_grade: key.quality_grade,
            batch_number,
            quantity,
            exp_date,
            date_added,
        })
    }

    /// The id by value (`BatchId` is `Copy`).
    pub fn batch_id(&self) -> BatchId {
        self.id
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.veg_type, self.quality_grade)
    }

    pub fn veg_type(&self) -> VegType {
        self.veg_type
    }

    pub fn quality_grade(&self) -> QualityGrade {
        self.quality_grade
    }

    pub fn batch_number(&self) -> &BatchNumber {
        &self.batch_number
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn exp_date(&self) -> NaiveDate {
        self.exp_date
    }

    pub fn date_added(&self) -> DateTime<Utc> {
        self.date_added
    }

    /// Return the batch as it would look after `patch`, without touching `self`.
    pub fn patched(&self, patch: &BatchPatch) -> DomainResult<StockBatch> {
        if patch.is_empty() {
            return Err(DomainError::validation("update must change at least one field"));
        }

        let next = StockBatch {
            id: self.id,
            veg_type: patch.veg_type.unwrap_or(self.veg_type),
            quality_grade: patch.quality_grade.unwrap_or(self.quality_grade),
            batch_number: patch
                .batch_number
                .clone()
                .unwrap_or_else(|| self.batch_number.clone()),
            quantity: patch.quantity.unwrap_or(self.quantity),
            exp_date: patch.exp_date.unwrap_or(self.exp_date),
            date_added: self.date_added,
        };

        next.batch_number.ensure_matches(next.veg_type)?;
        Ok(next)
    }

    /// Apply a depletion draw.
    pub(crate) fn set_quantity(&mut self, quantity: Quantity) {
        self.quantity = quantity;
    }
}

/// A validated intake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    veg_type: VegType,
    quality_grade: QualityGrade,
    batch_number: BatchNumber,
    quantity: Quantity,
    exp_date: NaiveDate,
}

impl NewBatch {
    pub fn new(
        veg_type: VegType,
        quality_grade: QualityGrade,
        batch_number: BatchNumber,
        quantity: Quantity,
        exp_date: NaiveDate,
    ) -> DomainResult<Self> {
        batch_number.ensure_matches(veg_type)?;
        if quantity.is_zero() {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        Ok(Self {
            veg_type,
            quality_grade,
            batch_number,
            quantity,
            exp_date,
        })
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.veg_type, self.quality_grade)
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }
}

/// Partial edit of a batch. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPatch {
    pub veg_type: Option<VegType>,
    pub quality_grade: Option<QualityGrade>,
    pub batch_number: Option<BatchNumber>,
    pub quantity: Option<Quantity>,
    pub exp_date: Option<NaiveDate>,
}

impl BatchPatch {
    pub fn is_empty(&self) -> bool {
        self.veg_type.is_none()
            && self.quality_grade.is_none()
            && self.batch_number.is_none()
            && self.quantity.is_none()
            && self.exp_date.is_none()
    }
}

/// Parse an expiry date given as `YYYY-MM-DD` or as an RFC 3339 timestamp.
pub fn parse_exp_date(raw: &str) -> DomainResult<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc).date_naive())
        .map_err(|_| DomainError::validation(format!("expDate must be YYYY-MM-DD or RFC 3339 (got '{raw}')")))
}
