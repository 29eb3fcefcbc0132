//! Stock movement journal.
//!
//! Every committed change to a batch quantity is recorded as a signed delta on
//! its `(vegType, grade)` pair, so the journal sums to the pair's total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use agristock_core::{BatchId, MovementId};

use crate::batch::StockBatch;
use crate::depletion::Draw;
use crate::types::{QualityGrade, StockKey, VegType};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// New batch received.
    Intake,
    /// Direct edit of a batch (quantity change, re-grade, re-type).
    Adjustment,
    /// Batch deleted.
    Removal,
    /// Drawn by a depletion.
    Depletion,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Intake => "intake",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Removal => "removal",
            MovementKind::Depletion => "depletion",
        }
    }
}

impl core::str::FromStr for MovementKind {
    type Err = agristock_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intake" => Ok(MovementKind::Intake),
            "adjustment" => Ok(MovementKind::Adjustment),
            "removal" => Ok(MovementKind::Removal),
            "depletion" => Ok(MovementKind::Depletion),
            other => Err(agristock_core::DomainError::validation(format!(
                "unknown movement kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: MovementId,
    pub batch_id: BatchId,
    pub veg_type: VegType,
    pub quality_grade: QualityGrade,
    pub kind: MovementKind,
    /// Signed change in grams; serialized in kilograms.
    #[serde(rename = "delta", serialize_with = "grams_as_kg")]
    pub delta_grams: i64,
    pub occurred_at: DateTime<Utc>,
}

fn grams_as_kg<S: Serializer>(grams: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(*grams as f64 / 1000.0)
}

impl StockMovement {
    fn new(
        batch_id: BatchId,
        key: StockKey,
        kind: MovementKind,
        delta_grams: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            batch_id,
            veg_type: key.veg_type,
            quality_grade: key.quality_grade,
            kind,
            delta_grams,
            occurred_at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.veg_type, self.quality_grade)
    }

    pub fn intake(batch: &StockBatch) -> Self {
        Self::new(
            batch.batch_id(),
            batch.key(),
            MovementKind::Intake,
            batch.quantity().grams(),
            batch.date_added(),
        )
    }

    /// Movements describing an edit. A change of pair moves the whole quantity
    /// off the old pair and onto the new one; unchanged quantities record nothing.
    pub fn adjustment(before: &StockBatch, after: &StockBatch, at: DateTime<Utc>) -> Vec<Self> {
        let id = before.batch_id();
        let (old, new) = (before.quantity().grams(), after.quantity().grams());

        let deltas = if before.key() == after.key() {
            vec![(after.key(), new - old)]
        } else {
            vec![(before.key(), -old), (after.key(), new)]
        };

        deltas
            .into_iter()
            .filter(|(_, delta)| *delta != 0)
            .map(|(key, delta)| Self::new(id, key, MovementKind::Adjustment, delta, at))
            .collect()
    }

    /// Movement for deleting `batch`; `None` when it was already empty, as the
    /// journal only records changes of quantity.
    pub fn removal(batch: &StockBatch, at: DateTime<Utc>) -> Option<Self> {
        (!batch.quantity().is_zero()).then(|| {
            Self::new(
                batch.batch_id(),
                batch.key(),
                MovementKind::Removal,
                -batch.quantity().grams(),
                at,
            )
        })
    }

    pub fn depletion(key: StockKey, draw: &Draw, at: DateTime<Utc>) -> Self {
        Self::new(draw.batch_id, key, MovementKind::Depletion, -draw.taken.grams(), at)
    }
}
