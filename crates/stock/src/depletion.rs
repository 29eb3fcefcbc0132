//! Multi-batch depletion planning.
//!
//! Removing an amount of a `(vegType, grade)` pair draws it from one or more
//! batches. Planning is pure: it decides which batches give how much, and fails
//! before anything is written when the pair cannot cover the amount. Stores
//! apply a plan as one atomic unit.

use core::cmp::Ordering;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use agristock_core::{BatchId, DomainError, DomainResult};

use crate::batch::StockBatch;
use crate::quantity::Quantity;
use crate::types::StockKey;

/// Order in which batches of a pair are drained.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepletionOrder {
    /// Oldest intake first (`dateAdded`, then batch id).
    #[default]
    Fifo,
    /// Soonest expiry first (`expDate`, then `dateAdded`, then batch id).
    Expiry,
}

impl DepletionOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            DepletionOrder::Fifo => "fifo",
            DepletionOrder::Expiry => "expiry",
        }
    }

    pub fn compare(self, a: &StockBatch, b: &StockBatch) -> Ordering {
        let fifo = a
            .date_added()
            .cmp(&b.date_added())
            .then_with(|| a.batch_id().cmp(&b.batch_id()));
        match self {
            DepletionOrder::Fifo => fifo,
            DepletionOrder::Expiry => a.exp_date().cmp(&b.exp_date()).then(fifo),
        }
    }
}

impl FromStr for DepletionOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(DepletionOrder::Fifo),
            "expiry" => Ok(DepletionOrder::Expiry),
            _ => Err(DomainError::validation(format!(
                "depletion order must be 'fifo' or 'expiry' (got '{s}')"
            ))),
        }
    }
}

/// Amount taken from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draw {
    pub batch_id: BatchId,
    pub taken: Quantity,
    /// Quantity left in the batch after the draw.
    pub remaining: Quantity,
}

/// A feasible depletion of one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Depletion {
    pub key: StockKey,
    pub requested: Quantity,
    pub draws: Vec<Draw>,
}

impl Depletion {
    pub fn total_taken(&self) -> DomainResult<Quantity> {
        Quantity::sum(self.draws.iter().map(|d| d.taken))
    }
}

/// Plan the removal of `amount` from the batches of `key`.
///
/// Batches of other pairs and empty batches are ignored. Fails with
/// `InsufficientStock` when the pair holds less than `amount`.
pub fn plan_depletion<'a, I>(
    batches: I,
    key: StockKey,
    amount: Quantity,
    order: DepletionOrder,
) -> DomainResult<Depletion>
where
    I: IntoIterator<Item = &'a StockBatch>,
{
    if amount.is_zero() {
        return Err(DomainError::validation("amount must be greater than zero"));
    }

    let mut candidates: Vec<&StockBatch> = batches
        .into_iter()
        .filter(|b| b.key() == key && !b.quantity().is_zero())
        .collect();

    let available = Quantity::sum(candidates.iter().map(|b| b.quantity()))?;
    if available < amount {
        return Err(DomainError::insufficient_stock(format!(
            "{key}: requested {amount}, available {available}"
        )));
    }

    candidates.sort_by(|a, b| order.compare(a, b));

    let mut outstanding = amount;
    let mut draws = Vec::new();
    for batch in candidates {
        if outstanding.is_zero() {
            break;
        }
        let taken = batch.quantity().min(outstanding);
        let remaining = batch
            .quantity()
            .checked_sub(taken)
            .ok_or_else(|| DomainError::invariant("draw exceeds batch quantity"))?;
        outstanding = outstanding
            .checked_sub(taken)
            .ok_or_else(|| DomainError::invariant("draw exceeds requested amount"))?;
        draws.push(Draw {
            batch_id: batch.batch_id(),
            taken,
            remaining,
        });
    }

    Ok(Depletion {
        key,
        requested: amount,
        draws,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::batch::NewBatch;
    use crate::types::{BatchNumber, QualityGrade, VegType};

    fn key() -> StockKey {
        StockKey::new(VegType::Carrot, QualityGrade::A)
    }

    fn kg(v: f64) -> Quantity {
        Quantity::from_kg(v).unwrap()
    }

    /// Carrot/A batch added `minutes` after a fixed origin.
    fn batch(kg_amount: f64, minutes: i64, exp_day: u32) -> StockBatch {
        let new = NewBatch::new(
            VegType::Carrot,
            QualityGrade::A,
            BatchNumber::parse("CRT0001").unwrap(),
            kg(kg_amount),
            NaiveDate::from_ymd_opt(2026, 11, exp_day).unwrap(),
        )
        .unwrap();
        let origin = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        StockBatch::create(BatchId::new(), new, origin + Duration::minutes(minutes))
    }

    #[test]
    fn drains_earliest_batch_first() {
        let first = batch(30.0, 0, 20);
        let second = batch(20.0, 5, 10);
        let batches = vec![second.clone(), first.clone()];

        let plan = plan_depletion(&batches, key(), kg(40.0), DepletionOrder::Fifo).unwrap();

        assert_eq!(
            plan.draws,
            vec![
                Draw {
                    batch_id: first.batch_id(),
                    taken: kg(30.0),
                    remaining: Quantity::ZERO,
                },
                Draw {
                    batch_id: second.batch_id(),
                    taken: kg(10.0),
                    remaining: kg(10.0),
                },
            ]
        );
        assert_eq!(plan.total_taken().unwrap(), kg(40.0));
    }

    #[test]
    fn expiry_order_drains_soonest_expiry_first() {
        let older = batch(30.0, 0, 20);
        let expiring = batch(20.0, 5, 10);
        let batches = vec![older.clone(), expiring.clone()];

        let plan = plan_depletion(&batches, key(), kg(25.0), DepletionOrder::Expiry).unwrap();

        assert_eq!(plan.draws[0].batch_id, expiring.batch_id());
        assert_eq!(plan.draws[0].taken, kg(20.0));
        assert_eq!(plan.draws[1].batch_id, older.batch_id());
        assert_eq!(plan.draws[1].remaining, kg(25.0));
    }

    #[test]
    fn insufficient_stock_is_reported_without_a_plan() {
        let batches = vec![batch(15.0, 0, 20), batch(10.0, 1, 20)];
        let err = plan_depletion(&batches, key(), kg(30.0), DepletionOrder::Fifo).unwrap_err();
        match err {
            DomainError::InsufficientStock(msg) => {
                assert!(msg.contains("Carrot/A"));
                assert!(msg.contains("available 25 kg"));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn other_pairs_and_empty_batches_are_ignored() {
        let empty = batch(5.0, 0, 20);
        let empty = empty
            .patched(&crate::BatchPatch {
                quantity: Some(Quantity::ZERO),
                ..Default::default()
            })
            .unwrap();
        let other_grade = batch(50.0, 1, 20)
            .patched(&crate::BatchPatch {
                quality_grade: Some(QualityGrade::B),
                ..Default::default()
            })
            .unwrap();
        let real = batch(8.0, 2, 20);

        let batches = vec![empty, other_grade, real.clone()];
        let plan = plan_depletion(&batches, key(), kg(8.0), DepletionOrder::Fifo).unwrap();
        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.draws[0].batch_id, real.batch_id());

        assert!(matches!(
            plan_depletion(&batches, key(), kg(9.0), DepletionOrder::Fifo),
            Err(DomainError::InsufficientStock(_))
        ));
    }

    #[test]
    fn zero_amount_is_a_validation_error() {
        let batches = vec![batch(1.0, 0, 20)];
        assert!(matches!(
            plan_depletion(&batches, key(), Quantity::ZERO, DepletionOrder::Fifo),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn order_parses_from_config_strings() {
        assert_eq!("FIFO".parse::<DepletionOrder>().unwrap(), DepletionOrder::Fifo);
        assert_eq!("expiry".parse::<DepletionOrder>().unwrap(), DepletionOrder::Expiry);
        assert!("lifo".parse::<DepletionOrder>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a successful plan takes exactly the requested amount, never
        /// more than a batch holds; a failed plan only happens when the pair
        /// is short.
        #[test]
        fn plans_take_exactly_the_requested_amount(
            grams in prop::collection::vec(0i64..50_000, 0..12),
            amount in 1i64..400_000,
        ) {
            let batches: Vec<StockBatch> = grams
                .iter()
                .enumerate()
                .filter(|(_, g)| **g > 0)
                .map(|(i, g)| batch(*g as f64 / 1000.0, i as i64, 20))
                .collect();
            let available: i64 = batches.iter().map(|b| b.quantity().grams()).sum();
            let amount = Quantity::from_grams(amount).unwrap();

            match plan_depletion(&batches, key(), amount, DepletionOrder::Fifo) {
                Ok(plan) => {
                    prop_assert!(available >= amount.grams());
                    prop_assert_eq!(plan.total_taken().unwrap(), amount);
                    for draw in &plan.draws {
                        let source = batches.iter().find(|b| b.batch_id() == draw.batch_id).unwrap();
                        prop_assert_eq!(
                            draw.taken.grams() + draw.remaining.grams(),
                            source.quantity().grams()
                        );
                    }
                }
                Err(DomainError::InsufficientStock(_)) => prop_assert!(available < amount.grams()),
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }
    }
}
