//! Produce quantities.
//!
//! Quantities are held as whole grams so that totals are exact sums. The wire
//! representation is a plain JSON number of kilograms.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use agristock_core::{DomainError, DomainResult, ValueObject};

/// Non-negative amount of produce, in grams.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i64);

impl ValueObject for Quantity {}

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    const GRAMS_PER_KG: f64 = 1000.0;

    pub fn from_grams(grams: i64) -> DomainResult<Self> {
        if grams < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        Ok(Self(grams))
    }

    /// Parse a kilogram amount, rounding to the nearest gram.
    pub fn from_kg(kg: f64) -> DomainResult<Self> {
        if !kg.is_finite() {
            return Err(DomainError::validation("quantity must be a finite number"));
        }
        if kg < 0.0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        let grams = (kg * Self::GRAMS_PER_KG).round();
        if grams >= i64::MAX as f64 {
            return Err(DomainError::validation("quantity is too large"));
        }
        Ok(Self(grams as i64))
    }

    pub fn grams(self) -> i64 {
        self.0
    }

    pub fn kg(self) -> f64 {
        self.0 as f64 / Self::GRAMS_PER_KG
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    /// Subtraction that refuses to go below zero.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.0
            .checked_sub(other.0)
            .filter(|grams| *grams >= 0)
            .map(Quantity)
    }

    /// Sum quantities, failing on overflow.
    pub fn sum<I>(quantities: I) -> DomainResult<Quantity>
    where
        I: IntoIterator<Item = Quantity>,
    {
        quantities
            .into_iter()
            .try_fold(Quantity::ZERO, |acc, q| acc.checked_add(q))
            .ok_or_else(|| DomainError::invariant("quantity total overflowed"))
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} kg", self.kg())
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.kg())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kg = f64::deserialize(deserializer)?;
        Quantity::from_kg(kg).map_err(serde::de::Error::custom)
    }
}
