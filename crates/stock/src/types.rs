use core::str::FromStr;

use serde::{Deserialize, Serialize};

use agristock_core::{DomainError, DomainResult, ValueObject};

/// Vegetable types tracked by the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum VegType {
    Carrot,
    Leeks,
    Cabbage,
    Potato,
}

impl VegType {
    pub const ALL: [VegType; 4] = [VegType::Carrot, VegType::Leeks, VegType::Cabbage, VegType::Potato];

    pub fn as_str(self) -> &'static str {
        match self {
            VegType::Carrot => "Carrot",
            VegType::Leeks => "Leeks",
            VegType::Cabbage => "Cabbage",
            VegType::Potato => "Potato",
        }
    }

    /// Three-letter code every batch number of this type starts with.
    pub fn batch_prefix(self) -> &'static str {
        match self {
            VegType::Carrot => "CRT",
            VegType::Leeks => "LKS",
            VegType::Cabbage => "CBG",
            VegType::Potato => "PTO",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl core::fmt::Display for VegType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for VegType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for VegType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VegType::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "vegType must be one of Carrot, Leeks, Cabbage, Potato (got '{s}')"
                ))
            })
    }
}

/// Quality grade assigned during QA.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum QualityGrade {
    A,
    B,
    C,
}

impl QualityGrade {
    pub const ALL: [QualityGrade; 3] = [QualityGrade::A, QualityGrade::B, QualityGrade::C];

    pub fn as_str(self) -> &'static str {
        match self {
            QualityGrade::A => "A",
            QualityGrade::B => "B",
            QualityGrade::C => "C",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl core::fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for QualityGrade {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for QualityGrade {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QualityGrade::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("qualityGrade must be one of A, B, C (got '{s}')")))
    }
}

/// The `(vegType, qualityGrade)` pair totals are kept for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockKey {
    pub veg_type: VegType,
    pub quality_grade: QualityGrade,
}

impl StockKey {
    pub fn new(veg_type: VegType, quality_grade: QualityGrade) -> Self {
        Self { veg_type, quality_grade }
    }

    /// Every pair, in a fixed order (type first, then grade).
    pub fn all() -> impl Iterator<Item = StockKey> {
        VegType::ALL
            .into_iter()
            .flat_map(|v| QualityGrade::ALL.into_iter().map(move |g| StockKey::new(v, g)))
    }
}

impl ValueObject for StockKey {}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.veg_type, self.quality_grade)
    }
}

/// Batch number: three uppercase letters followed by four digits, e.g. `CRT0042`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchNumber(String);

impl ValueObject for BatchNumber {}

impl BatchNumber {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let bytes = raw.as_bytes();
        let well_formed = bytes.len() == 7
            && bytes[..3].iter().all(u8::is_ascii_uppercase)
            && bytes[3..].iter().all(u8::is_ascii_digit);

        if !well_formed {
            return Err(DomainError::validation(format!(
                "batchNumber must be 3 uppercase letters followed by 4 digits (got '{raw}')"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> &str {
        &self.0[..3]
    }

    /// Reject numbers whose prefix belongs to a different vegetable type.
    pub fn ensure_matches(&self, veg_type: VegType) -> DomainResult<()> {
        if self.prefix() != veg_type.batch_prefix() {
            return Err(DomainError::validation(format!(
                "batchNumber '{}' does not match {}: expected prefix {}",
                self.0,
                veg_type,
                veg_type.batch_prefix()
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for BatchNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BatchNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BatchNumber::parse(&value)
    }
}

impl From<BatchNumber> for String {
    fn from(value: BatchNumber) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_input_follows_the_same_case_rules_as_parsing() {
        let key: StockKey =
            serde_json::from_value(serde_json::json!({ "vegType": "leeks", "qualityGrade": "b" })).unwrap();
        assert_eq!(key, StockKey::new(VegType::Leeks, QualityGrade::B));
        assert!(serde_json::from_value::<VegType>(serde_json::json!("Onion")).is_err());

        // Output keeps the canonical spelling.
        assert_eq!(serde_json::to_value(VegType::Leeks).unwrap(), serde_json::json!("Leeks"));
    }

    #[test]
    fn veg_type_and_grade_parse_case_insensitively() {
        assert_eq!("carrot".parse::<VegType>().unwrap(), VegType::Carrot);
        assert_eq!("LEEKS".parse::<VegType>().unwrap(), VegType::Leeks);
        assert_eq!("b".parse::<QualityGrade>().unwrap(), QualityGrade::B);
        assert!(matches!("Onion".parse::<VegType>(), Err(DomainError::Validation(_))));
        assert!(matches!("D".parse::<QualityGrade>(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn batch_number_format_is_enforced() {
        assert!(BatchNumber::parse("CRT0001").is_ok());
        for bad in ["CRT001", "crt0001", "CRT00012", "CR10001", "CRTABCD", "", " CRT0001"] {
            assert!(
                matches!(BatchNumber::parse(bad), Err(DomainError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn batch_number_prefix_must_match_veg_type() {
        let carrot = BatchNumber::parse("CRT1234").unwrap();
        assert!(carrot.ensure_matches(VegType::Carrot).is_ok());
        assert!(carrot.ensure_matches(VegType::Potato).is_err());

        let foreign = BatchNumber::parse("XYZ1234").unwrap();
        assert!(matches!(
            foreign.ensure_matches(VegType::Carrot),
            Err(DomainError::Validation(msg)) if msg.contains("CRT")
        ));
    }

    #[test]
    fn prefixes_cover_every_type() {
        let prefixes: Vec<_> = VegType::ALL.iter().map(|v| v.batch_prefix()).collect();
        assert_eq!(prefixes, vec!["CRT", "LKS", "CBG", "PTO"]);
    }

    #[test]
    fn all_keys_enumerates_twelve_pairs() {
        let keys: Vec<_> = StockKey::all().collect();
        assert_eq!(keys.len(), 12);
        assert_eq!(keys[0], StockKey::new(VegType::Carrot, QualityGrade::A));
        assert_eq!(keys[11], StockKey::new(VegType::Potato, QualityGrade::C));
    }
}
