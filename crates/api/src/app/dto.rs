use serde::{Deserialize, Serialize};

use agristock_core::DomainResult;
use agristock_stock::{
    BatchNumber, BatchPatch, Draw, NewBatch, QualityGrade, Quantity, StockBatch, StockKey, StockMovement,
    StockTotals, VegType, parse_exp_date,
};

// -------------------------
// Request DTOs
// -------------------------
//
// Fields arrive as loose strings/numbers and are validated into domain types
// here, so every shape error becomes a `validation_error`.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStockRequest {
    pub veg_type: String,
    pub quality_grade: String,
    pub batch_number: String,
    /// Kilograms.
    pub quantity: f64,
    pub exp_date: String,
}

impl AddStockRequest {
    pub fn into_new_batch(self) -> DomainResult<NewBatch> {
        NewBatch::new(
            self.veg_type.parse()?,
            self.quality_grade.parse()?,
            BatchNumber::parse(&self.batch_number)?,
            Quantity::from_kg(self.quantity)?,
            parse_exp_date(&self.exp_date)?,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStockRequest {
    pub veg_type: Option<String>,
    pub quality_grade: Option<String>,
    pub batch_number: Option<String>,
    pub quantity: Option<f64>,
    pub exp_date: Option<String>,
}

impl UpdateStockRequest {
    pub fn into_patch(self) -> DomainResult<BatchPatch> {
        Ok(BatchPatch {
            veg_type: self.veg_type.as_deref().map(str::parse::<VegType>).transpose()?,
            quality_grade: self
                .quality_grade
                .as_deref()
                .map(str::parse::<QualityGrade>)
                .transpose()?,
            batch_number: self.batch_number.as_deref().map(BatchNumber::parse).transpose()?,
            quantity: self.quantity.map(Quantity::from_kg).transpose()?,
            exp_date: self.exp_date.as_deref().map(parse_exp_date).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveStockRequest {
    pub veg_type: String,
    pub quality_grade: String,
    /// Kilograms.
    pub amount: f64,
}

impl RemoveStockRequest {
    pub fn into_parts(self) -> DomainResult<(StockKey, Quantity)> {
        let key = StockKey::new(self.veg_type.parse()?, self.quality_grade.parse()?);
        Ok((key, Quantity::from_kg(self.amount)?))
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct StockAddedResponse {
    pub status: &'static str,
    pub stock: StockBatch,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllStocksResponse {
    pub stocks: Vec<StockBatch>,
    pub total_quantities: StockTotals,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StockRemovedResponse {
    pub status: &'static str,
    pub draws: Vec<Draw>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairTotalResponse {
    pub veg_type: VegType,
    pub quality_grade: QualityGrade,
    /// Kilograms.
    pub total_quantity: Quantity,
}

#[derive(Debug, Serialize)]
pub struct MovementsResponse {
    pub movements: Vec<StockMovement>,
}
