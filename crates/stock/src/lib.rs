//! Stock ledger domain module.
//!
//! This crate contains the business rules for produce stock: batch intake,
//! grading, per-type/per-grade totals and multi-batch depletion. Everything
//! here is deterministic domain logic (no IO, no HTTP, no storage).

pub mod batch;
pub mod book;
pub mod depletion;
pub mod movement;
pub mod quantity;
pub mod totals;
pub mod types;

pub use batch::{BatchPatch, NewBatch, StockBatch, parse_exp_date};
pub use book::StockBook;
pub use depletion::{Depletion, DepletionOrder, Draw, plan_depletion};
pub use movement::{MovementKind, StockMovement};
pub use quantity::Quantity;
pub use totals::StockTotals;
pub use types::{BatchNumber, QualityGrade, StockKey, VegType};
