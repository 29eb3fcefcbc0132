//! Infrastructure layer: stock storage backends and the ledger service.

pub mod error;
pub mod ledger;
pub mod stock_store;

pub use error::LedgerError;
pub use ledger::{LedgerConfig, StockLedger};
pub use stock_store::{InMemoryStockStore, PostgresStockStore, StockSnapshot, StockStore};
