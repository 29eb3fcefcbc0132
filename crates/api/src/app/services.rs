use std::sync::Arc;

use anyhow::Context;

use agristock_infra::{InMemoryStockStore, LedgerConfig, PostgresStockStore, StockLedger, StockStore};

use crate::config::AppConfig;

/// Ledger over a type-erased store, so handlers don't care which backend runs.
pub type SharedLedger = StockLedger<Arc<dyn StockStore>>;

pub struct AppServices {
    pub ledger: SharedLedger,
}

impl AppServices {
    pub fn new(store: Arc<dyn StockStore>, config: LedgerConfig) -> Self {
        Self {
            ledger: StockLedger::new(store, config),
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(Arc::new(InMemoryStockStore::new()), config)
    }
}

/// Pick the store from the config: Postgres when `DATABASE_URL` is set.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let Some(database_url) = config.database_url.as_deref() else {
        return Ok(AppServices::in_memory(config.ledger));
    };

    let store = PostgresStockStore::connect(database_url, config.database_max_connections)
        .await
        .context("failed to connect to Postgres")?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "using the Postgres stock store"
    );

    Ok(AppServices::new(Arc::new(store), config.ledger))
}
