//! Process configuration, read once from the environment at startup.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::info;

use agristock_infra::LedgerConfig;
use agristock_stock::DepletionOrder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Postgres URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub ledger: LedgerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            database_max_connections: 10,
            ledger: LedgerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = try_load(&lookup, "BIND_ADDR", "0.0.0.0:8080")?;
        let database_max_connections: u32 = try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "10")?;
        if database_max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        let timeout_ms: u64 = try_load(&lookup, "STOCK_OP_TIMEOUT_MS", "5000")?;
        if timeout_ms == 0 {
            bail!("STOCK_OP_TIMEOUT_MS must be at least 1");
        }
        let depletion_order: DepletionOrder = try_load(&lookup, "STOCK_DEPLETION_ORDER", "fifo")?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if database_url.is_none() {
            info!("DATABASE_URL not set, using the in-memory stock store");
        }

        Ok(Self {
            bind_addr,
            database_url,
            database_max_connections,
            ledger: LedgerConfig {
                op_timeout: Duration::from_millis(timeout_ms),
                depletion_order,
            },
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.trim()
        .parse()
        .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value '{raw}'"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(load(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/stock"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("STOCK_OP_TIMEOUT_MS", "250"),
            ("STOCK_DEPLETION_ORDER", "Expiry"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/stock"));
        assert_eq!(config.database_max_connections, 4);
        assert_eq!(config.ledger.op_timeout, Duration::from_millis(250));
        assert_eq!(config.ledger.depletion_order, DepletionOrder::Expiry);
    }

    #[test]
    fn blank_database_url_means_memory() {
        assert_eq!(load(&[("DATABASE_URL", "  ")]).unwrap().database_url, None);
    }

    #[test]
    fn bad_values_are_startup_errors() {
        assert!(load(&[("BIND_ADDR", "not-an-addr")]).is_err());
        assert!(load(&[("STOCK_OP_TIMEOUT_MS", "0")]).is_err());
        assert!(load(&[("STOCK_DEPLETION_ORDER", "lifo")]).is_err());
        assert!(load(&[("DATABASE_MAX_CONNECTIONS", "-1")]).is_err());
    }
}
