//! Configuration for the node client and its store backend
//!
//! Values come from `Default` or from `ARBOR_*` environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `ARBOR_BACKEND` | `sqlite` (`memory`, `dynamodb`) |
//! | `ARBOR_DB_PATH` | `arbor.db` |
//! | `ARBOR_TABLE` | `nodes` |
//! | `ARBOR_INDEX` | `ParentID-index` |
//! | `ARBOR_READ_UNITS` / `ARBOR_WRITE_UNITS` | `5` |
//! | `ARBOR_DYNAMODB_REGION` / `ARBOR_DYNAMODB_ENDPOINT` | unset |

use crate::store::{KeyValueStore, MemoryStore, SqliteStore, StoreError, Throughput};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_TABLE_NAME: &str = "nodes";
pub const DEFAULT_INDEX_NAME: &str = "ParentID-index";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("backend {0} is not compiled in")]
    Unsupported(String),

    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
}

/// Table layout used by [`crate::client::NodeClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Primary table name
    pub table_name: String,
    /// Secondary index keyed on `ParentID`
    pub index_name: String,
    /// Capacity requested by `create_table`
    pub throughput: Throughput,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            throughput: Throughput::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sqlite,
    DynamoDb,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "sqlite" => Ok(Backend::Sqlite),
            "dynamodb" => Ok(Backend::DynamoDb),
            _ => Err(ConfigError::Invalid {
                var: "ARBOR_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Backend selection plus client layout
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Path to SQLite database
    pub db_path: PathBuf,
    /// DynamoDB region override
    pub region: Option<String>,
    /// DynamoDB endpoint override (e.g. DynamoDB Local)
    pub endpoint: Option<String>,
    pub client: ClientConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            db_path: PathBuf::from("arbor.db"),
            region: None,
            endpoint: None,
            client: ClientConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Read `ARBOR_*` variables from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(backend) = lookup("ARBOR_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(path) = lookup("ARBOR_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(table) = lookup("ARBOR_TABLE") {
            config.client.table_name = table;
        }
        if let Some(index) = lookup("ARBOR_INDEX") {
            config.client.index_name = index;
        }
        if let Some(units) = lookup("ARBOR_READ_UNITS") {
            config.client.throughput.read_units = parse_units("ARBOR_READ_UNITS", units)?;
        }
        if let Some(units) = lookup("ARBOR_WRITE_UNITS") {
            config.client.throughput.write_units = parse_units("ARBOR_WRITE_UNITS", units)?;
        }
        config.region = lookup("ARBOR_DYNAMODB_REGION");
        config.endpoint = lookup("ARBOR_DYNAMODB_ENDPOINT");

        Ok(config)
    }

    /// Open the configured backend
    pub async fn open(&self) -> Result<Arc<dyn KeyValueStore>, ConfigError> {
        match self.backend {
            Backend::Memory => Ok(Arc::new(MemoryStore::new())),
            Backend::Sqlite => Ok(Arc::new(SqliteStore::new(&self.db_path).await?)),
            #[cfg(feature = "dynamodb")]
            Backend::DynamoDb => {
                let config = crate::store::dynamodb::DynamoDbConfig {
                    region: self.region.clone(),
                    endpoint: self.endpoint.clone(),
                };
                Ok(Arc::new(crate::store::DynamoDbStore::from_env(config).await))
            }
            #[cfg(not(feature = "dynamodb"))]
            Backend::DynamoDb => Err(ConfigError::Unsupported("dynamodb".to_string())),
        }
    }
}

fn parse_units(var: &'static str, value: String) -> Result<i64, ConfigError> {
    match value.parse::<i64>() {
        Ok(units) if units > 0 => Ok(units),
        _ => Err(ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.client, ClientConfig::default());
        assert_eq!(config.client.throughput.read_units, 5);
        assert_eq!(config.client.throughput.write_units, 5);
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("ARBOR_BACKEND", "Memory"),
            ("ARBOR_TABLE", "tree"),
            ("ARBOR_INDEX", "by-parent"),
            ("ARBOR_WRITE_UNITS", "10"),
            ("ARBOR_DYNAMODB_ENDPOINT", "http://localhost:8000"),
        ]))
        .unwrap();

        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.client.table_name, "tree");
        assert_eq!(config.client.index_name, "by-parent");
        assert_eq!(config.client.throughput.read_units, 5);
        assert_eq!(config.client.throughput.write_units, 10);
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("ARBOR_BACKEND", "postgres")])),
            Err(ConfigError::Invalid { var: "ARBOR_BACKEND", .. })
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[("ARBOR_READ_UNITS", "0")])),
            Err(ConfigError::Invalid { var: "ARBOR_READ_UNITS", .. })
        ));
    }
}
