//! Error types for store backends

use thiserror::Error;

/// Errors from store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("index {index} not found on table {table}")]
    IndexNotFound { table: String, index: String },

    /// More items in one batch request than the backend accepts
    #[error("too many items in one request: {count} (limit {limit})")]
    TooManyItems { count: usize, limit: usize },

    /// Item or key is missing its key attribute, or it is not a non-empty string
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    /// SQLite error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// DynamoDB SDK error
    #[cfg(feature = "dynamodb")]
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
}

impl StoreError {
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    #[cfg(feature = "dynamodb")]
    pub fn dynamodb(msg: impl Into<String>) -> Self {
        Self::DynamoDb(msg.into())
    }
}
