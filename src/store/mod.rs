//! Key-value store collaborator.
//!
//! A store holds named tables of flat [`Item`]s. Each table has a single
//! string primary key attribute and at most one secondary index, queried by a
//! single equality condition on its partition attribute.
//!
//! Backends:
//!
//! - [`MemoryStore`]: in-process tables, used in tests
//! - [`SqliteStore`]: one SQLite table per store table
//! - `DynamoDbStore` (`dynamodb` feature): Amazon DynamoDB

mod error;
mod memory;
mod sqlite;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbStore;

use async_trait::async_trait;
use serde_json::Value;

/// A flat record: attribute name to value
pub type Item = serde_json::Map<String, Value>;

/// Primary key of an item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub attribute: String,
    pub value: String,
}

impl Key {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// One entry of a batch write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(Key),
}

/// Provisioned capacity requested at table creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    pub read_units: i64,
    pub write_units: i64,
}

impl Default for Throughput {
    fn default() -> Self {
        Self {
            read_units: 5,
            write_units: 5,
        }
    }
}

/// Secondary index declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
}

/// Table declaration used by [`KeyValueStore::create_table`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub key_attribute: String,
    pub index: Option<IndexSchema>,
    pub throughput: Throughput,
}

/// Equality query against a secondary index.
///
/// The value is bound through `placeholder` by backends that build textual
/// key condition expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    pub index_name: String,
    pub attribute: String,
    pub placeholder: String,
    pub value: String,
}

impl IndexQuery {
    /// Key condition in expression form, e.g. `ParentID = :pid`
    pub fn key_condition(&self) -> String {
        format!("{} = {}", self.attribute, self.placeholder)
    }
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    /// The store holds more matches than it returned
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    /// Found items, in no particular order
    pub items: Vec<Item>,
    pub unprocessed_keys: Vec<Key>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutput {
    pub unprocessed: Vec<WriteRequest>,
}

/// Per-call item limits of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_batch_write: usize,
    pub max_batch_get: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_batch_write: 25,
            max_batch_get: 100,
        }
    }
}

/// Operations the node client needs from a store.
///
/// Failures are opaque to callers beyond success or failure.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), StoreError>;

    async fn delete_table(&self, table: &str) -> Result<(), StoreError>;

    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError>;

    async fn batch_get_items(&self, table: &str, keys: &[Key])
        -> Result<BatchGetOutput, StoreError>;

    /// Insert or overwrite one item
    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError>;

    async fn batch_write_items(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, StoreError>;

    async fn delete_item(&self, table: &str, key: &Key) -> Result<(), StoreError>;

    /// Return one page of items matching the query
    async fn query_index(&self, table: &str, query: &IndexQuery)
        -> Result<QueryOutput, StoreError>;

    fn limits(&self) -> StoreLimits {
        StoreLimits::default()
    }
}

/// Read a non-empty string attribute from an item
pub(crate) fn string_attr<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Check a batch against a backend limit
pub(crate) fn check_batch_size(count: usize, limit: usize) -> Result<(), StoreError> {
    if count > limit {
        return Err(StoreError::TooManyItems { count, limit });
    }
    Ok(())
}
