//! In-memory store for tests and embedding
//!
//! Tables live in a `HashMap` behind an `Arc<RwLock>`, so clones share state.
//! Every trait call is counted, which lets tests assert that an operation did
//! not reach the store.

use super::{
    check_batch_size, string_attr, BatchGetOutput, BatchWriteOutput, IndexQuery, Item, Key,
    KeyValueStore, QueryOutput, StoreError, StoreLimits, TableSchema, WriteRequest,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

struct MemoryTable {
    schema: TableSchema,
    /// Items keyed by primary key value
    items: BTreeMap<String, Item>,
}

impl MemoryTable {
    fn key_of(&self, item: &Item) -> Result<String, StoreError> {
        string_attr(item, &self.schema.key_attribute)
            .map(str::to_string)
            .ok_or_else(|| {
                StoreError::invalid_key(format!(
                    "item is missing string attribute {}",
                    self.schema.key_attribute
                ))
            })
    }

    fn check_key(&self, key: &Key) -> Result<(), StoreError> {
        if key.attribute != self.schema.key_attribute || key.value.is_empty() {
            return Err(StoreError::invalid_key(format!(
                "expected non-empty {} key, got {} = {:?}",
                self.schema.key_attribute, key.attribute, key.value
            )));
        }
        Ok(())
    }

    /// Primary key value a write request targets
    fn request_key(&self, request: &WriteRequest) -> Result<String, StoreError> {
        match request {
            WriteRequest::Put(item) => self.key_of(item),
            WriteRequest::Delete(key) => {
                self.check_key(key)?;
                Ok(key.value.clone())
            }
        }
    }

    /// Validate every request, then apply them all. Nothing is written if
    /// any request is invalid or two requests share a key.
    fn apply_all(&mut self, requests: Vec<WriteRequest>) -> Result<(), StoreError> {
        let mut seen = HashSet::with_capacity(requests.len());
        let mut keyed = Vec::with_capacity(requests.len());
        for request in requests {
            let key = self.request_key(&request)?;
            if !seen.insert(key.clone()) {
                return Err(StoreError::invalid_key(format!(
                    "duplicate key {} in one batch",
                    key
                )));
            }
            keyed.push((key, request));
        }

        for (key, request) in keyed {
            match request {
                WriteRequest::Put(item) => {
                    self.items.insert(key, item);
                }
                WriteRequest::Delete(_) => {
                    self.items.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// In-memory [`KeyValueStore`]
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
    limits: StoreLimits,
    /// Maximum items returned by one query page
    page_size: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            limits: StoreLimits::default(),
            page_size: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("limits", &self.limits)
            .field("page_size", &self.page_size)
            .field("calls", &self.call_count())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: StoreLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Truncate query results to `page_size` items
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Number of trait calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of items currently held in a table
    pub async fn item_count(&self, table: &str) -> Option<usize> {
        self.tables.read().await.get(table).map(|t| t.items.len())
    }

    fn record_call(&self, op: &str, table: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(op, table, "memory store call");
    }
}

fn missing(table: &str) -> StoreError {
    StoreError::TableNotFound(table.to_string())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn create_table(&self, schema: &TableSchema) -> Result<(), StoreError> {
        self.record_call("create_table", &schema.name);
        let mut tables = self.tables.write().await;
        if tables.contains_key(&schema.name) {
            return Err(StoreError::TableExists(schema.name.clone()));
        }
        tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema: schema.clone(),
                items: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        self.record_call("delete_table", table);
        self.tables
            .write()
            .await
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| missing(table))
    }

    async fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        self.record_call("get_item", table);
        let tables = self.tables.read().await;
        let t = tables.get(table).ok_or_else(|| missing(table))?;
        t.check_key(key)?;
        Ok(t.items.get(&key.value).cloned())
    }

    async fn batch_get_items(
        &self,
        table: &str,
        keys: &[Key],
    ) -> Result<BatchGetOutput, StoreError> {
        self.record_call("batch_get_items", table);
        check_batch_size(keys.len(), self.limits.max_batch_get)?;

        let tables = self.tables.read().await;
        let t = tables.get(table).ok_or_else(|| missing(table))?;

        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            t.check_key(key)?;
            if let Some(item) = t.items.get(&key.value) {
                items.push(item.clone());
            }
        }

        Ok(BatchGetOutput {
            items,
            unprocessed_keys: Vec::new(),
        })
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError> {
        self.record_call("put_item", table);
        let mut tables = self.tables.write().await;
        let t = tables.get_mut(table).ok_or_else(|| missing(table))?;
        t.apply_all(vec![WriteRequest::Put(item)])
    }

    async fn batch_write_items(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<BatchWriteOutput, StoreError> {
        self.record_call("batch_write_items", table);
        check_batch_size(requests.len(), self.limits.max_batch_write)?;

        let mut tables = self.tables.write().await;
        let t = tables.get_mut(table).ok_or_else(|| missing(table))?;
        t.apply_all(requests)?;

        Ok(BatchWriteOutput::default())
    }

    async fn delete_item(&self, table: &str, key: &Key) -> Result<(), StoreError> {
        self.record_call("delete_item", table);
        let mut tables = self.tables.write().await;
        let t = tables.get_mut(table).ok_or_else(|| missing(table))?;
        t.apply_all(vec![WriteRequest::Delete(key.clone())])
    }

    async fn query_index(
        &self,
        table: &str,
        query: &IndexQuery,
    ) -> Result<QueryOutput, StoreError> {
        self.record_call("query_index", table);
        let tables = self.tables.read().await;
        let t = tables.get(table).ok_or_else(|| missing(table))?;

        let index = t
            .schema
            .index
            .as_ref()
            .filter(|i| i.name == query.index_name && i.partition_key == query.attribute)
            .ok_or_else(|| StoreError::IndexNotFound {
                table: table.to_string(),
                index: query.index_name.clone(),
            })?;

        let mut items: Vec<Item> = t
            .items
            .values()
            .filter(|item| string_attr(item, &index.partition_key) == Some(query.value.as_str()))
            .cloned()
            .collect();

        if let Some(sort_key) = &index.sort_key {
            items.sort_by(|a, b| string_attr(a, sort_key).cmp(&string_attr(b, sort_key)));
        }

        let has_more = match self.page_size {
            Some(size) if items.len() > size => {
                items.truncate(size);
                true
            }
            _ => false,
        };

        Ok(QueryOutput { items, has_more })
    }

    fn limits(&self) -> StoreLimits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{IndexSchema, Throughput};
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema {
            name: "items".to_string(),
            key_attribute: "ID".to_string(),
            index: Some(IndexSchema {
                name: "ParentID-index".to_string(),
                partition_key: "ParentID".to_string(),
                sort_key: Some("ID".to_string()),
            }),
            throughput: Throughput::default(),
        }
    }

    fn item(id: &str, parent: &str) -> Item {
        match json!({ "ID": id, "ParentID": parent }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn query(value: &str) -> IndexQuery {
        IndexQuery {
            index_name: "ParentID-index".to_string(),
            attribute: "ParentID".to_string(),
            placeholder: ":pid".to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_table_lifecycle() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();
        assert!(matches!(
            store.create_table(&schema()).await,
            Err(StoreError::TableExists(_))
        ));

        store.delete_table("items").await.unwrap();
        assert!(matches!(
            store.get_item("items", &Key::new("ID", "a")).await,
            Err(StoreError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();

        store.put_item("items", item("a", "a")).await.unwrap();
        store.put_item("items", item("a", "b")).await.unwrap();

        let got = store.get_item("items", &Key::new("ID", "a")).await.unwrap().unwrap();
        assert_eq!(got.get("ParentID"), Some(&json!("b")));
        assert_eq!(store.item_count("items").await, Some(1));
    }

    #[tokio::test]
    async fn test_put_without_key_rejected() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();

        let mut bad = item("a", "a");
        bad.remove("ID");
        assert!(matches!(
            store.put_item("items", bad).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_limit_enforced() {
        let store = MemoryStore::new().with_limits(StoreLimits {
            max_batch_write: 2,
            max_batch_get: 2,
        });
        store.create_table(&schema()).await.unwrap();

        let requests = (0..3)
            .map(|i| WriteRequest::Put(item(&format!("n{}", i), "p")))
            .collect();
        let err = store.batch_write_items("items", requests).await.unwrap_err();
        assert!(matches!(err, StoreError::TooManyItems { count: 3, limit: 2 }));
        assert_eq!(store.item_count("items").await, Some(0));
    }

    #[tokio::test]
    async fn test_batch_with_duplicate_keys_rejected() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();

        let requests = vec![
            WriteRequest::Put(item("a", "p")),
            WriteRequest::Put(item("b", "p")),
            WriteRequest::Delete(Key::new("ID", "a")),
        ];
        let err = store.batch_write_items("items", requests).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
        assert_eq!(store.item_count("items").await, Some(0));
    }

    #[tokio::test]
    async fn test_invalid_batch_writes_nothing() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();

        let mut bad = item("c", "p");
        bad.remove("ID");
        let requests = vec![
            WriteRequest::Put(item("a", "p")),
            WriteRequest::Put(item("b", "p")),
            WriteRequest::Put(bad),
        ];
        let err = store.batch_write_items("items", requests).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
        assert_eq!(store.item_count("items").await, Some(0));
    }

    #[tokio::test]
    async fn test_query_sorted_and_paged() {
        let store = MemoryStore::new().with_page_size(2);
        store.create_table(&schema()).await.unwrap();

        let requests = vec![
            WriteRequest::Put(item("c", "p")),
            WriteRequest::Put(item("a", "p")),
            WriteRequest::Put(item("b", "p")),
            WriteRequest::Put(item("x", "other")),
        ];
        store.batch_write_items("items", requests).await.unwrap();

        let page = store.query_index("items", &query("p")).await.unwrap();
        let ids: Vec<_> = page.items.iter().map(|i| string_attr(i, "ID").unwrap()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn test_query_unknown_index() {
        let store = MemoryStore::new();
        store.create_table(&schema()).await.unwrap();

        let mut q = query("p");
        q.index_name = "nope".to_string();
        assert!(matches!(
            store.query_index("items", &q).await,
            Err(StoreError::IndexNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_call_count() {
        let store = MemoryStore::new();
        assert_eq!(store.call_count(), 0);
        store.create_table(&schema()).await.unwrap();
        let _ = store.get_item("items", &Key::new("ID", "a")).await;
        assert_eq!(store.call_count(), 2);
    }
}
