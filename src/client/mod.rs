//! Node persistence over a [`KeyValueStore`].
//!
//! Every node is written as one flat record (see [`marshal`]); children are
//! found again through the secondary index on `ParentID`.
//!
//! ```ignore
//! let store = Arc::new(SqliteStore::new("arbor.db").await?);
//! let client = NodeClient::new(store, ClientConfig::default());
//! client.create_table().await?;
//!
//! let mut root = Node::new();
//! root.create_child();
//! client.put_tree(&root).await?;
//!
//! let children = client.get_children(&root).await?;
//! ```

pub mod marshal;


pub use marshal::NodeRecord;

use crate::config::ClientConfig;
use crate::error::{NodeError, Result};
use crate::node::{Node, NodeId};
use crate::store::{
    IndexQuery, IndexSchema, Item, KeyValueStore, TableSchema, WriteRequest,
};
use marshal::{ATTR_ID, ATTR_PARENT_ID, PARENT_ID_PLACEHOLDER};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Reads and writes nodes as flat records.
///
/// Holds no state besides the store handle and table layout, so it can be
/// cloned and reused freely. Store calls are issued one at a time and never
/// retried.
#[derive(Clone)]
pub struct NodeClient {
    store: Arc<dyn KeyValueStore>,
    config: ClientConfig,
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("table_name", &self.config.table_name)
            .field("index_name", &self.config.index_name)
            .finish()
    }
}

impl NodeClient {
    pub fn new(store: Arc<dyn KeyValueStore>, config: ClientConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    /// Declaration used by [`NodeClient::create_table`]
    pub fn table_schema(&self) -> TableSchema {
        TableSchema {
            name: self.config.table_name.clone(),
            key_attribute: ATTR_ID.to_string(),
            index: Some(IndexSchema {
                name: self.config.index_name.clone(),
                partition_key: ATTR_PARENT_ID.to_string(),
                sort_key: Some(ATTR_ID.to_string()),
            }),
            throughput: self.config.throughput,
        }
    }

    // ========================================================================
    // Table lifecycle
    // ========================================================================

    pub async fn create_table(&self) -> Result<()> {
        self.store
            .create_table(&self.table_schema())
            .await
            .map_err(NodeError::store("create_table"))
    }

    pub async fn delete_table(&self) -> Result<()> {
        self.store
            .delete_table(self.table_name())
            .await
            .map_err(NodeError::store("delete_table"))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch one node by id. The returned node has no children.
    pub async fn get(&self, id: &NodeId) -> Result<Node> {
        let item = self
            .store
            .get_item(self.table_name(), &marshal::key(id))
            .await
            .map_err(NodeError::store("get"))?
            .ok_or_else(|| NodeError::NotFound(id.clone()))?;

        marshal::unmarshal(item)
    }

    /// Fetch several nodes.
    ///
    /// Results come back in whatever order the store returns them; ids with
    /// no record are simply absent. Duplicate ids are fetched once.
    pub async fn batch_get(&self, ids: &[NodeId]) -> Result<Vec<Node>> {
        let mut seen = HashSet::new();
        let keys: Vec<_> = ids
            .iter()
            .filter(|id| seen.insert(*id))
            .map(marshal::key)
            .collect();

        let limit = self.store.limits().max_batch_get.max(1);
        let mut nodes = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(limit) {
            tracing::debug!(table = %self.table_name(), count = chunk.len(), "batch get");
            let output = self
                .store
                .batch_get_items(self.table_name(), chunk)
                .await
                .map_err(NodeError::store("batch_get"))?;

            if !output.unprocessed_keys.is_empty() {
                tracing::warn!(
                    table = %self.table_name(),
                    count = output.unprocessed_keys.len(),
                    "batch get left keys unprocessed"
                );
                return Err(NodeError::Unprocessed {
                    op: "batch_get",
                    count: output.unprocessed_keys.len(),
                });
            }

            for item in output.items {
                nodes.push(marshal::unmarshal(item)?);
            }
        }

        Ok(nodes)
    }

    /// Persisted children of a node, in index sort order.
    ///
    /// Only queries the store when the node has children in memory. A node
    /// loaded with [`NodeClient::get`] never does, so this returns an empty
    /// list for it no matter what is stored; use [`NodeClient::children_of`]
    /// to always ask the store.
    pub async fn get_children(&self, node: &Node) -> Result<Vec<Node>> {
        if !node.has_children() {
            tracing::debug!(node = %node.id(), "no known children, skipping query");
            return Ok(Vec::new());
        }
        self.children_of(node.id()).await
    }

    /// All persisted records whose parent is `id`, excluding `id` itself
    pub async fn children_of(&self, id: &NodeId) -> Result<Vec<Node>> {
        let mut nodes = self.query_by_parent(id, "get_children").await?;
        // A root record is its own parent and matches its own query
        nodes.retain(|n| n.id() != id);
        Ok(nodes)
    }

    /// Persisted records that share this node's parent, including the node
    /// itself. Roots have no siblings.
    pub async fn get_siblings(&self, node: &Node) -> Result<Vec<Node>> {
        if !node.has_parent() {
            return Ok(Vec::new());
        }
        let parent_id = node.parent_id();
        let mut nodes = self.query_by_parent(parent_id, "get_siblings").await?;
        nodes.retain(|n| n.id() != parent_id);
        Ok(nodes)
    }

    /// One page of `ParentID = :pid`
    async fn query_by_parent(&self, parent_id: &NodeId, op: &'static str) -> Result<Vec<Node>> {
        let query = IndexQuery {
            index_name: self.config.index_name.clone(),
            attribute: ATTR_PARENT_ID.to_string(),
            placeholder: PARENT_ID_PLACEHOLDER.to_string(),
            value: parent_id.to_string(),
        };

        tracing::debug!(
            table = %self.table_name(),
            index = %query.index_name,
            condition = %query.key_condition(),
            parent = %parent_id,
            "index query"
        );

        let output = self
            .store
            .query_index(self.table_name(), &query)
            .await
            .map_err(NodeError::store(op))?;

        if output.has_more {
            tracing::warn!(
                parent = %parent_id,
                returned = output.items.len(),
                "index query truncated to one page"
            );
        }

        output.items.into_iter().map(marshal::unmarshal).collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Write one node, overwriting any record with the same id
    pub async fn put(&self, node: &Node) -> Result<()> {
        let item = marshal::marshal(node)?;
        self.store
            .put_item(self.table_name(), item)
            .await
            .map_err(NodeError::store("put"))
    }

    /// Write several nodes as flat records; in-memory children are not
    /// expanded.
    ///
    /// A node id given more than once is written once, with the last node
    /// given for it. Requests are split to fit the store's batch limit and
    /// sent in order. If one batch fails, the batches before it stay written.
    pub async fn batch_put<'a, I>(&self, nodes: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let mut positions: HashMap<&NodeId, usize> = HashMap::new();
        let mut items: Vec<Item> = Vec::new();
        for node in nodes {
            let item = marshal::marshal(node)?;
            match positions.get(node.id()) {
                Some(&i) => items[i] = item,
                None => {
                    positions.insert(node.id(), items.len());
                    items.push(item);
                }
            }
        }
        self.write_items(items).await
    }

    /// Write a node and all of its in-memory descendants
    pub async fn put_tree(&self, root: &Node) -> Result<()> {
        self.batch_put(root.iter()).await
    }

    async fn write_items(&self, items: Vec<Item>) -> Result<()> {
        let limit = self.store.limits().max_batch_write.max(1);
        let mut requests: Vec<WriteRequest> = items.into_iter().map(WriteRequest::Put).collect();

        while !requests.is_empty() {
            let rest = requests.split_off(requests.len().min(limit));
            let batch = std::mem::replace(&mut requests, rest);

            tracing::debug!(table = %self.table_name(), count = batch.len(), "batch write");
            let output = self
                .store
                .batch_write_items(self.table_name(), batch)
                .await
                .map_err(NodeError::store("batch_put"))?;

            if !output.unprocessed.is_empty() {
                tracing::warn!(
                    table = %self.table_name(),
                    count = output.unprocessed.len(),
                    "batch write left items unprocessed"
                );
                return Err(NodeError::Unprocessed {
                    op: "batch_put",
                    count: output.unprocessed.len(),
                });
            }
        }

        Ok(())
    }

    /// Remove one node's record. Its children keep pointing at it.
    pub async fn delete(&self, node: &Node) -> Result<()> {
        self.delete_by_id(node.id()).await
    }

    pub async fn delete_by_id(&self, id: &NodeId) -> Result<()> {
        self.store
            .delete_item(self.table_name(), &marshal::key(id))
            .await
            .map_err(NodeError::store("delete"))
    }
}
