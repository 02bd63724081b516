//! Flat record layout and conversion between nodes and store items.
//!
//! ```text
//! Primary Key:
//!   - ID (String, Partition Key)
//!
//! Secondary index (ParentID-index by default):
//!   - ParentID (String, Partition Key)
//!   - ID (String, Sort Key)
//!
//! Attributes:
//!   - Metadata: String (optional)
//! ```

use crate::error::NodeError;
use crate::node::{Node, NodeId};
use crate::store::{Item, Key};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primary key attribute
pub const ATTR_ID: &str = "ID";

/// Parent node id, partition key of the secondary index
pub const ATTR_PARENT_ID: &str = "ParentID";

/// Placeholder bound to the parent id in index queries
pub const PARENT_ID_PLACEHOLDER: &str = ":pid";

/// The persisted form of a single node. Children are never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "ID")]
    pub id: NodeId,

    #[serde(rename = "ParentID")]
    pub parent_id: NodeId,

    #[serde(rename = "Metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        NodeRecord {
            id: node.id().clone(),
            parent_id: node.parent_id().clone(),
            metadata: node.metadata().map(str::to_string),
        }
    }
}

impl From<NodeRecord> for Node {
    fn from(record: NodeRecord) -> Self {
        Node::from_parts(record.id, record.parent_id, record.metadata)
    }
}

/// Convert a node to a flat item
pub fn marshal(node: &Node) -> Result<Item, NodeError> {
    match serde_json::to_value(NodeRecord::from(node)) {
        Ok(Value::Object(item)) => Ok(item),
        Ok(other) => Err(NodeError::marshal(format!(
            "node {} did not encode to a record: {}",
            node.id(),
            other
        ))),
        Err(e) => Err(NodeError::marshal(format!(
            "failed to encode node {}: {}",
            node.id(),
            e
        ))),
    }
}

/// Convert a flat item back to a node with an empty child list
pub fn unmarshal(item: Item) -> Result<Node, NodeError> {
    serde_json::from_value::<NodeRecord>(Value::Object(item))
        .map(Node::from)
        .map_err(|e| NodeError::marshal(format!("failed to decode node record: {}", e)))
}

/// Primary key of a node id
pub fn key(id: &NodeId) -> Key {
    Key::new(ATTR_ID, id.as_str())
}
