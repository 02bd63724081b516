use crate::error::NodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Identifier of a node.
///
/// Generated ids are random v4 UUID strings. Caller-supplied ids are accepted
/// as long as they are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    /// Create a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse from string, rejecting the empty id
    pub fn parse_str(s: &str) -> Result<Self, NodeError> {
        if s.is_empty() {
            return Err(NodeError::Validation("id can't be an empty string".into()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Err(NodeError::Validation("id can't be an empty string".into()));
        }
        Ok(Self(s))
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

// ============================================================================
// Node
// ============================================================================

/// A node of an in-memory tree.
///
/// A root node is its own parent: `parent_id() == id()`. The child list is
/// whatever has been built locally; it is never persisted and is empty for
/// nodes loaded from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    parent_id: NodeId,
    metadata: Option<String>,
    children: Vec<Node>,
}

impl Node {
    /// Create a root node with a fresh id
    pub fn new() -> Self {
        Self::root(NodeId::new())
    }

    /// Create a root node with a caller-supplied id
    pub fn with_id(id: &str) -> Result<Self, NodeError> {
        Ok(Self::root(NodeId::parse_str(id)?))
    }

    fn root(id: NodeId) -> Self {
        Self {
            parent_id: id.clone(),
            id,
            metadata: None,
            children: Vec::new(),
        }
    }

    /// Rebuild a node from its persisted fields. The child list starts empty.
    pub(crate) fn from_parts(id: NodeId, parent_id: NodeId, metadata: Option<String>) -> Self {
        Self {
            id,
            parent_id,
            metadata,
            children: Vec::new(),
        }
    }

    /// Create a child with a fresh id, append it to this node's children and
    /// return it.
    pub fn create_child(&mut self) -> &mut Node {
        self.attach(NodeId::new())
    }

    /// Same as [`Node::create_child`] with a caller-supplied id.
    ///
    /// The id must not already be used by this node or any of its in-memory
    /// descendants. Ancestors above this node are not visible here.
    pub fn create_child_with_id(&mut self, id: &str) -> Result<&mut Node, NodeError> {
        let id = NodeId::parse_str(id)?;
        if self.find(&id).is_some() {
            return Err(NodeError::Validation(format!(
                "id {} is already used in the tree under {}",
                id, self.id
            )));
        }
        Ok(self.attach(id))
    }

    fn attach(&mut self, id: NodeId) -> &mut Node {
        self.children.push(Node {
            id,
            parent_id: self.id.clone(),
            metadata: None,
            children: Vec::new(),
        });
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn parent_id(&self) -> &NodeId {
        &self.parent_id
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }

    pub fn set_metadata(&mut self, metadata: impl Into<String>) {
        self.metadata = Some(metadata.into());
    }

    pub fn clear_metadata(&mut self) {
        self.metadata = None;
    }

    /// Builder-style metadata setter
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.set_metadata(metadata);
        self
    }

    /// Locally known children, in creation order
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// False for roots, whose parent id is their own id
    pub fn has_parent(&self) -> bool {
        self.parent_id != self.id
    }

    /// Whether any children are known in memory.
    ///
    /// This says nothing about what a store holds for this node.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Depth-first, pre-order walk over this node and its in-memory descendants
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Number of in-memory descendants, excluding this node
    pub fn descendant_count(&self) -> usize {
        self.iter().count() - 1
    }

    /// Find a node by id among this node and its in-memory descendants
    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.iter().find(|n| n.id() == id)
    }

    /// Render this node and its in-memory descendants as an indented listing
    pub fn render(&self) -> String {
        let mut output = String::new();
        self.render_node(&mut output, "");
        output
    }

    fn render_node(&self, output: &mut String, indent: &str) {
        let parent = if self.has_parent() {
            self.parent_id.as_str()
        } else {
            "none"
        };
        output.push_str(&format!("{}ID: {}, Parent: {}\n", indent, self.id, parent));

        if self.has_children() {
            output.push_str(&format!("{}Children:\n", indent));
            let child_indent = format!("{}  ", indent);
            for child in &self.children {
                child.render_node(output, &child_indent);
            }
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl<'a> IntoIterator for &'a Node {
    type Item = &'a Node;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Pre-order iterator returned by [`Node::iter`]
pub struct Iter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Reversed so the first child is visited first
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
