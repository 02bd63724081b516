use crate::node::NodeId;
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by node construction and [`crate::client::NodeClient`]
#[derive(Debug, Error)]
pub enum NodeError {
    /// Invalid node identity
    #[error("invalid node: {0}")]
    Validation(String),

    /// A node could not be converted to or from a flat record
    #[error("marshal error: {0}")]
    Marshal(String),

    /// The store rejected or failed a request
    #[error("{op} failed: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    /// No record exists for the id
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// The store accepted a batch but left part of it unprocessed
    #[error("{op} left {count} item(s) unprocessed")]
    Unprocessed { op: &'static str, count: usize },
}

impl NodeError {
    pub(crate) fn store(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { op, source }
    }

    pub(crate) fn marshal(msg: impl Into<String>) -> Self {
        Self::Marshal(msg.into())
    }
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
