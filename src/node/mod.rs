//! In-memory node trees.
//!
//! Nothing in this module touches a store; see [`crate::client`] for that.

mod types;

pub use types::{Iter, Node, NodeId};
