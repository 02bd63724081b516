//! Recursive node trees persisted as flat records.
//!
//! - [`node`]: in-memory trees, no I/O
//! - [`client`]: [`NodeClient`] maps nodes to records and back
//! - [`store`]: the [`KeyValueStore`] collaborator and its backends
//! - [`config`]: defaults and `ARBOR_*` environment configuration

pub mod client;
pub mod config;
pub mod error;
pub mod node;
pub mod store;

pub use client::{NodeClient, NodeRecord};
pub use config::{Backend, ClientConfig, StoreConfig};
pub use error::{NodeError, Result};
pub use node::{Node, NodeId};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError};
