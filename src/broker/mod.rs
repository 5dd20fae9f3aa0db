//! Broker node access.
//!
//! A broker node is a key/value store with a blocking "get value for key"
//! primitive. Each read pops one encoded [`crate::decode::MessageBatch`] from
//! the node's queue. The pipeline only depends on the [`BrokerClient`] trait;
//! [`MemcacheBrokerClient`] speaks the memcache text protocol used by the
//! production queue servers.

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::BrokerError;

mod memcache;

pub use memcache::{MemcacheBrokerClient, MemcacheConnector};

/// Read access to a single broker node.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Fetch the next value stored under `key`.
    ///
    /// Returns [`BrokerError::Miss`] when the node has nothing queued.
    async fn get(&self, key: &str) -> Result<Vec<u8>, BrokerError>;
}

/// Creates a [`BrokerClient`] for a node address discovered at runtime.
///
/// Implementations must not perform I/O here; connections are opened lazily
/// by the client on its first read.
pub trait BrokerConnector: Send + Sync {
    fn connect(&self, address: &str) -> Arc<dyn BrokerClient>;
}
