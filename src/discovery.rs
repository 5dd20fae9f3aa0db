//! Broker fleet discovery.
//!
//! The broker fleet sits behind one logical hostname. [`Resolver::resolve`]
//! returns the node addresses it currently maps to; the watcher diffs that
//! set against the running ingesters.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::trace;

use crate::errors::ResolveError;

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `hostname` to the set of node addresses (IP literals, no port).
    ///
    /// An empty result is an error: the watcher keeps the previous fleet
    /// rather than stopping every ingester on a transient DNS glitch.
    async fn resolve(&self, hostname: &str) -> Result<BTreeSet<String>, ResolveError>;
}

/// System resolver via `tokio::net::lookup_host`.
#[derive(Debug, Clone, Default)]
pub struct DnsResolver;

impl DnsResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, hostname: &str) -> Result<BTreeSet<String>, ResolveError> {
        // lookup_host needs a port; it is discarded again below.
        let addresses: BTreeSet<String> = tokio::net::lookup_host((hostname, 0))
            .await
            .map_err(|source| ResolveError::LookupFailed {
                hostname: hostname.to_string(),
                source,
            })?
            .map(|addr| addr.ip().to_string())
            .collect();

        if addresses.is_empty() {
            return Err(ResolveError::NoAddresses {
                hostname: hostname.to_string(),
            });
        }

        trace!(hostname, count = addresses.len(), "Resolved broker hostname");
        Ok(addresses)
    }
}
