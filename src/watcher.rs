//! Fleet reconciliation.
//!
//! [`ConfigWatcher`] re-resolves the broker hostname every
//! [`FLEET_WATCH_INTERVAL`] and keeps exactly one running [`Ingester`] per
//! resolved address. A failed or empty resolution leaves the fleet as it is.
//!
//! The watcher owns the fleet map and is its only writer, so the map needs no
//! lock; [`ConfigWatcher::watch`] takes `self` by value.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::BrokerConnector;
use crate::constants::FLEET_WATCH_INTERVAL;
use crate::discovery::Resolver;
use crate::ingester::{Ingester, IngesterResources, IngesterSettings};
use crate::metrics::{SharedMetricsPublisher, names};
use crate::publisher::LongTextPublisher;
use crate::throttle::{GovernorRateLimiter, RateLimiter};

/// Builds an ingester for a newly discovered node address.
pub trait IngesterFactory: Send + Sync {
    fn create(&self, address: &str, parent_token: &CancellationToken) -> Ingester;
}

/// Factory wiring each node to its own broker client and rate limiter, and
/// to the publisher and metrics shared by the whole fleet.
pub struct DefaultIngesterFactory {
    settings: IngesterSettings,
    rate_limit: NonZeroU32,
    connector: Arc<dyn BrokerConnector>,
    publisher: Arc<dyn LongTextPublisher>,
    metrics: SharedMetricsPublisher,
}

impl DefaultIngesterFactory {
    pub fn new(
        settings: IngesterSettings,
        rate_limit: NonZeroU32,
        connector: Arc<dyn BrokerConnector>,
        publisher: Arc<dyn LongTextPublisher>,
        metrics: SharedMetricsPublisher,
    ) -> Self {
        Self {
            settings,
            rate_limit,
            connector,
            publisher,
            metrics,
        }
    }
}

impl IngesterFactory for DefaultIngesterFactory {
    fn create(&self, address: &str, parent_token: &CancellationToken) -> Ingester {
        let limiter: Arc<dyn RateLimiter> = Arc::new(GovernorRateLimiter::per_second(self.rate_limit));
        let resources = IngesterResources {
            broker: self.connector.connect(address),
            limiter,
            publisher: self.publisher.clone(),
            metrics: self.metrics.clone(),
        };
        Ingester::new(address, self.settings.clone(), resources, parent_token)
    }
}

/// Addresses started and stopped by one reconciliation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FleetChange {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
}

impl FleetChange {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty()
    }
}

pub struct ConfigWatcher {
    hostname: String,
    resolver: Arc<dyn Resolver>,
    factory: Arc<dyn IngesterFactory>,
    metrics: SharedMetricsPublisher,
    cancel_token: CancellationToken,
    interval: Duration,
    ingesters: BTreeMap<String, Ingester>,
    /// Closed ingesters whose loops may still be finishing.
    draining: Vec<Ingester>,
}

impl ConfigWatcher {
    pub fn new(
        hostname: impl Into<String>,
        resolver: Arc<dyn Resolver>,
        factory: Arc<dyn IngesterFactory>,
        metrics: SharedMetricsPublisher,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            resolver,
            factory,
            metrics,
            cancel_token,
            interval: FLEET_WATCH_INTERVAL,
            ingesters: BTreeMap::new(),
            draining: Vec::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Addresses with a running ingester, in sorted order.
    pub fn addresses(&self) -> Vec<String> {
        self.ingesters.keys().cloned().collect()
    }

    pub fn ingester(&self, address: &str) -> Option<&Ingester> {
        self.ingesters.get(address)
    }

    /// Resolve and reconcile until cancelled, then stop the whole fleet.
    ///
    /// Cancellation is checked between iterations and during the interval
    /// sleep, never in the middle of a resolution.
    pub async fn watch(mut self) -> anyhow::Result<()> {
        info!(hostname = %self.hostname, interval_ms = self.interval.as_millis() as u64, "Fleet watcher started");

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            self.refresh().await;

            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Fleet watcher stopped");
        self.shutdown().await;
        Ok(())
    }

    /// One resolution and, if it succeeded, one reconciliation.
    pub async fn refresh(&mut self) -> FleetChange {
        match self.resolver.resolve(&self.hostname).await {
            Ok(addresses) => self.reconcile(&addresses).await,
            Err(e) => {
                warn!(hostname = %self.hostname, error = ?e, "Failed to resolve broker hostname, keeping current fleet");
                FleetChange::default()
            }
        }
    }

    /// Start an ingester for each new address and stop the ones whose address
    /// is gone. An empty set is ignored.
    pub async fn reconcile(&mut self, resolved: &BTreeSet<String>) -> FleetChange {
        let mut change = FleetChange::default();
        if resolved.is_empty() {
            debug!(hostname = %self.hostname, "Resolution returned no addresses, keeping current fleet");
            return change;
        }

        for address in resolved {
            if self.ingesters.contains_key(address) {
                continue;
            }
            info!(node = %address, hostname = %self.hostname, "New broker node resolved");
            let ingester = self.factory.create(address, &self.cancel_token);
            ingester.start();
            self.ingesters.insert(address.clone(), ingester);
            change.started.push(address.clone());
        }

        let removed: Vec<String> = self
            .ingesters
            .keys()
            .filter(|address| !resolved.contains(*address))
            .cloned()
            .collect();
        for address in removed {
            if let Some(ingester) = self.ingesters.remove(&address) {
                info!(node = %address, "Broker node no longer resolved");
                ingester.close();
                self.draining.push(ingester);
                change.stopped.push(address);
            }
        }
        self.draining.retain(|ingester| !ingester.is_finished());

        if !change.is_empty() {
            info!(
                started = ?change.started,
                stopped = ?change.stopped,
                fleet_size = self.ingesters.len(),
                "Fleet changed"
            );
        }
        self.metrics
            .gauge(names::FLEET_SIZE, self.ingesters.len() as u64)
            .await;
        change
    }

    /// Close every ingester and wait for its loops to exit, including the
    /// ones already stopped by an earlier reconciliation.
    pub async fn shutdown(&mut self) {
        for ingester in self.ingesters.values() {
            ingester.close();
        }
        let running = std::mem::take(&mut self.ingesters).into_values();
        for ingester in running.chain(self.draining.drain(..)) {
            ingester.wait().await;
            debug!(node = %ingester.address(), "Ingester stopped");
        }
    }
}
