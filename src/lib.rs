//! # longtext-ingest
//!
//! longtext-ingest consumes batched status events from a fleet of queue
//! broker nodes, picks out statuses written by verified authors, fetches
//! their long-text content and republishes it to a posting API. Failed
//! publishes are retried a bounded number of times after a fixed cool-down.
//!
//! ## Architecture Overview
//!
//! ### Fleet
//! - [`watcher::ConfigWatcher`] resolves the broker hostname every five seconds
//! - One [`ingester::Ingester`] runs per resolved address; addresses that
//!   disappear have their ingester closed
//!
//! ### Per-node pipeline
//! - **Reader**: one broker read per rate-limiter token, decoded into a batch
//! - **Handler**: type filter, two-stage decode, verification predicate,
//!   synchronous fetch-and-post
//! - **Retrier**: 60s cool-down, re-publish, re-enqueue with one less retry
//!
//! The reader blocks when the handler falls behind. The retry queue never
//! blocks its producers: a task offered to a full queue is dropped.
//!
//! ## Configuration
//!
//! The service is configured via environment variables. Key variables include:
//! - `BROKER_HOSTNAME`, `BROKER_PORT`, `BROKER_KEY`: where to read from
//! - `INGEST_RATE_LIMIT`, `INGEST_CHANNEL_BUFFER`, `INGEST_MAX_RETRIES`: pipeline limits
//! - `LONGTEXT_FETCH_URL`, `LONGTEXT_POST_URL`, `LONGTEXT_AUTH`: the HTTP endpoints
//!
//! ## Error Handling
//!
//! All error strings use the format: `error-ingest-<domain>-<number> <message>: <details>`
//!
//! ## Examples
//!
//! ```rust,ignore
//! use longtext_ingest::{config::Config, watcher::ConfigWatcher};
//!
//! let config = Config::new()?;
//! let watcher = ConfigWatcher::new(
//!     config.broker.hostname.clone(),
//!     resolver,
//!     factory,
//!     metrics,
//!     cancel_token,
//! );
//! watcher.watch().await?;
//! ```

/// Broker node clients.
///
/// The `BrokerClient` trait and a memcache text-protocol implementation
/// with one reusable connection per node.
pub mod broker;

/// Configuration loaded once from environment variables.
pub mod config;

pub(crate) mod constants;

/// Wire messages and the pure decode and filter pipeline.
pub mod decode;

/// Broker hostname resolution.
pub mod discovery;

pub mod errors;

/// Per-node pipeline lifecycle.
pub mod ingester;

/// Metrics publishing with no-op and StatsD backends.
pub mod metrics;

/// Long-text fetch-and-post over HTTP.
pub mod publisher;

/// Bounded queue abstraction with explicit overflow policies.
pub mod queue_adapter;

pub mod retry;

/// Reader, handler and retrier loops, and spawn helpers.
pub mod tasks;

/// Broker read rate limiting.
pub mod throttle;

/// Fleet reconciliation against DNS.
pub mod watcher;

#[cfg(test)]
pub mod test_helpers;
