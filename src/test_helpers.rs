//! Test helper utilities for longtext-ingest tests
//!
//! Encoders for synthetic broker batches and recording fakes for the
//! pipeline's injected capabilities.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use prost::Message;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;

use crate::broker::{BrokerClient, BrokerConnector};
use crate::decode::{AuthorPayload, Envelope, Event, MessageBatch, StatusPayload};
use crate::discovery::Resolver;
use crate::errors::{BrokerError, PublishError, ResolveError};
use crate::metrics::MetricsPublisher;
use crate::publisher::{LongTextPublisher, PublishOutcome};

// Test environment mutex to prevent concurrent environment variable modification
pub static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// A sign field whose verification flag is `flag`.
pub fn sign_with_flag(flag: u64) -> u64 {
    flag << 6
}

/// A fully encoded status event.
pub fn status_event(kind: &str, author_id: u64, message_id: u64, level: i32, sign: u64) -> Event {
    let status = StatusPayload {
        mid: message_id,
        author: Some(AuthorPayload {
            id: author_id,
            level,
            sign,
        }),
    };
    let envelope = Envelope {
        body: status.encode_to_vec(),
    };
    Event {
        kind: kind.to_string(),
        payload: envelope.encode_to_vec(),
    }
}

pub fn encode_batch(events: Vec<Event>) -> Vec<u8> {
    MessageBatch { events }.encode_to_vec()
}

/// Broker that replays a script of reads, then reports misses.
#[derive(Default)]
pub struct ScriptedBroker {
    script: Mutex<VecDeque<Result<Vec<u8>, BrokerError>>>,
    reads: Mutex<usize>,
}

impl ScriptedBroker {
    pub fn new(script: Vec<Result<Vec<u8>, BrokerError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            reads: Mutex::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock()
    }
}

#[async_trait]
impl BrokerClient for ScriptedBroker {
    async fn get(&self, key: &str) -> Result<Vec<u8>, BrokerError> {
        *self.reads.lock() += 1;
        let next = self.script.lock().pop_front();
        match next {
            Some(result) => result,
            None => {
                // Yield so a reader on an empty script does not starve the runtime.
                tokio::task::yield_now().await;
                Err(BrokerError::Miss {
                    key: key.to_string(),
                })
            }
        }
    }
}

/// Connector handing out empty scripted brokers and recording addresses.
#[derive(Default)]
pub struct RecordingConnector {
    pub connected: Mutex<Vec<String>>,
}

impl BrokerConnector for RecordingConnector {
    fn connect(&self, address: &str) -> Arc<dyn BrokerClient> {
        self.connected.lock().push(address.to_string());
        Arc::new(ScriptedBroker::default())
    }
}

/// Publisher that records every call and answers from a fixed policy.
pub struct RecordingPublisher {
    fail: bool,
    calls: Mutex<Vec<(u64, u64, Instant)>>,
}

impl RecordingPublisher {
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> Vec<(u64, u64)> {
        self.calls.lock().iter().map(|(a, m, _)| (*a, *m)).collect()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(_, _, at)| *at).collect()
    }
}

#[async_trait]
impl LongTextPublisher for RecordingPublisher {
    async fn publish(
        &self,
        author_id: u64,
        message_id: u64,
    ) -> Result<PublishOutcome, PublishError> {
        self.calls.lock().push((author_id, message_id, Instant::now()));
        if self.fail {
            Err(PublishError::PostStatus { status_code: 500 })
        } else {
            Ok(PublishOutcome::Posted)
        }
    }
}

/// Resolver that replays a script; `None` entries fail the lookup.
#[derive(Default)]
pub struct ScriptedResolver {
    script: Mutex<VecDeque<Option<Vec<&'static str>>>>,
}

impl ScriptedResolver {
    pub fn new(script: Vec<Option<Vec<&'static str>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, hostname: &str) -> Result<BTreeSet<String>, ResolveError> {
        let next = self.script.lock().pop_front().flatten();
        next.map(|addresses| addresses.into_iter().map(str::to_string).collect())
            .ok_or_else(|| ResolveError::NoAddresses {
                hostname: hostname.to_string(),
            })
    }
}

/// Metrics publisher recording the counters and gauges it was given.
#[derive(Default)]
pub struct RecordingMetrics {
    counters: Mutex<Vec<(String, u64)>>,
    gauges: Mutex<Vec<(String, u64)>>,
}

impl RecordingMetrics {
    /// Sum of every increment recorded for `key`.
    pub fn count(&self, key: &str) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .sum()
    }

    pub fn last_gauge(&self, key: &str) -> Option<u64> {
        self.gauges
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }
}

#[async_trait]
impl MetricsPublisher for RecordingMetrics {
    async fn incr_with_tags(&self, key: &str, _tags: &[(&str, &str)]) {
        self.counters.lock().push((key.to_string(), 1));
    }

    async fn count_with_tags(&self, key: &str, value: u64, _tags: &[(&str, &str)]) {
        self.counters.lock().push((key.to_string(), value));
    }

    async fn gauge(&self, key: &str, value: u64) {
        self.gauges.lock().push((key.to_string(), value));
    }

    async fn time_with_tags(&self, _key: &str, _millis: u64, _tags: &[(&str, &str)]) {}
}
