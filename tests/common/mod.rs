//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use longtext_ingest::broker::{BrokerClient, BrokerConnector};
use longtext_ingest::decode::{AuthorPayload, Envelope, Event, MessageBatch, StatusPayload};
use longtext_ingest::discovery::Resolver;
use longtext_ingest::errors::{BrokerError, PublishError, ResolveError};
use longtext_ingest::publisher::{LongTextPublisher, PublishOutcome};
use parking_lot::Mutex;
use prost::Message;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub fn status_event(kind: &str, author_id: u64, message_id: u64, level: i32, flag: u64) -> Event {
    let status = StatusPayload {
        mid: message_id,
        author: Some(AuthorPayload {
            id: author_id,
            level,
            sign: flag << 6,
        }),
    };
    Event {
        kind: kind.to_string(),
        payload: Envelope {
            body: status.encode_to_vec(),
        }
        .encode_to_vec(),
    }
}

pub fn encode_batch(events: Vec<Event>) -> Vec<u8> {
    MessageBatch { events }.encode_to_vec()
}

/// Replays queued batches, then reports misses.
#[derive(Default)]
pub struct ScriptedBroker {
    script: Mutex<VecDeque<Vec<u8>>>,
}

impl ScriptedBroker {
    pub fn new(batches: Vec<Vec<u8>>) -> Self {
        Self {
            script: Mutex::new(batches.into()),
        }
    }
}

#[async_trait]
impl BrokerClient for ScriptedBroker {
    async fn get(&self, key: &str) -> Result<Vec<u8>, BrokerError> {
        let next = self.script.lock().pop_front();
        match next {
            Some(bytes) => Ok(bytes),
            None => {
                tokio::time::sleep(Duration::from_millis(1)).await;
                Err(BrokerError::Miss {
                    key: key.to_string(),
                })
            }
        }
    }
}

/// Hands each address the batches registered for it and records connects.
#[derive(Default)]
pub struct ScriptedConnector {
    batches: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    pub connected: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn with_batches(self, address: &str, batches: Vec<Vec<u8>>) -> Self {
        self.batches.lock().insert(address.to_string(), batches);
        self
    }
}

impl BrokerConnector for ScriptedConnector {
    fn connect(&self, address: &str) -> Arc<dyn BrokerClient> {
        self.connected.lock().push(address.to_string());
        let batches = self.batches.lock().remove(address).unwrap_or_default();
        Arc::new(ScriptedBroker::new(batches))
    }
}

/// Resolver whose answer the test changes between refreshes.
#[derive(Default)]
pub struct SwitchableResolver {
    answer: Mutex<Option<Vec<String>>>,
}

impl SwitchableResolver {
    pub fn set(&self, addresses: Option<&[&str]>) {
        *self.answer.lock() = addresses.map(|a| a.iter().map(|s| s.to_string()).collect());
    }
}

#[async_trait]
impl Resolver for SwitchableResolver {
    async fn resolve(&self, hostname: &str) -> Result<BTreeSet<String>, ResolveError> {
        self.answer
            .lock()
            .clone()
            .map(|addresses| addresses.into_iter().collect())
            .ok_or_else(|| ResolveError::NoAddresses {
                hostname: hostname.to_string(),
            })
    }
}

/// Fails the first `failures` calls, then succeeds. Records call times.
pub struct FlakyPublisher {
    failures: Mutex<usize>,
    pub attempts: Mutex<Vec<(u64, u64, Instant)>>,
}

impl FlakyPublisher {
    pub fn new(failures: usize) -> Self {
        Self {
            failures: Mutex::new(failures),
            attempts: Mutex::new(vec![]),
        }
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().iter().map(|(_, _, at)| *at).collect()
    }
}

#[async_trait]
impl LongTextPublisher for FlakyPublisher {
    async fn publish(
        &self,
        author_id: u64,
        message_id: u64,
    ) -> Result<PublishOutcome, PublishError> {
        self.attempts
            .lock()
            .push((author_id, message_id, Instant::now()));
        let mut failures = self.failures.lock();
        if *failures > 0 {
            *failures -= 1;
            Err(PublishError::PostStatus { status_code: 500 })
        } else {
            Ok(PublishOutcome::Posted)
        }
    }
}
