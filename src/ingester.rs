//! One broker node's pipeline.
//!
//! An [`Ingester`] owns the handler and retry queues for a node and runs the
//! reader, handler and retrier loops against them. Its cancellation token is
//! a child of the process token: cancelling the process stops every ingester,
//! and [`Ingester::close`] stops just this one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, info, info_span, warn};

use crate::broker::BrokerClient;
use crate::decode::MessageBatch;
use crate::metrics::SharedMetricsPublisher;
use crate::publisher::LongTextPublisher;
use crate::queue_adapter::{MpscQueueAdapter, OverflowPolicy};
use crate::retry::RetryTask;
use crate::tasks::{HandlerTask, ReaderTask, RetrierTask, spawn_managed_task};
use crate::throttle::RateLimiter;

/// Per-node settings, identical for every node in the fleet.
#[derive(Debug, Clone)]
pub struct IngesterSettings {
    pub key: String,
    /// Capacity of both the handler and the retry queue.
    pub channel_buffer: usize,
    pub max_retries: u32,
}

/// Capabilities an ingester is wired with.
#[derive(Clone)]
pub struct IngesterResources {
    pub broker: Arc<dyn BrokerClient>,
    pub limiter: Arc<dyn RateLimiter>,
    pub publisher: Arc<dyn LongTextPublisher>,
    pub metrics: SharedMetricsPublisher,
}

pub struct Ingester {
    address: String,
    settings: IngesterSettings,
    resources: IngesterResources,
    handler_queue: Arc<MpscQueueAdapter<MessageBatch>>,
    retry_queue: Arc<MpscQueueAdapter<RetryTask>>,
    cancel_token: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl Ingester {
    /// Allocate the node's queues. Nothing runs until [`Ingester::start`].
    pub fn new(
        address: impl Into<String>,
        settings: IngesterSettings,
        resources: IngesterResources,
        parent_token: &CancellationToken,
    ) -> Self {
        let handler_queue = Arc::new(MpscQueueAdapter::with_policy(
            settings.channel_buffer,
            OverflowPolicy::Block,
        ));
        let retry_queue = Arc::new(MpscQueueAdapter::with_policy(
            settings.channel_buffer,
            OverflowPolicy::DropNewest,
        ));

        Self {
            address: address.into(),
            settings,
            resources,
            handler_queue,
            retry_queue,
            cancel_token: parent_token.child_token(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Spawn the reader, handler and retrier loops and return immediately.
    /// Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(node = %self.address, "Ingester already started");
            return;
        }

        info!(
            node = %self.address,
            key = %self.settings.key,
            channel_buffer = self.settings.channel_buffer,
            max_retries = self.settings.max_retries,
            "Starting ingester"
        );
        let span = info_span!("ingester", node = %self.address);

        let reader = ReaderTask::new(
            self.address.clone(),
            self.settings.key.clone(),
            self.resources.broker.clone(),
            self.resources.limiter.clone(),
            self.handler_queue.clone(),
            self.resources.metrics.clone(),
            self.cancel_token.clone(),
        );
        let handler = HandlerTask::new(
            self.address.clone(),
            self.settings.max_retries,
            self.handler_queue.clone(),
            self.retry_queue.clone(),
            self.resources.publisher.clone(),
            self.resources.metrics.clone(),
            self.cancel_token.clone(),
        );
        let retrier = RetrierTask::new(
            self.address.clone(),
            self.retry_queue.clone(),
            self.resources.publisher.clone(),
            self.resources.metrics.clone(),
            self.cancel_token.clone(),
        );

        spawn_managed_task(
            &self.tracker,
            self.cancel_token.clone(),
            "handler",
            handler.run().instrument(span.clone()),
        );
        spawn_managed_task(
            &self.tracker,
            self.cancel_token.clone(),
            "reader",
            reader.run().instrument(span.clone()),
        );
        spawn_managed_task(
            &self.tracker,
            self.cancel_token.clone(),
            "retrier",
            retrier.run().instrument(span),
        );
        self.tracker.close();
    }

    /// Signal this ingester's loops to stop. Does not wait for them.
    pub fn close(&self) {
        info!(node = %self.address, key = %self.settings.key, "Ingester stop reading");
        self.cancel_token.cancel();
    }

    /// Wait until every loop has exited. Returns immediately if never started.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// True once started and every loop has exited.
    pub fn is_finished(&self) -> bool {
        self.started.load(Ordering::SeqCst) && self.tracker.is_closed() && self.tracker.is_empty()
    }

    /// True once closed, or once the process token was cancelled.
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl std::fmt::Debug for Ingester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingester")
            .field("address", &self.address)
            .field("settings", &self.settings)
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .finish()
    }
}
