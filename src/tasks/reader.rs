//! Broker reader loop.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broker::BrokerClient;
use crate::decode::{MessageBatch, decode_batch};
use crate::errors::BrokerError;
use crate::metrics::{SharedMetricsPublisher, names};
use crate::queue_adapter::QueueAdapter;
use crate::throttle::RateLimiter;

/// Reads one batch per rate-limiter token from a broker node.
///
/// Broker and decode errors are logged and the loop moves on; the rate
/// limiter is the only throttle between attempts. The loop ends when its
/// token is cancelled, or with an error if the handler queue is closed.
pub struct ReaderTask {
    node: String,
    key: String,
    broker: Arc<dyn BrokerClient>,
    limiter: Arc<dyn RateLimiter>,
    handler_queue: Arc<dyn QueueAdapter<MessageBatch>>,
    metrics: SharedMetricsPublisher,
    cancel_token: CancellationToken,
}

impl ReaderTask {
    pub fn new(
        node: impl Into<String>,
        key: impl Into<String>,
        broker: Arc<dyn BrokerClient>,
        limiter: Arc<dyn RateLimiter>,
        handler_queue: Arc<dyn QueueAdapter<MessageBatch>>,
        metrics: SharedMetricsPublisher,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            node: node.into(),
            key: key.into(),
            broker,
            limiter,
            handler_queue,
            metrics,
            cancel_token,
        }
    }

    #[instrument(skip_all, fields(node = %self.node, key = %self.key))]
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Reader started");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Reader shutting down");
                    break;
                }
                result = self.read_once() => result?,
            }
        }

        Ok(())
    }

    /// One iteration: wait for a token, read, decode, hand off.
    async fn read_once(&self) -> anyhow::Result<()> {
        self.limiter.acquire().await;

        let bytes = match self.broker.get(&self.key).await {
            Ok(bytes) => bytes,
            Err(BrokerError::Miss { .. }) => {
                debug!("No messages queued on broker");
                return Ok(());
            }
            Err(e) => {
                warn!(error = ?e, "Failed to read from broker");
                self.metrics
                    .incr_with_tags(names::BROKER_ERRORS, &[("node", &self.node)])
                    .await;
                return Ok(());
            }
        };

        let batch = match decode_batch(&bytes) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = ?e, bytes = bytes.len(), "Failed to decode message batch");
                return Ok(());
            }
        };

        self.metrics
            .incr_with_tags(names::BATCHES_READ, &[("node", &self.node)])
            .await;
        self.handler_queue.push(batch).await
    }
}
