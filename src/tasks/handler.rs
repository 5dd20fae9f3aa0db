//! Batch handler loop.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::offer_retry;
use crate::decode::{Disposition, MessageBatch, StatusRecord, evaluate_event};
use crate::metrics::{SharedMetricsPublisher, names};
use crate::publisher::LongTextPublisher;
use crate::queue_adapter::{Offer, QueueAdapter};
use crate::retry::RetryTask;

/// Per-batch counts, logged at debug level and returned for inspection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub events: usize,
    pub skipped: usize,
    pub qualified: usize,
    pub published: usize,
    pub retries_enqueued: usize,
    pub retries_dropped: usize,
}

/// Consumes batches in arrival order and publishes qualifying statuses.
pub struct HandlerTask {
    node: String,
    max_retries: u32,
    handler_queue: Arc<dyn QueueAdapter<MessageBatch>>,
    retry_queue: Arc<dyn QueueAdapter<RetryTask>>,
    publisher: Arc<dyn LongTextPublisher>,
    metrics: SharedMetricsPublisher,
    cancel_token: CancellationToken,
}

impl HandlerTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: impl Into<String>,
        max_retries: u32,
        handler_queue: Arc<dyn QueueAdapter<MessageBatch>>,
        retry_queue: Arc<dyn QueueAdapter<RetryTask>>,
        publisher: Arc<dyn LongTextPublisher>,
        metrics: SharedMetricsPublisher,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            node: node.into(),
            max_retries,
            handler_queue,
            retry_queue,
            publisher,
            metrics,
            cancel_token,
        }
    }

    #[instrument(skip_all, fields(node = %self.node))]
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Handler started");

        loop {
            let batch = tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                batch = self.handler_queue.pull() => batch,
            };
            let Some(batch) = batch else {
                info!("Handler queue closed");
                break;
            };

            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                summary = self.handle_batch(batch) => {
                    debug!(?summary, "Handled batch");
                }
            }
        }

        info!("Handler shutting down");
        Ok(())
    }

    /// Filter every event in `batch` and publish the qualifying ones.
    ///
    /// Publishing is synchronous: the next event is not looked at until the
    /// current publish has finished. A failed publish is turned into a
    /// [`RetryTask`] with the full retry budget and offered to the retry
    /// queue without blocking.
    pub async fn handle_batch(&self, batch: MessageBatch) -> BatchSummary {
        let mut summary = BatchSummary {
            events: batch.events.len(),
            ..Default::default()
        };

        for event in &batch.events {
            let record = match evaluate_event(event) {
                Disposition::Qualified(record) => record,
                Disposition::UnsupportedType => {
                    debug!(kind = %event.kind, "Skipping unsupported event type");
                    summary.skipped += 1;
                    continue;
                }
                Disposition::Malformed(e) => {
                    warn!(kind = %event.kind, error = ?e, "Skipping malformed status event");
                    summary.skipped += 1;
                    continue;
                }
                Disposition::Unverified(record) => {
                    debug!(
                        author_id = record.author_id,
                        message_id = record.message_id,
                        "Skipping status from unverified author"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            summary.qualified += 1;
            self.metrics
                .incr_with_tags(names::EVENTS_QUALIFIED, &[("node", &self.node)])
                .await;

            if self.publish(&record).await {
                summary.published += 1;
                continue;
            }

            let task = RetryTask::new(record.author_id, record.message_id, self.max_retries);
            match offer_retry(self.retry_queue.as_ref(), task, &self.node, &self.metrics).await {
                Offer::Accepted => summary.retries_enqueued += 1,
                Offer::Dropped => summary.retries_dropped += 1,
            }
        }

        if summary.skipped > 0 {
            self.metrics
                .count_with_tags(
                    names::EVENTS_SKIPPED,
                    summary.skipped as u64,
                    &[("node", &self.node)],
                )
                .await;
        }
        summary
    }

    async fn publish(&self, record: &StatusRecord) -> bool {
        let started = std::time::Instant::now();
        let result = self
            .publisher
            .publish(record.author_id, record.message_id)
            .await;
        self.metrics
            .time_with_tags(
                names::PUBLISH_DURATION,
                started.elapsed().as_millis() as u64,
                &[("node", &self.node)],
            )
            .await;

        match result {
            Ok(_) => {
                self.metrics
                    .incr_with_tags(names::PUBLISH_SUCCEEDED, &[("node", &self.node)])
                    .await;
                true
            }
            Err(e) => {
                warn!(
                    author_id = record.author_id,
                    message_id = record.message_id,
                    error = ?e,
                    "Failed to publish long text"
                );
                self.metrics
                    .incr_with_tags(names::PUBLISH_FAILED, &[("node", &self.node)])
                    .await;
                false
            }
        }
    }
}
