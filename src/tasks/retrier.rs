//! Retry loop.
//!
//! There is one retrier per node, so cool-down waits for a node are
//! serialized: a task that arrives while another is waiting queues behind it.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::offer_retry;
use crate::metrics::{SharedMetricsPublisher, names};
use crate::publisher::LongTextPublisher;
use crate::queue_adapter::{Offer, QueueAdapter};
use crate::retry::RetryTask;

/// What happened to a task handed to [`RetrierTask::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded,
    /// Failed again and was re-offered with one less retry.
    Requeued,
    /// Failed again but the retry queue was full.
    Dropped,
    /// Failed with no retries left.
    Exhausted,
    /// Cancelled during the cool-down or the publish; the task is lost.
    Cancelled,
}

pub struct RetrierTask {
    node: String,
    retry_queue: Arc<dyn QueueAdapter<RetryTask>>,
    publisher: Arc<dyn LongTextPublisher>,
    metrics: SharedMetricsPublisher,
    cancel_token: CancellationToken,
}

impl RetrierTask {
    pub fn new(
        node: impl Into<String>,
        retry_queue: Arc<dyn QueueAdapter<RetryTask>>,
        publisher: Arc<dyn LongTextPublisher>,
        metrics: SharedMetricsPublisher,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            node: node.into(),
            retry_queue,
            publisher,
            metrics,
            cancel_token,
        }
    }

    #[instrument(skip_all, fields(node = %self.node))]
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Retrier started");

        loop {
            let task = tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                task = self.retry_queue.pull() => task,
            };
            let Some(task) = task else {
                info!("Retry queue closed");
                break;
            };

            if self.process(task).await == RetryOutcome::Cancelled {
                break;
            }
        }

        info!("Retrier shutting down");
        Ok(())
    }

    /// Wait out the task's cool-down, publish again and settle the result.
    ///
    /// Both the wait and the publish stop early when the token is cancelled.
    pub async fn process(&self, task: RetryTask) -> RetryOutcome {
        let wait = task.remaining_cool_down();
        if !wait.is_zero() {
            debug!(
                author_id = task.author_id,
                message_id = task.message_id,
                wait_ms = wait.as_millis() as u64,
                "Waiting for retry cool-down"
            );
            tokio::select! {
                _ = self.cancel_token.cancelled() => return self.cancelled(&task),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let result = tokio::select! {
            _ = self.cancel_token.cancelled() => return self.cancelled(&task),
            result = self.publisher.publish(task.author_id, task.message_id) => result,
        };

        let error = match result {
            Ok(outcome) => {
                debug!(
                    author_id = task.author_id,
                    message_id = task.message_id,
                    ?outcome,
                    "Retry succeeded"
                );
                self.metrics
                    .incr_with_tags(names::PUBLISH_SUCCEEDED, &[("node", &self.node)])
                    .await;
                return RetryOutcome::Succeeded;
            }
            Err(e) => e,
        };

        self.metrics
            .incr_with_tags(names::PUBLISH_FAILED, &[("node", &self.node)])
            .await;

        let (author_id, message_id) = (task.author_id, task.message_id);
        match task.after_failure() {
            Some(next) => {
                debug!(
                    author_id,
                    message_id,
                    retries_remaining = next.retries_remaining,
                    error = ?error,
                    "Retry failed, re-enqueueing"
                );
                match offer_retry(self.retry_queue.as_ref(), next, &self.node, &self.metrics).await
                {
                    Offer::Accepted => RetryOutcome::Requeued,
                    Offer::Dropped => RetryOutcome::Dropped,
                }
            }
            None => {
                warn!(author_id, message_id, error = ?error, "Retries exhausted, discarding task");
                self.metrics
                    .incr_with_tags(names::RETRY_EXHAUSTED, &[("node", &self.node)])
                    .await;
                RetryOutcome::Exhausted
            }
        }
    }

    fn cancelled(&self, task: &RetryTask) -> RetryOutcome {
        warn!(
            author_id = task.author_id,
            message_id = task.message_id,
            retries_remaining = task.retries_remaining,
            "Retrier cancelled, dropping in-flight task"
        );
        RetryOutcome::Cancelled
    }
}
