//! Per-node pipeline loops.
//!
//! Each [`crate::ingester::Ingester`] runs one of each:
//!
//! - [`ReaderTask`]: rate-limited broker reads, decoded into batches and pushed
//!   onto the handler queue (blocking, the pipeline's only backpressure).
//! - [`HandlerTask`]: filters each batch and publishes qualifying statuses.
//!   Failed publishes become [`RetryTask`]s offered to the retry queue.
//! - [`RetrierTask`]: waits out the cool-down, retries, and re-offers or
//!   discards.
//!
//! Both producers of the retry queue use [`offer_retry`], which never blocks.

use tracing::warn;

use crate::metrics::{SharedMetricsPublisher, names};
use crate::queue_adapter::{Offer, QueueAdapter};
use crate::retry::RetryTask;

pub mod handler;
pub mod manager;
pub mod reader;
pub mod retrier;

pub use handler::{BatchSummary, HandlerTask};
pub use manager::{spawn_cancellable_task, spawn_managed_task};
pub use reader::ReaderTask;
pub use retrier::{RetrierTask, RetryOutcome};

/// Offer `task` to the retry queue, dropping it if the queue is full or closed.
pub(crate) async fn offer_retry(
    queue: &dyn QueueAdapter<RetryTask>,
    task: RetryTask,
    node: &str,
    metrics: &SharedMetricsPublisher,
) -> Offer {
    let (author_id, message_id, retries_remaining) =
        (task.author_id, task.message_id, task.retries_remaining);

    let offer = match queue.offer(task).await {
        Ok(offer) => offer,
        Err(e) => {
            warn!(error = ?e, author_id, message_id, "Retry queue unavailable");
            Offer::Dropped
        }
    };

    match offer {
        Offer::Accepted => {
            metrics
                .incr_with_tags(names::RETRY_ENQUEUED, &[("node", node)])
                .await;
        }
        Offer::Dropped => {
            let queue_depth = queue.depth().await;
            warn!(
                author_id,
                message_id,
                retries_remaining,
                ?queue_depth,
                "Retry queue is full, dropping task"
            );
            metrics
                .incr_with_tags(names::RETRY_DROPPED, &[("node", node)])
                .await;
        }
    }
    offer
}
