//! Work queue abstraction for the in-process pipeline channels.
//!
//! Each ingester owns two bounded queues: the handler queue between the
//! reader and handler loops, and the retry queue between the handler and the
//! retrier. They differ only in what happens when they are full, which is
//! captured by [`OverflowPolicy`]:
//!
//! - **Handler queue**: [`OverflowPolicy::Block`], the reader waits for space
//!   and so stops draining the broker.
//! - **Retry queue**: [`OverflowPolicy::DropNewest`], the incoming retry task
//!   is discarded and the producer carries on.
//!
//! # Example
//!
//! ```rust,ignore
//! use longtext_ingest::queue_adapter::{MpscQueueAdapter, Offer, OverflowPolicy, QueueAdapter};
//!
//! let queue = MpscQueueAdapter::<u64>::with_policy(1, OverflowPolicy::DropNewest);
//! assert_eq!(queue.offer(1).await?, Offer::Accepted);
//! assert_eq!(queue.offer(2).await?, Offer::Dropped);
//! ```

use anyhow::Result;
use async_trait::async_trait;

mod mpsc;

pub use mpsc::MpscQueueAdapter;

/// What a queue does with a new item when it is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for space. Backpressure propagates to the producer.
    #[default]
    Block,
    /// Discard the incoming item and return immediately.
    DropNewest,
}

/// Result of [`QueueAdapter::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Dropped,
}

/// Generic trait for queue adapters that can work with any work type.
///
/// # Type Parameters
///
/// * `T` - The type of work items in the queue. Must be `Send + Sync` for thread safety.
#[async_trait]
pub trait QueueAdapter<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Pull the next work item from the queue.
    ///
    /// Blocks until an item is available. Returns `None` once the queue is
    /// closed and drained.
    async fn pull(&self) -> Option<T>;

    /// Push a work item, waiting for space if the queue is full.
    async fn push(&self, work: T) -> Result<()>;

    /// Enqueue according to the queue's [`OverflowPolicy`].
    ///
    /// Only errors when the queue can no longer accept anything (closed or
    /// backend failure). A full `DropNewest` queue returns
    /// `Ok(Offer::Dropped)`.
    async fn offer(&self, work: T) -> Result<Offer> {
        self.push(work).await?;
        Ok(Offer::Accepted)
    }

    /// Get the current queue depth if available.
    async fn depth(&self) -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn QueueAdapter<String>) {}
    }

    #[test]
    fn test_arc_dyn_queue_adapter() {
        fn _assert_sendable(_: Arc<dyn QueueAdapter<String>>) {}
    }

    #[test]
    fn test_default_policy_blocks() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Block);
    }
}
