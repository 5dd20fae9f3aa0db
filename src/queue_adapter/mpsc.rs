//! Bounded tokio MPSC channel behind the [`QueueAdapter`] trait.
//!
//! Items are lost on restart and there is no acknowledgment; the pipeline
//! accepts that (a dropped task is logged, never persisted).

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use super::{Offer, OverflowPolicy, QueueAdapter};
use crate::errors::QueueError;

/// MPSC channel-based queue adapter.
///
/// The receiver is wrapped in an `Arc<Mutex>` so the adapter can be cloned
/// and shared between the producing and consuming tasks.
pub struct MpscQueueAdapter<T>
where
    T: Send + Sync + 'static,
{
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    sender: mpsc::Sender<T>,
    policy: OverflowPolicy,
}

impl<T> MpscQueueAdapter<T>
where
    T: Send + Sync + 'static,
{
    /// Create a blocking queue holding at most `buffer` items.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is zero; [`crate::config::ChannelBuffer`] rejects
    /// that at startup.
    pub fn new(buffer: usize) -> Self {
        Self::with_policy(buffer, OverflowPolicy::Block)
    }

    pub fn with_policy(buffer: usize, policy: OverflowPolicy) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            sender,
            policy,
        }
    }

    fn try_send(&self, work: T, operation: &str) -> Result<(), (QueueError, Option<T>)> {
        self.sender.try_send(work).map_err(|e| match e {
            mpsc::error::TrySendError::Full(work) => (
                QueueError::CapacityExceeded {
                    queue_type: "mpsc".to_string(),
                    capacity: self.sender.max_capacity(),
                },
                Some(work),
            ),
            mpsc::error::TrySendError::Closed(_) => (
                QueueError::MpscOperationFailed {
                    operation: operation.to_string(),
                    details: "Channel closed".to_string(),
                },
                None,
            ),
        })
    }
}

#[async_trait]
impl<T> QueueAdapter<T> for MpscQueueAdapter<T>
where
    T: Send + Sync + 'static,
{
    async fn pull(&self) -> Option<T> {
        let mut receiver = self.receiver.lock().await;
        let result = receiver.recv().await;
        trace!(has_item = result.is_some(), "Pulled item from MPSC queue");
        result
    }

    async fn push(&self, work: T) -> Result<()> {
        self.sender
            .send(work)
            .await
            .map_err(|e| QueueError::MpscOperationFailed {
                operation: "send".to_string(),
                details: e.to_string(),
            })?;
        trace!("Pushed item to MPSC queue");
        Ok(())
    }

    async fn offer(&self, work: T) -> Result<Offer> {
        match self.policy {
            OverflowPolicy::Block => {
                self.push(work).await?;
                Ok(Offer::Accepted)
            }
            OverflowPolicy::DropNewest => match self.try_send(work, "offer") {
                Ok(()) => Ok(Offer::Accepted),
                Err((QueueError::CapacityExceeded { capacity, .. }, Some(_dropped))) => {
                    trace!(capacity, "MPSC queue full, dropped newest item");
                    Ok(Offer::Dropped)
                }
                Err((e, _)) => Err(e.into()),
            },
        }
    }

    async fn depth(&self) -> Option<usize> {
        Some(self.sender.max_capacity() - self.sender.capacity())
    }
}

impl<T> Clone for MpscQueueAdapter<T>
where
    T: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            sender: self.sender.clone(),
            policy: self.policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let adapter = MpscQueueAdapter::<i32>::new(10);
        for i in 0..5 {
            adapter.push(i).await.unwrap();
        }
        for expected in 0..5 {
            assert_eq!(adapter.pull().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_drop_newest_keeps_existing_items() {
        let adapter = MpscQueueAdapter::<i32>::with_policy(2, OverflowPolicy::DropNewest);

        assert_eq!(adapter.offer(1).await.unwrap(), Offer::Accepted);
        assert_eq!(adapter.offer(2).await.unwrap(), Offer::Accepted);
        assert_eq!(adapter.offer(3).await.unwrap(), Offer::Dropped);
        assert_eq!(adapter.depth().await, Some(2));

        assert_eq!(adapter.pull().await, Some(1));
        assert_eq!(adapter.pull().await, Some(2));
        assert_eq!(adapter.offer(4).await.unwrap(), Offer::Accepted);
        assert_eq!(adapter.pull().await, Some(4));
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_space() {
        let adapter = Arc::new(MpscQueueAdapter::<i32>::with_policy(1, OverflowPolicy::Block));
        assert_eq!(adapter.offer(1).await.unwrap(), Offer::Accepted);

        let producer = adapter.clone();
        let handle = tokio::spawn(async move { producer.offer(2).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        assert_eq!(adapter.pull().await, Some(1));
        assert_eq!(handle.await.unwrap(), Offer::Accepted);
        assert_eq!(adapter.pull().await, Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let adapter = Arc::new(MpscQueueAdapter::<i32>::new(100));
        let mut handles = vec![];
        for i in 0..10 {
            let queue = adapter.clone();
            handles.push(tokio::spawn(async move {
                queue.push(i).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut items = vec![];
        for _ in 0..10 {
            items.push(adapter.pull().await.unwrap());
        }
        items.sort();
        assert_eq!(items, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_depth_tracking() {
        let adapter = MpscQueueAdapter::<i32>::new(10);
        assert_eq!(adapter.depth().await, Some(0));
        for i in 0..5 {
            adapter.push(i).await.unwrap();
        }
        assert_eq!(adapter.depth().await, Some(5));
        adapter.pull().await;
        assert_eq!(adapter.depth().await, Some(4));
    }
}
