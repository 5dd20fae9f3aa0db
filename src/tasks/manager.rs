//! Spawn helpers for long-running loops.
//!
//! Every loop is spawned onto a [`TaskTracker`] so its owner can wait for it
//! to drain, and logs its start and end with the task name. A loop that
//! returns an error cancels the token it was given. For per-node loops that is
//! the ingester's own token, so one failing node never stops the process.

use std::future::Future;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

/// Spawn a named loop that cancels `scope_token` if it fails.
pub fn spawn_managed_task<F>(
    tracker: &TaskTracker,
    scope_token: CancellationToken,
    task_name: &'static str,
    task_future: F,
) where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    info!(task = task_name, "Starting background task");

    tracker.spawn(async move {
        match task_future.await {
            Ok(()) => {
                info!(task = task_name, "Background task completed successfully");
            }
            Err(e) => {
                error!(task = task_name, error = ?e, "Background task failed unexpectedly");
                scope_token.cancel();
            }
        }
    });
}

/// Spawn a loop built from the token it should observe.
///
/// The loop is raced against the token, so it is dropped at its next
/// suspension point once the token is cancelled even if it never checks.
pub fn spawn_cancellable_task<F, Fut>(
    tracker: &TaskTracker,
    scope_token: CancellationToken,
    task_name: &'static str,
    task_builder: F,
) where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    info!(task = task_name, "Starting cancellable background task");

    let cancel_token = scope_token.clone();

    tracker.spawn(async move {
        tokio::select! {
            result = task_builder(cancel_token) => {
                match result {
                    Ok(()) => {
                        info!(task = task_name, "Background task completed successfully");
                    }
                    Err(e) => {
                        error!(task = task_name, error = ?e, "Background task failed unexpectedly");
                        scope_token.cancel();
                    }
                }
            }
            () = scope_token.cancelled() => {
                info!(task = task_name, "Background task shutting down gracefully");
            }
        }
    });
}
