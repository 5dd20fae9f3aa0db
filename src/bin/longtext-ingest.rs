use anyhow::Result;
use longtext_ingest::{
    broker::MemcacheConnector,
    config::Config,
    discovery::DnsResolver,
    ingester::IngesterSettings,
    metrics::create_metrics_publisher,
    publisher::{HttpLongTextPublisher, build_http_client},
    tasks::manager::{spawn_cancellable_task, spawn_managed_task},
    watcher::{ConfigWatcher, DefaultIngesterFactory},
};
use std::{env, sync::Arc};
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let version = longtext_ingest::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    let config = Config::new()?;

    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "longtext_ingest=info".into()),
    );

    let fmt_layer = if std::env::var("JSON_LOGS").is_ok() {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!(
        version = %version,
        broker_hostname = %config.broker.hostname,
        broker_port = *config.broker.port.as_ref(),
        "Starting longtext-ingest"
    );

    let metrics = create_metrics_publisher(
        &config.metrics.adapter,
        config.metrics.statsd_host.as_deref(),
        &config.metrics.prefix,
        &config.metrics.statsd_bind,
        config.metrics.tags.as_deref(),
    )?;

    let http_client = Arc::new(build_http_client(&config.http_client)?);
    let publisher = Arc::new(HttpLongTextPublisher::new(http_client, &config.longtext));
    let connector = Arc::new(MemcacheConnector::new(
        *config.broker.port.as_ref(),
        *config.broker.timeout.as_ref(),
    ));

    let factory = DefaultIngesterFactory::new(
        IngesterSettings {
            key: config.broker.key.clone(),
            channel_buffer: *config.ingest.channel_buffer.as_ref(),
            max_retries: config.ingest.max_retries,
        },
        *config.ingest.rate_limit.as_ref(),
        connector,
        publisher,
        metrics.clone(),
    );

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let watcher = ConfigWatcher::new(
        config.broker.hostname.clone(),
        Arc::new(DnsResolver::new()),
        Arc::new(factory),
        metrics,
        token.clone(),
    );
    // The watcher observes the token itself so it can close and drain the
    // fleet before returning.
    spawn_managed_task(&tracker, token.clone(), "fleet-watcher", watcher.watch());

    spawn_cancellable_task(&tracker, token.clone(), "signal-handler", |signal_token| async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = terminate => {
                tracing::info!("Received SIGTERM signal, initiating shutdown");
            },
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C signal, initiating shutdown");
            },
        }

        signal_token.cancel();
        Ok(())
    });
    tracker.close();

    tracing::info!("Waiting for all tasks to complete...");
    tracker.wait().await;

    tracing::info!("All tasks completed, application shutting down");
    Ok(())
}
