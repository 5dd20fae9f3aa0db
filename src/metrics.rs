//! Pipeline metrics.
//!
//! Loops publish through the [`MetricsPublisher`] trait. The binary picks the
//! implementation from `METRICS_ADAPTER`: `noop` (default) or `statsd`.

use async_trait::async_trait;
use cadence::{
    BufferedUdpMetricSink, Counted, CountedExt, Gauged, Metric, MetricBuilder, QueuingMetricSink,
    StatsdClient, Timed,
};
use std::net::UdpSocket;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::MetricsError;

/// Metric keys emitted by the pipeline.
pub mod names {
    pub const BATCHES_READ: &str = "ingest.batches.read";
    pub const BROKER_ERRORS: &str = "ingest.broker.errors";
    pub const EVENTS_SKIPPED: &str = "ingest.events.skipped";
    pub const EVENTS_QUALIFIED: &str = "ingest.events.qualified";
    pub const PUBLISH_SUCCEEDED: &str = "ingest.publish.succeeded";
    pub const PUBLISH_FAILED: &str = "ingest.publish.failed";
    pub const PUBLISH_DURATION: &str = "ingest.publish.duration";
    pub const RETRY_ENQUEUED: &str = "ingest.retry.enqueued";
    pub const RETRY_DROPPED: &str = "ingest.retry.dropped";
    pub const RETRY_EXHAUSTED: &str = "ingest.retry.exhausted";
    pub const FLEET_SIZE: &str = "ingest.fleet.size";
}

#[async_trait]
pub trait MetricsPublisher: Send + Sync {
    /// Increment a counter with tags
    async fn incr_with_tags(&self, key: &str, tags: &[(&str, &str)]);

    /// Add `value` to a counter, with tags
    async fn count_with_tags(&self, key: &str, value: u64, tags: &[(&str, &str)]);

    /// Record a gauge value
    async fn gauge(&self, key: &str, value: u64);

    /// Record a timing in milliseconds, with tags
    async fn time_with_tags(&self, key: &str, millis: u64, tags: &[(&str, &str)]);
}

#[derive(Debug, Clone, Default)]
pub struct NoOpMetricsPublisher;

impl NoOpMetricsPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsPublisher for NoOpMetricsPublisher {
    async fn incr_with_tags(&self, _key: &str, _tags: &[(&str, &str)]) {}
    async fn count_with_tags(&self, _key: &str, _value: u64, _tags: &[(&str, &str)]) {}
    async fn gauge(&self, _key: &str, _value: u64) {}
    async fn time_with_tags(&self, _key: &str, _millis: u64, _tags: &[(&str, &str)]) {}
}

/// Statsd-backed metrics publisher using cadence
pub struct StatsdMetricsPublisher {
    client: StatsdClient,
    default_tags: Vec<(String, String)>,
}

impl StatsdMetricsPublisher {
    pub fn new(
        host: &str,
        prefix: &str,
        bind_addr: &str,
        default_tags: Vec<(String, String)>,
    ) -> Result<Self, MetricsError> {
        info!(
            host,
            prefix,
            bind = bind_addr,
            tags = ?default_tags,
            "Creating statsd metrics publisher"
        );

        let creation_failed = |e: std::io::Error| MetricsError::CreationFailed(e.to_string());
        let socket = UdpSocket::bind(bind_addr).map_err(creation_failed)?;
        socket.set_nonblocking(true).map_err(creation_failed)?;

        let buffered_sink = BufferedUdpMetricSink::from(host, socket)
            .map_err(|e| MetricsError::CreationFailed(e.to_string()))?;
        let queuing_sink = QueuingMetricSink::builder()
            .with_error_handler(move |error| {
                error!("Failed to send metric via sink: {}", error);
            })
            .build(buffered_sink);

        Ok(Self {
            client: StatsdClient::from_sink(prefix, queuing_sink),
            default_tags,
        })
    }

    fn with_tags<'a, M>(
        &'a self,
        mut builder: MetricBuilder<'a, 'a, M>,
        tags: &'a [(&'a str, &'a str)],
    ) -> MetricBuilder<'a, 'a, M>
    where
        M: Metric + From<String>,
    {
        for (k, v) in &self.default_tags {
            builder = builder.with_tag(k.as_str(), v.as_str());
        }
        for (k, v) in tags {
            builder = builder.with_tag(k, v);
        }
        builder
    }
}

#[async_trait]
impl MetricsPublisher for StatsdMetricsPublisher {
    async fn incr_with_tags(&self, key: &str, tags: &[(&str, &str)]) {
        if let Err(e) = self.with_tags(self.client.incr_with_tags(key), tags).try_send() {
            debug!("Failed to send metric {}: {}", key, e);
        }
    }

    async fn count_with_tags(&self, key: &str, value: u64, tags: &[(&str, &str)]) {
        if let Err(e) = self
            .with_tags(self.client.count_with_tags(key, value), tags)
            .try_send()
        {
            debug!("Failed to send count {} = {}: {}", key, value, e);
        }
    }

    async fn gauge(&self, key: &str, value: u64) {
        if let Err(e) = self
            .with_tags(self.client.gauge_with_tags(key, value), &[])
            .try_send()
        {
            debug!("Failed to send gauge {} = {}: {}", key, value, e);
        }
    }

    async fn time_with_tags(&self, key: &str, millis: u64, tags: &[(&str, &str)]) {
        if let Err(e) = self
            .with_tags(self.client.time_with_tags(key, millis), tags)
            .try_send()
        {
            debug!("Failed to send timing {}: {}", key, e);
        }
    }
}

pub type SharedMetricsPublisher = Arc<dyn MetricsPublisher>;

/// Create a metrics publisher for the configured adapter.
pub fn create_metrics_publisher(
    metrics_adapter: &str,
    metrics_statsd_host: Option<&str>,
    metrics_prefix: &str,
    metrics_statsd_bind: &str,
    metrics_tags: Option<&str>,
) -> Result<SharedMetricsPublisher, MetricsError> {
    match metrics_adapter {
        "noop" | "" => Ok(Arc::new(NoOpMetricsPublisher::new())),
        "statsd" => {
            let host = metrics_statsd_host.ok_or_else(|| {
                MetricsError::InvalidConfig(
                    "METRICS_STATSD_HOST is required when using statsd adapter".to_string(),
                )
            })?;
            let default_tags = metrics_tags.map(parse_tags).unwrap_or_default();
            let publisher =
                StatsdMetricsPublisher::new(host, metrics_prefix, metrics_statsd_bind, default_tags)?;
            Ok(Arc::new(publisher))
        }
        _ => Err(MetricsError::InvalidConfig(format!(
            "Unknown metrics adapter: {}",
            metrics_adapter
        ))),
    }
}

/// Parses comma-separated `key:value` pairs, skipping malformed entries.
fn parse_tags(tags: &str) -> Vec<(String, String)> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .filter_map(|tag| match tag.split_once(':') {
            Some((k, v)) if !k.is_empty() && !v.contains(':') => {
                Some((k.to_string(), v.to_string()))
            }
            _ => {
                warn!("Invalid tag format: {}", tag);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_metrics() {
        let metrics = NoOpMetricsPublisher::new();
        metrics
            .count_with_tags(names::EVENTS_SKIPPED, 4, &[("node", "10.0.0.1")])
            .await;
        metrics
            .incr_with_tags(names::RETRY_DROPPED, &[("node", "10.0.0.1")])
            .await;
        metrics.gauge(names::FLEET_SIZE, 3).await;
        metrics
            .time_with_tags(names::PUBLISH_DURATION, 12, &[("node", "10.0.0.1")])
            .await;
    }

    #[test]
    fn test_create_noop_publisher() {
        assert!(create_metrics_publisher("noop", None, "longtext_ingest", "[::]:0", None).is_ok());
        assert!(create_metrics_publisher("", None, "longtext_ingest", "[::]:0", None).is_ok());
    }

    #[test]
    fn test_missing_statsd_host() {
        let result = create_metrics_publisher("statsd", None, "longtext_ingest", "[::]:0", None);
        assert!(matches!(result, Err(MetricsError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_adapter() {
        let result = create_metrics_publisher("prometheus", None, "longtext_ingest", "[::]:0", None);
        assert!(matches!(result, Err(MetricsError::InvalidConfig(_))));
    }

    #[test]
    fn test_create_statsd_publisher() {
        let result = create_metrics_publisher(
            "statsd",
            Some("127.0.0.1:8125"),
            "longtext_ingest",
            "127.0.0.1:0",
            Some("env:test,region:eu"),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(
            parse_tags("env:prod, region:eu ,bad,also:bad:tag,"),
            vec![
                ("env".to_string(), "prod".to_string()),
                ("region".to_string(), "eu".to_string()),
            ]
        );
    }
}
