use crate::errors::ConfigError;
use std::num::NonZeroU32;
use std::time::Duration;

type Result<T> = std::result::Result<T, ConfigError>;

/// Broker node port configuration.
///
/// Every address the broker hostname resolves to is dialed on this port.
#[derive(Clone, Debug)]
pub struct BrokerPort(u16);

/// Per-node read rate limit.
///
/// Number of broker reads allowed per second for a single node. The same
/// value is used as the bucket capacity, so a node may burst up to one
/// second's worth of reads after being idle.
#[derive(Clone, Debug)]
pub struct RateLimit(NonZeroU32);

impl Default for RateLimit {
    fn default() -> Self {
        Self(NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN))
    }
}

/// Capacity of the per-node handler and retry channels.
#[derive(Clone, Debug)]
pub struct ChannelBuffer(usize);

impl Default for ChannelBuffer {
    fn default() -> Self {
        Self(1000)
    }
}

/// Timeout in whole seconds, used for broker and HTTP client settings.
#[derive(Clone, Debug)]
pub struct TimeoutSeconds(Duration);

/// Broker discovery and read configuration
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Logical hostname resolved to the current set of broker nodes
    pub hostname: String,
    /// Port every broker node listens on
    pub port: BrokerPort,
    /// Queue key read from every node
    pub key: String,
    /// Upper bound on a single broker read
    pub timeout: TimeoutSeconds,
}

/// Per-node pipeline configuration
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub rate_limit: RateLimit,
    pub channel_buffer: ChannelBuffer,
    /// Retry budget given to a task created after a failed first publish
    pub max_retries: u32,
}

/// Long-text fetch and post endpoints
#[derive(Clone)]
pub struct LongTextConfig {
    pub fetch_url: url::Url,
    pub post_url: url::Url,
    /// Sent verbatim as the `Authorization` header on fetch requests
    pub auth: String,
}

impl std::fmt::Debug for LongTextConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongTextConfig")
            .field("fetch_url", &self.fetch_url.as_str())
            .field("post_url", &self.post_url.as_str())
            .field("auth", &"<redacted>")
            .finish()
    }
}

/// Shared HTTP client settings
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    pub timeout: TimeoutSeconds,
    pub connect_timeout: TimeoutSeconds,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
}

/// Metrics publisher settings
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// `noop` or `statsd`
    pub adapter: String,
    pub statsd_host: Option<String>,
    pub statsd_bind: String,
    pub prefix: String,
    pub tags: Option<String>,
}

/// Main configuration structure for the ingest service.
///
/// Built once at startup by [`Config::new`] and handed to the fleet watcher
/// and ingester factory. Nothing reloads it afterwards.
///
/// # Examples
///
/// ```rust,ignore
/// use longtext_ingest::config::Config;
///
/// let config = Config::new()?;
/// println!("Watching broker hostname: {}", config.broker.hostname);
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub broker: BrokerConfig,
    pub ingest: IngestConfig,
    pub longtext: LongTextConfig,
    pub http_client: HttpClientConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Creates a new configuration instance by loading values from environment variables.
    ///
    /// # Required Environment Variables
    ///
    /// - `BROKER_HOSTNAME`: Hostname resolved to the broker fleet
    /// - `BROKER_KEY`: Queue key read from each broker node
    /// - `LONGTEXT_FETCH_URL`: Long-text content endpoint
    /// - `LONGTEXT_POST_URL`: Content post endpoint
    /// - `LONGTEXT_AUTH`: Authorization header value for the fetch endpoint
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or any value
    /// fails to parse or validate.
    pub fn new() -> Result<Self> {
        let version = version()?;

        let broker = BrokerConfig {
            hostname: require_env("BROKER_HOSTNAME")?,
            port: default_env("BROKER_PORT", "22201").try_into()?,
            key: require_env("BROKER_KEY")?,
            timeout: default_env("BROKER_TIMEOUT_SECS", "30").try_into()?,
        };
        if broker.key.is_empty() || broker.key.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                var_name: "BROKER_KEY".to_string(),
                details: "key must be non-empty and contain no whitespace".to_string(),
            });
        }

        let ingest = IngestConfig {
            rate_limit: {
                let env_value = optional_env("INGEST_RATE_LIMIT");
                if env_value.is_empty() {
                    RateLimit::default()
                } else {
                    env_value.try_into()?
                }
            },
            channel_buffer: {
                let env_value = optional_env("INGEST_CHANNEL_BUFFER");
                if env_value.is_empty() {
                    ChannelBuffer::default()
                } else {
                    env_value.try_into()?
                }
            },
            max_retries: parse_env("INGEST_MAX_RETRIES", "3")?,
        };

        let longtext = LongTextConfig {
            fetch_url: require_url("LONGTEXT_FETCH_URL")?,
            post_url: require_url("LONGTEXT_POST_URL")?,
            auth: require_env("LONGTEXT_AUTH")?,
        };

        let default_user_agent = format!("longtext-ingest/{}", version);
        let http_client = HttpClientConfig {
            timeout: default_env("HTTP_CLIENT_TIMEOUT", "10").try_into()?,
            connect_timeout: default_env("HTTP_CONNECT_TIMEOUT", "5").try_into()?,
            pool_max_idle_per_host: parse_env("HTTP_POOL_MAX_IDLE_PER_HOST", "100")?,
            user_agent: default_env("USER_AGENT", &default_user_agent),
        };

        let metrics = MetricsConfig {
            adapter: default_env("METRICS_ADAPTER", "noop").to_lowercase(),
            statsd_host: std::env::var("METRICS_STATSD_HOST").ok(),
            statsd_bind: default_env("METRICS_STATSD_BIND", "[::]:0"),
            prefix: default_env("METRICS_PREFIX", "longtext_ingest"),
            tags: std::env::var("METRICS_TAGS").ok(),
        };

        Ok(Self {
            version,
            broker,
            ingest,
            longtext,
            http_client,
            metrics,
        })
    }
}

/// Retrieves a required environment variable.
fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired {
        var_name: name.to_string(),
    })
}

/// Retrieves an optional environment variable, returning an empty string if not set.
fn optional_env(name: &str) -> String {
    std::env::var(name).unwrap_or("".to_string())
}

/// Retrieves an environment variable with a default value if not set.
fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or(default_value.to_string())
}

fn parse_env<T>(name: &str, default_value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = default_env(name, default_value);
    value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        var_name: name.to_string(),
        details: format!("{}: {}", value, e),
    })
}

fn require_url(name: &str) -> Result<url::Url> {
    let value = require_env(name)?;
    url::Url::parse(&value).map_err(|e| ConfigError::InvalidUrl {
        var_name: name.to_string(),
        url: value.clone(),
        details: e.to_string(),
    })
}

/// Retrieves the service version from compile-time environment variables.
///
/// Prefers `GIT_HASH` and falls back to `CARGO_PKG_VERSION`.
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotAvailable)
}

impl TryFrom<String> for BrokerPort {
    type Error = ConfigError;
    fn try_from(value: String) -> Result<Self> {
        match value.parse::<u16>() {
            Ok(0) | Err(_) => Err(ConfigError::InvalidPortNumber { port: value }),
            Ok(port) => Ok(Self(port)),
        }
    }
}

impl AsRef<u16> for BrokerPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for RateLimit {
    type Error = ConfigError;
    fn try_from(value: String) -> Result<Self> {
        value
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or_else(|| ConfigError::InvalidValue {
                var_name: "INGEST_RATE_LIMIT".to_string(),
                details: format!("rate limit must be a positive integer, got {}", value),
            })
    }
}

impl AsRef<NonZeroU32> for RateLimit {
    fn as_ref(&self) -> &NonZeroU32 {
        &self.0
    }
}

impl TryFrom<String> for ChannelBuffer {
    type Error = ConfigError;
    fn try_from(value: String) -> Result<Self> {
        let size = value
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue {
                var_name: "INGEST_CHANNEL_BUFFER".to_string(),
                details: format!("Invalid channel buffer: {}", value),
            })?;

        if size == 0 {
            return Err(ConfigError::InvalidValue {
                var_name: "INGEST_CHANNEL_BUFFER".to_string(),
                details: "Channel buffer must be greater than 0".to_string(),
            });
        }

        Ok(Self(size))
    }
}

impl AsRef<usize> for ChannelBuffer {
    fn as_ref(&self) -> &usize {
        &self.0
    }
}

impl TryFrom<String> for TimeoutSeconds {
    type Error = ConfigError;
    fn try_from(value: String) -> Result<Self> {
        match value.parse::<u64>() {
            Ok(seconds) if seconds > 0 => Ok(Self(Duration::from_secs(seconds))),
            _ => Err(ConfigError::InvalidTimeout { value }),
        }
    }
}

impl AsRef<Duration> for TimeoutSeconds {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}
