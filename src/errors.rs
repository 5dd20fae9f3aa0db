use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error-ingest-config-1 Required environment variable not set: {var_name}")]
    EnvVarRequired { var_name: String },

    #[error("error-ingest-config-2 Version not available")]
    VersionNotAvailable,

    #[error("error-ingest-config-3 Invalid port number: {port}")]
    InvalidPortNumber { port: String },

    #[error("error-ingest-config-4 Invalid value for {var_name}: {details}")]
    InvalidValue { var_name: String, details: String },

    #[error("error-ingest-config-5 Invalid timeout value: {value}")]
    InvalidTimeout { value: String },

    #[error("error-ingest-config-6 Invalid URL for {var_name}: {url}: {details}")]
    InvalidUrl {
        var_name: String,
        url: String,
        details: String,
    },
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("error-ingest-broker-1 Connection to {address} failed: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error-ingest-broker-2 I/O failed on {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error-ingest-broker-3 Read from {address} timed out after {timeout_ms}ms")]
    Timeout { address: String, timeout_ms: u64 },

    #[error("error-ingest-broker-4 No value available for key: {key}")]
    Miss { key: String },

    #[error("error-ingest-broker-5 Unexpected broker response: {details}")]
    Protocol { details: String },

    #[error("error-ingest-broker-6 Invalid key: {key}")]
    InvalidKey { key: String },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("error-ingest-decode-1 Message batch decoding failed: {source}")]
    Batch {
        #[source]
        source: prost::DecodeError,
    },

    #[error("error-ingest-decode-2 Envelope decoding failed: {source}")]
    Envelope {
        #[source]
        source: prost::DecodeError,
    },

    #[error("error-ingest-decode-3 Status decoding failed: {source}")]
    Status {
        #[source]
        source: prost::DecodeError,
    },

    #[error("error-ingest-decode-4 Status has no author: mid={message_id}")]
    MissingAuthor { message_id: u64 },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("error-ingest-publish-1 Long-text fetch failed: {0}")]
    FetchFailed(#[source] reqwest::Error),

    #[error("error-ingest-publish-2 Long-text fetch returned status {status_code}")]
    FetchStatus { status_code: u16 },

    #[error("error-ingest-publish-3 Long-text response decoding failed: {0}")]
    FetchDecode(#[source] serde_json::Error),

    #[error("error-ingest-publish-4 Post request failed: {0}")]
    PostFailed(#[source] reqwest::Error),

    #[error("error-ingest-publish-5 Post returned status {status_code}")]
    PostStatus { status_code: u16 },

    #[error("error-ingest-publish-6 HTTP client creation failed: {0}")]
    ClientCreationFailed(#[source] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("error-ingest-queue-1 MPSC queue operation failed: {operation}: {details}")]
    MpscOperationFailed { operation: String, details: String },

    #[error("error-ingest-queue-2 Queue capacity exceeded: {queue_type}: {capacity}")]
    CapacityExceeded { queue_type: String, capacity: usize },
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("error-ingest-resolve-1 Hostname resolution failed: {hostname}: {source}")]
    LookupFailed {
        hostname: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error-ingest-resolve-2 Hostname resolved to no addresses: {hostname}")]
    NoAddresses { hostname: String },
}

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("error-ingest-metrics-1 Failed to create metrics publisher: {0}")]
    CreationFailed(String),

    #[error("error-ingest-metrics-2 Invalid metrics configuration: {0}")]
    InvalidConfig(String),
}
