//! Memcache text-protocol broker client.
//!
//! Queue servers in front of the status stream expose their queues through
//! the memcache `get` command: every `get <key>` pops one item. Only the
//! subset of the protocol needed for that is implemented:
//!
//! ```text
//! > get <key>\r\n
//! < VALUE <key> <flags> <bytes>[ <cas>]\r\n<data>\r\nEND\r\n
//! < END\r\n                                  (queue empty)
//! ```
//!
//! One connection is kept per node. Any I/O error, protocol error or timeout
//! drops it, and the next read reconnects.

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{BrokerClient, BrokerConnector};
use crate::errors::BrokerError;

const MAX_KEY_LENGTH: usize = 250;

/// Largest value accepted from a broker. Anything bigger is treated as a
/// corrupt reply rather than allocated.
const MAX_VALUE_BYTES: usize = 16 * 1024 * 1024;

type Connection = BufStream<TcpStream>;

/// Broker client for one node, speaking the memcache text protocol.
pub struct MemcacheBrokerClient {
    address: String,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl MemcacheBrokerClient {
    /// Create a client for `address` (`host:port`). No connection is opened
    /// until the first read.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            connection: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Connection, BrokerError> {
        debug!(broker = %self.address, "Opening broker connection");
        let stream = TcpStream::connect(&self.address).await.map_err(|source| {
            BrokerError::ConnectionFailed {
                address: self.address.clone(),
                source,
            }
        })?;
        stream.set_nodelay(true).map_err(|source| self.io_error(source))?;
        Ok(BufStream::new(stream))
    }

    fn io_error(&self, source: std::io::Error) -> BrokerError {
        BrokerError::Io {
            address: self.address.clone(),
            source,
        }
    }

    /// Issue one `get` and read the reply. Hands the connection back on
    /// success so it can be reused; `None` means the queue was empty.
    async fn round_trip(
        &self,
        connection: Option<Connection>,
        key: &str,
    ) -> Result<(Connection, Option<Vec<u8>>), BrokerError> {
        let mut conn = match connection {
            Some(conn) => conn,
            None => self.connect().await?,
        };

        conn.write_all(format!("get {}\r\n", key).as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        conn.flush().await.map_err(|e| self.io_error(e))?;

        let header = read_line(&mut conn).await.map_err(|e| self.io_error(e))?;
        if header == "END" {
            return Ok((conn, None));
        }

        let length = parse_value_header(&header, key)?;
        let block = length.checked_add(2).ok_or_else(|| BrokerError::Protocol {
            details: format!("value length overflows in {:?}", header),
        })?;
        let mut data = vec![0u8; block];
        conn.read_exact(&mut data)
            .await
            .map_err(|e| self.io_error(e))?;
        if !data.ends_with(b"\r\n") {
            return Err(BrokerError::Protocol {
                details: "value block not terminated by CRLF".to_string(),
            });
        }
        data.truncate(length);

        let trailer = read_line(&mut conn).await.map_err(|e| self.io_error(e))?;
        if trailer != "END" {
            return Err(BrokerError::Protocol {
                details: format!("expected END, got {:?}", trailer),
            });
        }

        trace!(broker = %self.address, bytes = length, "Read value from broker");
        Ok((conn, Some(data)))
    }
}

#[async_trait]
impl BrokerClient for MemcacheBrokerClient {
    async fn get(&self, key: &str) -> Result<Vec<u8>, BrokerError> {
        validate_key(key)?;

        let mut slot = self.connection.lock().await;
        let connection = slot.take();

        match tokio::time::timeout(self.timeout, self.round_trip(connection, key)).await {
            Ok(Ok((conn, value))) => {
                *slot = Some(conn);
                value.ok_or_else(|| BrokerError::Miss {
                    key: key.to_string(),
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BrokerError::Timeout {
                address: self.address.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// Creates memcache clients for discovered node addresses on a fixed port.
#[derive(Debug, Clone)]
pub struct MemcacheConnector {
    port: u16,
    timeout: Duration,
}

impl MemcacheConnector {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Joins a resolved host with the broker port, bracketing IPv6 literals.
    pub fn node_address(&self, host: &str) -> String {
        match host.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", host, self.port),
        }
    }
}

impl BrokerConnector for MemcacheConnector {
    fn connect(&self, address: &str) -> Arc<dyn BrokerClient> {
        Arc::new(MemcacheBrokerClient::new(
            self.node_address(address),
            self.timeout,
        ))
    }
}

fn validate_key(key: &str) -> Result<(), BrokerError> {
    if key.is_empty()
        || key.len() > MAX_KEY_LENGTH
        || key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control())
    {
        return Err(BrokerError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Reads one CRLF-terminated line, without the terminator.
async fn read_line(conn: &mut Connection) -> std::io::Result<String> {
    let mut line = Vec::new();
    let read = conn.read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "broker closed the connection",
        ));
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Parses `VALUE <key> <flags> <bytes>[ <cas>]` and returns `<bytes>`,
/// which is at most [`MAX_VALUE_BYTES`].
fn parse_value_header(header: &str, key: &str) -> Result<usize, BrokerError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("VALUE"), Some(returned_key), Some(_flags), Some(length)) if returned_key == key => {
            let length = length.parse::<usize>().map_err(|_| BrokerError::Protocol {
                details: format!("invalid value length in {:?}", header),
            })?;
            if length > MAX_VALUE_BYTES {
                return Err(BrokerError::Protocol {
                    details: format!(
                        "value length {} exceeds limit of {} bytes",
                        length, MAX_VALUE_BYTES
                    ),
                });
            }
            Ok(length)
        }
        _ => Err(BrokerError::Protocol {
            details: format!("unexpected reply {:?}", header),
        }),
    }
}
