//! Redis-backed store speaking RESP2 over a single TCP connection.

use super::resp::{RespCodec, RespValue};
use super::{Store, StoreFuture};
use crate::error::{ConfigError, StoreError};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use percent_encoding::percent_decode_str;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

const DEFAULT_REDIS_PORT: u16 = 6379;

/// Connection details parsed from `redis://[:password@]host[:port][/db]`.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisUrl {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
}

impl RedisUrl {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let url = url::Url::parse(input).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

        match url.scheme() {
            "redis" => {}
            "rediss" => {
                return Err(ConfigError::InvalidUrl(
                    "rediss:// (TLS) is not supported".to_string(),
                ))
            }
            other => {
                return Err(ConfigError::InvalidUrl(format!(
                    "unsupported scheme {:?}",
                    other
                )))
            }
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::InvalidUrl("missing host".to_string()))?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_REDIS_PORT);
        // `Url` keeps userinfo percent-encoded
        let password = url
            .password()
            .map(|p| {
                percent_decode_str(p)
                    .decode_utf8()
                    .map(|p| p.into_owned())
                    .map_err(|_| ConfigError::InvalidUrl("password is not valid UTF-8".to_string()))
            })
            .transpose()?;

        let path = url.path().trim_start_matches('/');
        let db = if path.is_empty() {
            0
        } else {
            path.parse::<u32>()
                .map_err(|_| ConfigError::InvalidUrl(format!("invalid database {:?}", path)))?
        };

        Ok(RedisUrl {
            host,
            port,
            password,
            db,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for RedisUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisUrl")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .finish()
    }
}

type Connection = Framed<TcpStream, RespCodec>;

/// Store backed by a Redis server.
///
/// Commands are serialized over one lazily opened connection. A transport
/// or protocol failure, or a command cancelled before its reply arrived,
/// drops the connection; the next command reconnects. The failed command
/// itself is never retried.
pub struct RespStore {
    url: RedisUrl,
    timeout: Option<Duration>,
    conn: Mutex<Option<Connection>>,
}

impl RespStore {
    pub fn new(url: RedisUrl) -> Self {
        RespStore {
            url,
            timeout: None,
            conn: Mutex::new(None),
        }
    }

    /// Fail commands that get no reply within `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn connect(&self) -> Result<Connection, StoreError> {
        let stream = TcpStream::connect(self.url.addr()).await?;
        stream.set_nodelay(true)?;
        let mut conn = Framed::new(stream, RespCodec);

        if let Some(password) = &self.url.password {
            expect_ok(round_trip(&mut conn, RespValue::command(["AUTH", password.as_str()])).await?)?;
        }
        if self.url.db != 0 {
            let db = self.url.db.to_string();
            expect_ok(round_trip(&mut conn, RespValue::command(["SELECT", db.as_str()])).await?)?;
        }

        info!(addr = %self.url.addr(), db = self.url.db, "Connected to store");
        Ok(conn)
    }

    async fn execute(&self, parts: &[&str]) -> Result<RespValue, StoreError> {
        let mut guard = self.conn.lock().await;

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute_locked(&mut guard, parts))
                .await
                .unwrap_or(Err(StoreError::Timeout(limit))),
            None => self.execute_locked(&mut guard, parts).await,
        };

        match result {
            Ok(RespValue::Error(msg)) => Err(StoreError::Server(
                String::from_utf8_lossy(&msg).into_owned(),
            )),
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_connection_fatal() {
                    warn!(command = parts[0], error = %e, "Dropped store connection");
                }
                Err(e)
            }
        }
    }

    /// The connection is out of `slot` while a command is in flight and
    /// only goes back once its reply has been read. If this future is
    /// dropped mid-command, the connection (and its unread reply) is dropped
    /// with it and the next command reconnects.
    async fn execute_locked(
        &self,
        slot: &mut Option<Connection>,
        parts: &[&str],
    ) -> Result<RespValue, StoreError> {
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect().await?,
        };
        debug!(command = parts[0], "Sending store command");
        let reply = round_trip(&mut conn, RespValue::command(parts.iter().copied())).await?;
        *slot = Some(conn);
        Ok(reply)
    }
}

async fn round_trip(conn: &mut Connection, command: RespValue) -> Result<RespValue, StoreError> {
    conn.send(command).await?;
    match conn.next().await {
        Some(reply) => reply,
        None => Err(StoreError::ConnectionClosed),
    }
}

fn expect_ok(reply: RespValue) -> Result<(), StoreError> {
    match reply {
        RespValue::SimpleString(_) => Ok(()),
        RespValue::Error(msg) => Err(StoreError::Server(
            String::from_utf8_lossy(&msg).into_owned(),
        )),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(reply: &RespValue) -> StoreError {
    StoreError::Protocol(format!("unexpected reply: {:?}", reply))
}

fn as_integer(reply: RespValue) -> Result<i64, StoreError> {
    match reply {
        RespValue::Integer(n) => Ok(n),
        other => Err(unexpected(&other)),
    }
}

fn as_count(reply: RespValue) -> Result<usize, StoreError> {
    let n = as_integer(reply)?;
    usize::try_from(n).map_err(|_| StoreError::Protocol(format!("negative count {}", n)))
}

fn bytes_to_string(data: Bytes) -> String {
    String::from_utf8_lossy(&data).into_owned()
}

fn as_strings(reply: RespValue) -> Result<Vec<String>, StoreError> {
    match reply {
        RespValue::Array(Some(items)) => items
            .into_iter()
            .map(|item| match item {
                RespValue::BulkString(Some(data)) => Ok(bytes_to_string(data)),
                other => Err(unexpected(&other)),
            })
            .collect(),
        RespValue::Array(None) => Ok(Vec::new()),
        other => Err(unexpected(&other)),
    }
}

fn as_pairs(reply: RespValue) -> Result<Vec<(String, String)>, StoreError> {
    let flat = as_strings(reply)?;
    if flat.len() % 2 != 0 {
        return Err(StoreError::Protocol(
            "HGETALL reply has an odd number of elements".to_string(),
        ));
    }
    let mut pairs = Vec::with_capacity(flat.len() / 2);
    let mut iter = flat.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((field, value));
    }
    Ok(pairs)
}

impl Store for RespStore {
    fn lpush<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move { as_count(self.execute(&["LPUSH", key, value]).await?) })
    }

    fn lrem<'a>(&'a self, key: &'a str, count: i64, value: &'a str) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            let count = count.to_string();
            as_count(self.execute(&["LREM", key, count.as_str(), value]).await?)
        })
    }

    fn lrange<'a>(
        &'a self,
        key: &'a str,
        start: isize,
        stop: isize,
    ) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let (start, stop) = (start.to_string(), stop.to_string());
            as_strings(self.execute(&["LRANGE", key, start.as_str(), stop.as_str()]).await?)
        })
    }

    fn sadd<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(as_integer(self.execute(&["SADD", key, member]).await?)? == 1) })
    }

    fn srem<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(as_integer(self.execute(&["SREM", key, member]).await?)? == 1) })
    }

    fn smembers<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move { as_strings(self.execute(&["SMEMBERS", key]).await?) })
    }

    fn hincrby<'a>(&'a self, key: &'a str, field: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            let delta = delta.to_string();
            as_integer(self.execute(&["HINCRBY", key, field, delta.as_str()]).await?)
        })
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<(String, String)>> {
        Box::pin(async move { as_pairs(self.execute(&["HGETALL", key]).await?) })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { expect_ok(self.execute(&["PING"]).await?) })
    }
}
