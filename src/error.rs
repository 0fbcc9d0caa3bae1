//! Error types shared across the crate.
//!
//! - `StoreError`: a store operation failed (network, protocol, server reply)
//! - `ConfigError`: startup configuration is missing or malformed

use std::io::Error as IoError;
use std::time::Duration;

/// Error returned by every `Store` operation.
///
/// The coalescer never retries: whatever the store returns is handed back
/// to the caller unchanged.
#[derive(Debug)]
pub enum StoreError {
    /// Socket-level failure talking to the store
    Io(IoError),
    /// The store sent bytes that are not valid RESP
    Protocol(String),
    /// The store replied with an error (e.g. `WRONGTYPE ...`)
    Server(String),
    /// No reply within the configured command timeout
    Timeout(Duration),
    /// The connection was closed before a reply arrived
    ConnectionClosed,
    /// Fault injected by `SimulatedStore`
    Injected(&'static str),
}

impl StoreError {
    pub fn wrong_type() -> Self {
        StoreError::Server(
            "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
        )
    }

    /// Whether the connection that produced this error must be discarded.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_)
                | StoreError::Protocol(_)
                | StoreError::Timeout(_)
                | StoreError::ConnectionClosed
        )
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store I/O error: {}", e),
            StoreError::Protocol(msg) => write!(f, "store protocol error: {}", msg),
            StoreError::Server(msg) => write!(f, "store replied with error: {}", msg),
            StoreError::Timeout(d) => write!(f, "store command timed out after {:?}", d),
            StoreError::ConnectionClosed => write!(f, "store connection closed"),
            StoreError::Injected(fault) => write!(f, "injected store fault: {}", fault),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for StoreError {
    fn from(e: IoError) -> Self {
        StoreError::Io(e)
    }
}

/// Error raised while loading `ServiceConfig`. Always fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is not set
    MissingVar(&'static str),
    /// An environment variable is set but cannot be parsed
    InvalidVar { name: &'static str, reason: String },
    /// The store URL is malformed or uses an unsupported scheme
    InvalidUrl(String),
    /// The config file could not be read
    Io(IoError),
    /// The config file is not valid TOML for `ServiceConfig`
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(name) => {
                write!(f, "required environment variable {} is not set", name)
            }
            ConfigError::InvalidVar { name, reason } => {
                write!(f, "invalid value for {}: {}", name, reason)
            }
            ConfigError::InvalidUrl(msg) => write!(f, "invalid store URL: {}", msg),
            ConfigError::Io(e) => write!(f, "failed to read config file: {}", e),
            ConfigError::Parse(msg) => write!(f, "failed to parse config file: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<IoError> for ConfigError {
    fn from(e: IoError) -> Self {
        ConfigError::Io(e)
    }
}
