//! Service configuration
//!
//! Loaded from environment variables, optionally layered over a TOML file:
//!
//! - `REDIS_URL`: store URL, `redis://[:password@]host[:port][/db]` (required)
//! - `PORT`: HTTP listen port (default: 5000)
//! - `BIND_ADDR`: HTTP listen address (default: 0.0.0.0)
//! - `COALESCE_PREFIX`: store namespace prefix (default: `coalesce.v1.`)
//! - `REDIS_TIMEOUT_MS`: per-command store timeout, 0 disables (default: none)
//! - `LOG_FORMAT`: `text` or `json` (default: text)
//! - `COALESCE_CONFIG`: path to a TOML file with the same settings
//!
//! Environment variables always win over the file.

use crate::error::ConfigError;
use crate::store::RedisUrl;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PREFIX: &str = "coalesce.v1.";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Settings accepted in the TOML file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub redis_url: Option<String>,
    pub prefix: Option<String>,
    pub bind_addr: Option<IpAddr>,
    pub port: Option<u16>,
    #[serde(with = "duration_millis")]
    pub redis_timeout: Option<Duration>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Fully resolved configuration for the HTTP service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub redis_url: RedisUrl,
    pub prefix: String,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub redis_timeout: Option<Duration>,
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(FileConfig::default(), env_var)
    }

    /// Load the file named by `COALESCE_CONFIG` (if set), then apply the
    /// environment on top.
    pub fn load() -> Result<Self, ConfigError> {
        match env_var("COALESCE_CONFIG") {
            Some(path) => Self::resolve(FileConfig::from_file(Path::new(&path))?, env_var),
            None => Self::from_env(),
        }
    }

    /// Merge `file` with variables read through `lookup`.
    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("REDIS_URL")
            .or(file.redis_url)
            .ok_or(ConfigError::MissingVar("REDIS_URL"))?;
        let redis_url = RedisUrl::parse(&raw_url)?;

        let port = match lookup("PORT") {
            Some(v) => parse_var("PORT", &v)?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let bind_addr = match lookup("BIND_ADDR") {
            Some(v) => parse_var("BIND_ADDR", &v)?,
            None => file.bind_addr.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        };

        let redis_timeout = match lookup("REDIS_TIMEOUT_MS") {
            Some(v) => Some(Duration::from_millis(parse_var("REDIS_TIMEOUT_MS", &v)?)),
            None => file.redis_timeout,
        }
        .filter(|d| !d.is_zero());

        let log_format = match lookup("LOG_FORMAT") {
            Some(v) => LogFormat::parse(&v).ok_or_else(|| ConfigError::InvalidVar {
                name: "LOG_FORMAT",
                reason: format!("expected \"text\" or \"json\", got {:?}", v),
            })?,
            None => file.log_format.unwrap_or_default(),
        };

        Ok(ServiceConfig {
            redis_url,
            prefix: lookup("COALESCE_PREFIX")
                .or(file.prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            bind_addr,
            port,
            redis_timeout,
            log_format,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
        name,
        reason: e.to_string(),
    })
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
