//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use saga::CheckoutConfig;

/// Log output format selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `RPC_TIMEOUT_MS`: bound on ledger, processor and channel calls (default `5000`)
/// - `CHECKOUT_CHANNEL_CAPACITY`: checkout record buffer (default `1024`)
/// - `INVENTORY_SEED_FILE`: JSON array of catalog items loaded at startup (optional)
///
/// Unset or unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub rpc_timeout: Duration,
    pub channel_capacity: usize,
    pub inventory_seed_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
            rpc_timeout: parsed(&lookup, "RPC_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rpc_timeout),
            channel_capacity: parsed(&lookup, "CHECKOUT_CHANNEL_CAPACITY")
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.channel_capacity),
            inventory_seed_file: lookup("INVENTORY_SEED_FILE")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig::default().with_rpc_timeout(self.rpc_timeout)
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            rpc_timeout: Duration::from_millis(5000),
            channel_capacity: 1024,
            inventory_seed_file: None,
        }
    }
}
