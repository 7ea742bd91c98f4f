//! Correlator connection and launch settings.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 15903;
const DEFAULT_STATUS_PERIOD_SECS: u32 = 60;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

/// Host/port pair addressing one correlator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineEndpoint {
    pub host: String,
    pub port: u16,
}

impl EngineEndpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Settings for one debug target, as carried by the `correlator` launch block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    /// Extra correlator arguments placed before the fixed debug flags.
    pub args: Vec<String>,
    /// Seconds between correlator status lines while debugging.
    pub status_period: u32,
    pub poll_timeout_ms: u64,
    pub startup_timeout_ms: u64,
    /// Patience before a stopping correlator is killed; `None` waits forever.
    pub shutdown_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            args: Vec::new(),
            status_period: DEFAULT_STATUS_PERIOD_SECS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            shutdown_timeout_ms: Some(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn endpoint(&self) -> EngineEndpoint {
        EngineEndpoint::new(self.host.clone(), self.port)
    }

    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            request_timeout: None,
        }
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }

    /// Overlay the fields present in a JSON-ish partial config.
    ///
    /// Launch requests usually carry only `host`/`port`; everything else keeps
    /// the adapter-level defaults.
    pub fn merge(&mut self, update: EngineConfigUpdate) {
        if let Some(host) = update.host {
            let trimmed = host.trim();
            if !trimmed.is_empty() {
                self.host = trimmed.to_string();
            }
        }
        if let Some(port) = update.port {
            self.port = port;
        }
        if let Some(args) = update.args {
            self.args = args;
        }
        if let Some(period) = update.status_period {
            self.status_period = period;
        }
        if let Some(timeout) = update.poll_timeout_ms {
            self.poll_timeout_ms = timeout;
        }
        if let Some(timeout) = update.startup_timeout_ms {
            self.startup_timeout_ms = timeout;
        }
        if let Some(timeout) = update.shutdown_timeout_ms {
            self.shutdown_timeout_ms = if timeout == 0 { None } else { Some(timeout) };
        }
    }
}

/// Partial engine settings; absent fields leave the base config untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfigUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub args: Option<Vec<String>>,
    pub status_period: Option<u32>,
    pub poll_timeout_ms: Option<u64>,
    pub startup_timeout_ms: Option<u64>,
    /// `0` disables the kill fallback.
    pub shutdown_timeout_ms: Option<u64>,
}

/// Transport timeouts for a [`crate::CorrelatorClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Client-side timeout of one `wait` long-poll call.
    pub poll_timeout: Duration,
    /// Timeout for every other call; `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            request_timeout: None,
        }
    }
}
