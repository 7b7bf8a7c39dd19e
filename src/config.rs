//! Server and client configuration
//!
//! Both sides are configured explicitly; there is no process-wide default
//! client. Defaults can be overridden from `WS_RELAY_*` environment
//! variables and then from the command line.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

/// Default server bind address
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3001";

/// Default WebSocket endpoint path
pub const DEFAULT_PATH: &str = "/ws";

/// Default client target URL
pub const DEFAULT_URL: &str = "ws://127.0.0.1:3001/ws";

/// Per-connection outbound buffer (router → writer task)
pub const CONNECTION_BUFFER_SIZE: usize = 32;

/// Router command channel buffer
pub const COMMAND_BUFFER_SIZE: usize = 256;

/// Base reconnect delay
pub const BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound of the exponential part of the reconnect delay
pub const CAP_DELAY: Duration = Duration::from_millis(30_000);

/// Upper bound (exclusive) of the random jitter added to each delay
pub const JITTER_MAX: Duration = Duration::from_millis(300);

/// Consecutive failures tolerated before giving up
pub const MAX_ATTEMPTS: u32 = 10;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind
    pub listen: SocketAddr,
    /// Path the WebSocket handshake must target
    pub path: String,
    /// Outbound buffer per connection
    pub connection_buffer: usize,
    /// Router command channel buffer
    pub command_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3001)),
            path: DEFAULT_PATH.to_string(),
            connection_buffer: CONNECTION_BUFFER_SIZE,
            command_buffer: COMMAND_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Defaults with `WS_RELAY_LISTEN` / `WS_RELAY_PATH` applied
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();
        if let Some(listen) = env_override("WS_RELAY_LISTEN")? {
            config.listen = listen;
        }
        if let Some(path) = env_override::<String>("WS_RELAY_PATH")? {
            config = config.with_path(path);
        }
        Ok(config)
    }

    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Set the endpoint path (a leading `/` is added if missing)
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    pub fn with_connection_buffer(mut self, size: usize) -> Self {
        self.connection_buffer = size.max(1);
        self
    }

    pub fn with_command_buffer(mut self, size: usize) -> Self {
        self.command_buffer = size.max(1);
        self
    }

    /// Reject settings the runtime cannot start with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.connection_buffer == 0 {
            return Err(AppError::Config(
                "connection_buffer must be at least 1".to_string(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(AppError::Config(
                "command_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reconnecting client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay
    pub cap_delay: Duration,
    /// Exclusive upper bound of the random jitter
    pub jitter_max: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            base_delay: BASE_DELAY,
            cap_delay: CAP_DELAY,
            jitter_max: JITTER_MAX,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

impl ClientConfig {
    /// Default backoff settings targeting `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Defaults with `WS_RELAY_URL` / `WS_RELAY_MAX_ATTEMPTS` applied
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();
        if let Some(url) = env_override("WS_RELAY_URL")? {
            config.url = url;
        }
        if let Some(max) = env_override("WS_RELAY_MAX_ATTEMPTS")? {
            config.max_attempts = max;
        }
        Ok(config)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_cap_delay(mut self, delay: Duration) -> Self {
        self.cap_delay = delay;
        self
    }

    pub fn with_jitter_max(mut self, jitter: Duration) -> Self {
        self.jitter_max = jitter;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }
}

/// Read and parse an environment variable, `None` when unset
fn env_override<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(AppError::Config(format!("{}: {}", key, e))),
    }
}
