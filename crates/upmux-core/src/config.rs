//! Connector configuration
//!
//! Read once at process start and injected into the gateway; nothing in the
//! connection path consults the environment afterwards.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub const ENV_RUNNING_IN_DOCKER: &str = "UPMUX_RUNNING_IN_DOCKER";
pub const ENV_DOCKER_HOST_ALIAS: &str = "UPMUX_DOCKER_HOST_ALIAS";
pub const ENV_CONNECT_ATTEMPTS: &str = "UPMUX_CONNECT_ATTEMPTS";
pub const ENV_RETRY_DELAY_MS: &str = "UPMUX_RETRY_DELAY_MS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "UPMUX_CONNECT_TIMEOUT_SECS";

/// Host alias that reaches the container host from inside Docker
pub const DEFAULT_DOCKER_HOST_ALIAS: &str = "host.docker.internal";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2500);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}: expected a boolean, got {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key}: expected a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Rewrite loopback hosts in upstream URLs to `docker_host_alias`
    pub rewrite_localhost: bool,
    pub docker_host_alias: String,
    /// Total handshake attempts per upstream, first one included
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub retry_delay: Duration,
    /// Upper bound for a single handshake attempt
    pub connect_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            rewrite_localhost: false,
            docker_host_alias: DEFAULT_DOCKER_HOST_ALIAS.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectorConfig {
    /// Load from the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_RUNNING_IN_DOCKER) {
            config.rewrite_localhost = parse_bool(ENV_RUNNING_IN_DOCKER, &value)?;
        }

        if let Some(value) = lookup(ENV_DOCKER_HOST_ALIAS) {
            let value = value.trim();
            if value.is_empty() {
                return Err(ConfigError::Empty {
                    key: ENV_DOCKER_HOST_ALIAS,
                });
            }
            config.docker_host_alias = value.to_string();
        }

        if let Some(value) = lookup(ENV_CONNECT_ATTEMPTS) {
            config.max_attempts = parse_positive(ENV_CONNECT_ATTEMPTS, &value)? as u32;
        }

        if let Some(value) = lookup(ENV_RETRY_DELAY_MS) {
            // Zero is a legitimate delay
            config.retry_delay = Duration::from_millis(value.trim().parse().map_err(|_| {
                ConfigError::InvalidNumber {
                    key: ENV_RETRY_DELAY_MS,
                    value: value.clone(),
                }
            })?);
        }

        if let Some(value) = lookup(ENV_CONNECT_TIMEOUT_SECS) {
            config.connect_timeout =
                Duration::from_secs(parse_positive(ENV_CONNECT_TIMEOUT_SECS, &value)?);
        }

        debug!(
            rewrite_localhost = config.rewrite_localhost,
            docker_host_alias = %config.docker_host_alias,
            max_attempts = config.max_attempts,
            retry_delay_ms = config.retry_delay.as_millis() as u64,
            connect_timeout_secs = config.connect_timeout.as_secs(),
            "Loaded connector configuration"
        );

        Ok(config)
    }

    pub fn with_rewrite_localhost(mut self, rewrite: bool) -> Self {
        self.rewrite_localhost = rewrite;
        self
    }

    pub fn with_docker_host_alias(mut self, alias: impl Into<String>) -> Self {
        self.docker_host_alias = alias.into();
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 && n <= u32::MAX as u64 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        }),
    }
}
