//! Connection error taxonomy

use std::time::Duration;

use thiserror::Error;
use upmux_core::ServerParamsError;

/// Why an upstream connection could not be established or torn down.
#[derive(Debug, Clone, Error)]
pub enum ConnectError {
    /// Server parameters cannot produce a transport
    #[error("invalid server parameters: {0}")]
    Config(#[from] ServerParamsError),

    #[error("Command not found: {command}. Ensure it's installed and in PATH.")]
    CommandNotFound { command: String },

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// The upstream refused or dropped the transport before the handshake
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("MCP handshake failed: {0}")]
    Handshake(String),

    #[error("Connection timeout ({0:?})")]
    Timeout(Duration),

    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("Gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ConnectError>,
    },

    #[error("Cleanup failed: {0}")]
    Cleanup(String),
}

impl ConnectError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::Spawn(_)
                | ConnectError::Unreachable(_)
                | ConnectError::Handshake(_)
                | ConnectError::Timeout(_)
        )
    }
}
