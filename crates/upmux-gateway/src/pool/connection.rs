//! Connection Service - establishes upstream connections with bounded retry
//!
//! ConnectionService is responsible for:
//! - Turning `ServerParams` into a transport via `TransportFactory`
//! - Running up to `max_attempts` connect attempts with a fixed delay between
//!   them, releasing each failed attempt before the next one starts
//! - Handing back a `ConnectionHandle`, or nothing when the upstream is
//!   unavailable

use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use upmux_core::{ConnectorConfig, ServerParams};

use super::client::McpClient;
use super::error::ConnectError;
use super::handle::ConnectionHandle;
use super::transport::{Transport, TransportFactory};

/// Retry schedule for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
    /// Upper bound on a single attempt, handshake included
    pub connect_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.retry_delay,
            connect_timeout: config.connect_timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ConnectorConfig::default())
    }
}

/// Connection Service handles upstream connection establishment
#[derive(Debug, Clone)]
pub struct ConnectionService {
    factory: TransportFactory,
    policy: RetryPolicy,
}

impl ConnectionService {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            factory: TransportFactory::from_config(config),
            policy: RetryPolicy::from_config(config),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy.connect_timeout = timeout;
        self
    }

    pub fn factory(&self) -> &TransportFactory {
        &self.factory
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Connect to one upstream, or `None` when it is unavailable.
    ///
    /// Failures are logged here; callers that need the reason use
    /// [`ConnectionService::try_connect`].
    pub async fn connect(
        &self,
        params: &ServerParams,
        cancel: &CancellationToken,
    ) -> Option<ConnectionHandle> {
        match self.try_connect(params, cancel).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(
                    server = %params.display_name(),
                    error = %e,
                    "Upstream unavailable, continuing without it"
                );
                None
            }
        }
    }

    /// Connect to one upstream, reporting why it failed
    pub async fn try_connect(
        &self,
        params: &ServerParams,
        cancel: &CancellationToken,
    ) -> Result<ConnectionHandle, ConnectError> {
        let server_name = params.display_name();
        let transport = self.factory.create(params).map_err(|e| {
            error!(server = %server_name, error = %e, "Invalid server parameters");
            ConnectError::from(e)
        })?;

        self.establish(server_name, transport.as_ref(), cancel).await
    }

    /// Connect to every upstream concurrently.
    ///
    /// One result per input, in input order; one upstream failing has no
    /// effect on the others.
    pub async fn connect_all(
        &self,
        servers: &[ServerParams],
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<ConnectionHandle<McpClient>, ConnectError>)> {
        let attempts = servers.iter().map(|params| async move {
            let result = self.try_connect(params, cancel).await;
            (params.display_name().to_string(), result)
        });
        join_all(attempts).await
    }

    /// Run the attempt loop against an already-built transport.
    ///
    /// Each attempt gets a fresh channel and client from `transport.connect`.
    /// A failed attempt is released (`transport.close`) before the fixed
    /// delay; errors from that release are logged and never replace the
    /// connection error. Non-retryable errors end the loop immediately.
    pub async fn establish<T>(
        &self,
        server_name: &str,
        transport: &T,
        cancel: &CancellationToken,
    ) -> Result<ConnectionHandle<T::Client>, ConnectError>
    where
        T: Transport + ?Sized,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!(server = %server_name, "Connection cancelled");
                return Err(ConnectError::Cancelled);
            }

            attempt += 1;
            debug!(
                server = %server_name,
                transport = %transport.description(),
                attempt,
                max_attempts,
                "Connecting"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ConnectError::Cancelled),
                result = tokio::time::timeout(self.policy.connect_timeout, transport.connect(cancel)) => {
                    match result {
                        Ok(result) => result,
                        Err(_) => Err(ConnectError::Timeout(self.policy.connect_timeout)),
                    }
                }
            };

            let err = match outcome {
                Ok(client) => {
                    info!(
                        server = %server_name,
                        transport = %transport.transport_type(),
                        attempt,
                        "Connected to upstream"
                    );
                    return Ok(ConnectionHandle::new(
                        server_name,
                        transport.transport_type(),
                        client,
                    ));
                }
                Err(e) => e,
            };

            warn!(
                server = %server_name,
                attempt,
                max_attempts,
                error = %err,
                "Connection attempt failed"
            );

            if let Err(cleanup) = transport.close().await {
                warn!(
                    server = %server_name,
                    attempt,
                    error = %cleanup,
                    "Failed to release connection attempt"
                );
            }

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= max_attempts {
                error!(
                    server = %server_name,
                    attempts = attempt,
                    error = %err,
                    "Giving up on upstream"
                );
                return Err(ConnectError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            debug!(
                server = %server_name,
                delay_ms = self.policy.delay.as_millis() as u64,
                "Waiting before next attempt"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(server = %server_name, "Connection cancelled during backoff");
                    return Err(ConnectError::Cancelled);
                }
                _ = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }
}
