//! Connection handle returned to the aggregation layer
//!
//! A handle pairs the live client with its teardown. Cleanup may be called
//! any number of times from any number of clones; the client is shut down
//! exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::service::Peer;
use rmcp::RoleClient;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use upmux_core::TransportType;

use super::client::McpClient;
use super::error::ConnectError;

/// Orderly teardown of a connected client and the transport it owns
#[async_trait]
pub trait Shutdown: Send + Sync + 'static {
    async fn shutdown(self) -> Result<(), ConnectError>;
}

#[async_trait]
impl Shutdown for McpClient {
    async fn shutdown(self) -> Result<(), ConnectError> {
        // Cancelling the service closes the transport it owns (child process,
        // HTTP session) before the service task returns.
        let reason = self
            .cancel()
            .await
            .map_err(|e| ConnectError::Cleanup(e.to_string()))?;
        debug!(?reason, "MCP client service stopped");
        Ok(())
    }
}

/// Live upstream connection: `{ client, cleanup }`
pub struct ConnectionHandle<C: Shutdown = McpClient> {
    server_name: Arc<str>,
    transport_type: TransportType,
    client: Arc<RwLock<Option<C>>>,
}

impl<C: Shutdown> Clone for ConnectionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            server_name: Arc::clone(&self.server_name),
            transport_type: self.transport_type,
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: Shutdown> std::fmt::Debug for ConnectionHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("server_name", &self.server_name)
            .field("transport_type", &self.transport_type)
            .finish()
    }
}

impl<C: Shutdown> ConnectionHandle<C> {
    pub fn new(server_name: &str, transport_type: TransportType, client: C) -> Self {
        Self {
            server_name: Arc::from(server_name),
            transport_type,
            client: Arc::new(RwLock::new(Some(client))),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    /// Read access to the client, or `None` once cleaned up.
    ///
    /// Cleanup waits for outstanding guards, so do not hold one across
    /// long-running work.
    pub async fn client(&self) -> Option<RwLockReadGuard<'_, C>> {
        let guard = self.client.read().await;
        RwLockReadGuard::try_map(guard, |client| client.as_ref()).ok()
    }

    pub async fn is_closed(&self) -> bool {
        self.client.read().await.is_none()
    }

    /// Close transport and client. Idempotent: calls after the first are
    /// no-ops returning `Ok(())`.
    pub async fn cleanup(&self) -> Result<(), ConnectError> {
        let taken = self.client.write().await.take();
        let Some(client) = taken else {
            debug!(server = %self.server_name, "Connection already cleaned up");
            return Ok(());
        };

        info!(
            server = %self.server_name,
            transport = %self.transport_type,
            "Closing upstream connection"
        );
        let result = client.shutdown().await;
        if let Err(e) = &result {
            warn!(server = %self.server_name, error = %e, "Upstream cleanup failed");
        }
        result
    }
}

impl ConnectionHandle<McpClient> {
    /// Cloneable peer for issuing protocol requests, or `None` once closed
    pub async fn peer(&self) -> Option<Peer<RoleClient>> {
        self.client().await.map(|client| client.peer().clone())
    }
}
