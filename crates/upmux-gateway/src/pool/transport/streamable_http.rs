//! Streamable HTTP transport for MCP servers

use async_trait::async_trait;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use upmux_core::TransportType;

use super::{HttpBinding, Transport};
use crate::pool::client::{create_client_handler, McpClient};
use crate::pool::error::ConnectError;

/// HTTP transport for Streamable HTTP MCP servers
///
/// The bearer token rides on the reqwest client's default headers, so the
/// initialize POST, every later POST and the server-event GET all carry it.
pub struct StreamableHttpTransport {
    server_name: String,
    binding: HttpBinding,
}

impl StreamableHttpTransport {
    pub fn new(server_name: String, binding: HttpBinding) -> Self {
        Self {
            server_name,
            binding,
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    type Client = McpClient;

    async fn connect(&self, _cancel: &CancellationToken) -> Result<McpClient, ConnectError> {
        info!(
            server = %self.server_name,
            url = %self.binding.url(),
            "Connecting to Streamable HTTP server"
        );

        let http_client = self.binding.build_http_client()?;
        debug!(
            server = %self.server_name,
            authenticated = self.binding.bearer_token().is_some(),
            "Built HTTP client"
        );

        let config = StreamableHttpClientTransportConfig::with_uri(self.binding.url());
        let transport = StreamableHttpClientTransport::with_client(http_client, config);

        let client = create_client_handler(&self.server_name)
            .serve(transport)
            .await
            .map_err(|e| {
                let err = ConnectError::Handshake(e.to_string());
                error!(server = %self.server_name, "{}", err);
                err
            })?;

        info!(server = %self.server_name, "Streamable HTTP server connected");
        Ok(client)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::StreamableHttp
    }

    fn description(&self) -> String {
        format!("streamable_http:{}", self.binding.url())
    }
}
