//! Transport abstraction for upstream MCP connections
//!
//! `TransportFactory` turns a `ServerParams` value into exactly one of three
//! transports. Configuration problems surface here as `ServerParamsError`;
//! nothing past this point has to re-validate the parameters.

mod sse;
mod sse_codec;
mod stdio;
mod streamable_http;

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use upmux_core::{ConnectorConfig, ServerParams, ServerParamsError, TransportType};

pub use sse::SseTransport;
pub use sse_codec::{SseDecoder, SseEvent};
pub use stdio::{configure_child_process_platform, forward_stderr_lines, StdioTransport};
pub use streamable_http::StreamableHttpTransport;

use super::address::AddressNormalizer;
use super::client::McpClient;
use super::error::ConnectError;
use super::handle::Shutdown;

/// Transport trait for upstream connections
///
/// Every call to `connect` builds a fresh channel and client; nothing from a
/// failed attempt is reused by the next one.
#[async_trait]
pub trait Transport: Send + Sync {
    type Client: Shutdown;

    /// Open the channel and run the protocol handshake over it
    async fn connect(&self, cancel: &CancellationToken) -> Result<Self::Client, ConnectError>;

    /// Release whatever a failed `connect` may have left running.
    ///
    /// Attempts own their resources and drop them on failure, so most
    /// transports have nothing to do here.
    async fn close(&self) -> Result<(), ConnectError> {
        Ok(())
    }

    fn transport_type(&self) -> TransportType;

    /// Get a description for logging
    fn description(&self) -> String;
}

/// Target of an HTTP-based transport: normalized URL plus optional bearer
/// token.
#[derive(Clone)]
pub struct HttpBinding {
    url: String,
    bearer: Option<String>,
}

impl std::fmt::Debug for HttpBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBinding")
            .field("url", &self.url)
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpBinding {
    pub fn new(url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            url: url.into(),
            bearer,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// Headers sent with every request the transport makes.
    ///
    /// Holds `Authorization: Bearer <token>` when a credential is present and
    /// nothing otherwise.
    pub fn default_headers(&self) -> Result<HeaderMap, ServerParamsError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ServerParamsError::InvalidCredential(
                    "access token contains characters not allowed in an HTTP header".to_string(),
                )
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Build a reqwest::Client with the binding's headers as default_headers.
    ///
    /// Each binding gets its own client, so a credential never reaches a
    /// connection it was not issued for.
    pub fn build_http_client(&self) -> Result<reqwest::Client, ConnectError> {
        let headers = self.default_headers()?;
        reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectError::HttpClient(e.to_string()))
    }
}

/// Resolved, inspectable form of a `ServerParams` value
#[derive(Debug, Clone)]
pub enum TransportBinding {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Sse(HttpBinding),
    StreamableHttp(HttpBinding),
}

impl TransportBinding {
    pub fn transport_type(&self) -> TransportType {
        match self {
            TransportBinding::Stdio { .. } => TransportType::Stdio,
            TransportBinding::Sse(_) => TransportType::Sse,
            TransportBinding::StreamableHttp(_) => TransportType::StreamableHttp,
        }
    }

    /// HTTP target for URL-based transports
    pub fn http(&self) -> Option<&HttpBinding> {
        match self {
            TransportBinding::Sse(binding) | TransportBinding::StreamableHttp(binding) => {
                Some(binding)
            }
            TransportBinding::Stdio { .. } => None,
        }
    }
}

/// Factory for creating transport instances
#[derive(Debug, Clone)]
pub struct TransportFactory {
    normalizer: AddressNormalizer,
}

impl TransportFactory {
    pub fn new(normalizer: AddressNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self::new(AddressNormalizer::from_config(config))
    }

    pub fn normalizer(&self) -> &AddressNormalizer {
        &self.normalizer
    }

    /// Validate `params` and resolve them into a binding.
    ///
    /// URLs are normalized here; STDIO parameters never touch the normalizer.
    pub fn resolve(&self, params: &ServerParams) -> Result<TransportBinding, ServerParamsError> {
        let binding = match params.validate()? {
            TransportType::Stdio => TransportBinding::Stdio {
                command: params.command.clone().unwrap_or_default(),
                args: params.args.clone(),
                env: params.env.clone(),
            },
            TransportType::Sse => TransportBinding::Sse(self.http_binding(params)?),
            TransportType::StreamableHttp => {
                TransportBinding::StreamableHttp(self.http_binding(params)?)
            }
        };

        debug!(
            server = %params.display_name(),
            transport = %binding.transport_type(),
            authenticated = binding.http().is_some_and(|b| b.bearer_token().is_some()),
            "Resolved transport binding"
        );
        Ok(binding)
    }

    fn http_binding(&self, params: &ServerParams) -> Result<HttpBinding, ServerParamsError> {
        let url = self.normalizer.normalize(params.url.as_deref().unwrap_or_default());
        let bearer = params
            .oauth_tokens
            .as_ref()
            .map(|tokens| tokens.access_token.clone());

        let binding = HttpBinding::new(url, bearer);
        // Reject tokens that cannot be sent before any connection is tried
        binding.default_headers()?;
        Ok(binding)
    }

    /// Create a transport from server parameters
    pub fn create(
        &self,
        params: &ServerParams,
    ) -> Result<Box<dyn Transport<Client = McpClient>>, ServerParamsError> {
        let binding = self.resolve(params)?;
        let transport = self.build(params.display_name(), binding);
        info!(
            server = %params.display_name(),
            transport = %transport.description(),
            "Created transport"
        );
        Ok(transport)
    }

    /// Build the transport for an already-resolved binding
    pub fn build(
        &self,
        server_name: &str,
        binding: TransportBinding,
    ) -> Box<dyn Transport<Client = McpClient>> {
        match binding {
            TransportBinding::Stdio { command, args, env } => Box::new(StdioTransport::new(
                server_name.to_string(),
                command,
                args,
                env,
            )),
            TransportBinding::Sse(http) => Box::new(SseTransport::new(
                server_name.to_string(),
                http,
                self.normalizer.clone(),
            )),
            TransportBinding::StreamableHttp(http) => Box::new(StreamableHttpTransport::new(
                server_name.to_string(),
                http,
            )),
        }
    }
}
