//! Upstream server parameters
//!
//! One `ServerParams` value describes how to reach one upstream MCP server.
//! Which transport-specific fields matter is decided by `type`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::credential::OAuthTokens;

/// Transport used to reach an upstream server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportType {
    /// Spawned subprocess speaking over stdin/stdout
    Stdio,
    /// Long-lived HTTP event stream plus POSTed messages
    Sse,
    /// Bidirectional streamable HTTP
    StreamableHttp,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Stdio => "STDIO",
            TransportType::Sse => "SSE",
            TransportType::StreamableHttp => "STREAMABLE_HTTP",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = ServerParamsError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "STDIO" => Ok(TransportType::Stdio),
            "SSE" => Ok(TransportType::Sse),
            "STREAMABLE_HTTP" => Ok(TransportType::StreamableHttp),
            _ => Err(ServerParamsError::UnsupportedTransport(s.to_string())),
        }
    }
}

/// Why a `ServerParams` value cannot produce a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerParamsError {
    #[error("unsupported transport type: {0:?}")]
    UnsupportedTransport(String),

    #[error("{0} transport requires a command")]
    MissingCommand(TransportType),

    #[error("{0} transport requires a url")]
    MissingUrl(TransportType),

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

/// Immutable description of one upstream endpoint.
///
/// Supplied fresh for every connection attempt; nothing here is cached by the
/// connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerParams {
    /// Identifier used for diagnostics only
    #[serde(default)]
    pub name: String,

    /// Raw transport type; absent means STDIO
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_tokens: Option<OAuthTokens>,
}

impl ServerParams {
    /// Parameters for a spawned subprocess
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: Some(TransportType::Stdio.to_string()),
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    /// Parameters for an HTTP event-stream upstream
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: Some(TransportType::Sse.to_string()),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Parameters for a streamable HTTP upstream
    pub fn streamable_http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: Some(TransportType::StreamableHttp.to_string()),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_oauth_tokens(mut self, tokens: OAuthTokens) -> Self {
        self.oauth_tokens = Some(tokens);
        self
    }

    /// Resolve the declared transport type (absent means STDIO)
    pub fn transport_type(&self) -> Result<TransportType, ServerParamsError> {
        match &self.transport {
            None => Ok(TransportType::Stdio),
            Some(raw) => raw.parse(),
        }
    }

    /// Check that the fields required by the resolved transport are present
    /// and well-formed.
    pub fn validate(&self) -> Result<TransportType, ServerParamsError> {
        let transport_type = self.transport_type()?;
        match transport_type {
            TransportType::Stdio => {
                let has_command = self
                    .command
                    .as_deref()
                    .is_some_and(|c| !c.trim().is_empty());
                if !has_command {
                    return Err(ServerParamsError::MissingCommand(transport_type));
                }
            }
            TransportType::Sse | TransportType::StreamableHttp => {
                let url = self
                    .url
                    .as_deref()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or(ServerParamsError::MissingUrl(transport_type))?;
                let parsed = url::Url::parse(url).map_err(|e| ServerParamsError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ServerParamsError::InvalidUrl {
                        url: url.to_string(),
                        reason: format!("unsupported scheme '{}'", parsed.scheme()),
                    });
                }
            }
        }
        Ok(transport_type)
    }

    /// Name for log lines, falling back to the transport target
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        self.url
            .as_deref()
            .or(self.command.as_deref())
            .unwrap_or("<unnamed>")
    }
}
