//! # Upmux Gateway
//!
//! Establishes and tears down sessions with upstream MCP servers on behalf of
//! an aggregating process.
//!
//! ```text
//! ServerParams ──▶ TransportFactory ──▶ Transport (stdio | sse | streamable http)
//!                                            │
//!                                            ▼
//!                 ConnectionService (bounded retry) ──▶ ConnectionHandle { client, cleanup }
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use upmux_core::{ConnectorConfig, ServerParams};
//! use upmux_gateway::pool::ConnectionService;
//! use tokio_util::sync::CancellationToken;
//!
//! let service = ConnectionService::new(&ConnectorConfig::from_env()?);
//! let params = ServerParams::stdio("github", "npx", vec![
//!     "-y".to_string(),
//!     "@modelcontextprotocol/server-github".to_string(),
//! ]);
//!
//! if let Some(handle) = service.connect(&params, &CancellationToken::new()).await {
//!     let peer = handle.peer().await.expect("open handle");
//!     let tools = peer.list_all_tools().await?;
//!     handle.cleanup().await?;
//! }
//! ```

pub mod pool;
