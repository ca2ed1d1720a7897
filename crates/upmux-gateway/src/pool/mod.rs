//! Upstream connection pool primitives
//!
//! - **AddressNormalizer**: rewrites loopback hosts for containerized deployments
//! - **TransportFactory**: turns `ServerParams` into a `Transport`
//! - **UpstreamClientHandler**: the aggregator's outbound client identity
//! - **ConnectionService**: handshake with bounded retry
//! - **ConnectionHandle**: live client plus idempotent cleanup

mod address;
mod client;
mod connection;
mod error;
mod handle;
pub mod transport;

pub use address::AddressNormalizer;
pub use client::{create_client_handler, McpClient, UpstreamClientHandler, CLIENT_NAME, CLIENT_TITLE};
pub use connection::{ConnectionService, RetryPolicy};
pub use error::ConnectError;
pub use handle::{ConnectionHandle, Shutdown};
pub use transport::{HttpBinding, Transport, TransportBinding, TransportFactory};

pub use upmux_core::TransportType;
