//! Domain entities and value objects
//!
//! - `ServerParams` describes one upstream endpoint
//! - `OAuthTokens` is the already-issued bearer credential for it
//! - `ServersFile` is the `mcpServers` document operators hand us

mod credential;
mod server;
mod servers_file;

pub use credential::OAuthTokens;
pub use server::{ServerParams, ServerParamsError, TransportType};
pub use servers_file::{ServersFile, ServersFileError};
