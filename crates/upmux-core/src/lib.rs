//! # Upmux Core Library
//!
//! Domain types and configuration shared by the Upmux crates.
//!
//! ## Modules
//!
//! - `domain` - Upstream server parameters, credentials and the servers file format
//! - `config` - Connector configuration read once at process start

pub mod config;
pub mod domain;

pub use config::{ConfigError, ConnectorConfig};
pub use domain::*;
