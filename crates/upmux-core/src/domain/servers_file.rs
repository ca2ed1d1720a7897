//! `mcpServers` document
//!
//! The same top-level shape VS Code, Cursor and Claude Desktop use:
//!
//! ```json
//! { "mcpServers": { "github": { "command": "npx", "args": ["-y", "..."] } } }
//! ```
//!
//! Entry keys become server names when an entry does not set one.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::server::ServerParams;

#[derive(Debug, Error)]
pub enum ServersFileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse servers file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ServersFile {
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, ServerParams>,
}

impl ServersFile {
    pub fn from_json(json: &str) -> Result<Self, ServersFileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ServersFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ServersFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// All entries in key order, named after their key when unnamed
    pub fn into_params(self) -> Vec<ServerParams> {
        self.servers
            .into_iter()
            .map(|(key, mut params)| {
                if params.name.is_empty() {
                    params.name = key;
                }
                params
            })
            .collect()
    }
}
