//! Outbound MCP client identity
//!
//! Every upstream sees the aggregator as the same client: a fixed
//! name/version and a fixed capability announcement, independent of the
//! server being connected.

use rmcp::model::{
    ClientCapabilities, ClientInfo, Implementation, JsonObject, LoggingLevel,
    LoggingMessageNotificationParam,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::RoleClient;
use tracing::{debug, info, warn};

/// Name the aggregator presents to upstream servers
pub const CLIENT_NAME: &str = "upmux-aggregator";
pub const CLIENT_TITLE: &str = "Upmux Aggregator";

/// Type alias for a connected upstream client
pub type McpClient = RunningService<RoleClient, UpstreamClientHandler>;

/// Client handler shared by all upstream connections
#[derive(Clone)]
pub struct UpstreamClientHandler {
    info: ClientInfo,
    server_name: String,
}

impl std::fmt::Debug for UpstreamClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClientHandler")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl UpstreamClientHandler {
    /// `server_name` only tags log lines; it is not sent upstream.
    pub fn new(server_name: &str) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: Self::capabilities(),
                client_info: Implementation {
                    name: CLIENT_NAME.to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some(CLIENT_TITLE.to_string()),
                    ..Default::default()
                },
                meta: None,
            },
            server_name: server_name.to_string(),
        }
    }

    /// Fixed capability announcement: prompts, subscribable resources, tools.
    ///
    /// The protocol models these as server-side capabilities, so the client
    /// side carries them in its experimental map.
    pub fn capabilities() -> ClientCapabilities {
        let mut resources = JsonObject::new();
        resources.insert("subscribe".to_string(), serde_json::Value::Bool(true));

        let mut experimental = std::collections::BTreeMap::new();
        experimental.insert("prompts".to_string(), JsonObject::new());
        experimental.insert("resources".to_string(), resources);
        experimental.insert("tools".to_string(), JsonObject::new());

        ClientCapabilities {
            experimental: Some(experimental),
            ..Default::default()
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

impl rmcp::ClientHandler for UpstreamClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server = self.server_name.clone();
        async move {
            info!(server = %server, "Upstream sent tools/list_changed");
        }
    }

    fn on_prompt_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server = self.server_name.clone();
        async move {
            info!(server = %server, "Upstream sent prompts/list_changed");
        }
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server = self.server_name.clone();
        async move {
            info!(server = %server, "Upstream sent resources/list_changed");
        }
    }

    fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server = self.server_name.clone();
        async move {
            let message = match &params.data {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            match params.level {
                LoggingLevel::Debug => {
                    debug!(server = %server, logger = ?params.logger, "Upstream log: {}", message)
                }
                LoggingLevel::Info | LoggingLevel::Notice => {
                    info!(server = %server, logger = ?params.logger, "Upstream log: {}", message)
                }
                _ => warn!(
                    server = %server,
                    level = ?params.level,
                    logger = ?params.logger,
                    "Upstream log: {}",
                    message
                ),
            }
        }
    }
}

/// Create the client handler for one upstream
pub fn create_client_handler(server_name: &str) -> UpstreamClientHandler {
    UpstreamClientHandler::new(server_name)
}
