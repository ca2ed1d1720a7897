//! STDIO transport for MCP servers
//!
//! Handles connecting to MCP servers that run as child processes
//! communicating over stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use upmux_core::TransportType;

use super::Transport;
use crate::pool::client::{create_client_handler, McpClient};
use crate::pool::error::ConnectError;

/// Apply platform-specific spawn flags to a child process command.
///
/// On Unix the child gets its own process group so a Ctrl-C aimed at the
/// aggregator is not delivered to every upstream. On Windows no console
/// window is created for the child.
pub fn configure_child_process_platform(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
}

/// Forward a child's stderr to tracing, one event per non-empty line.
///
/// Returns the number of lines forwarded once the stream ends.
pub async fn forward_stderr_lines<R>(reader: R, server_name: &str) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                info!(target: "upmux::upstream_stderr", server = %server_name, "{}", line);
                forwarded += 1;
            }
            Ok(None) => break,
            Err(e) => {
                debug!(server = %server_name, error = %e, "Stopped reading upstream stderr");
                break;
            }
        }
    }
    forwarded
}

/// Split an embedded command line when no separate args were given.
///
/// `"npx -y @scope/server"` becomes `("npx", ["-y", "@scope/server"])`.
fn parse_command(command: &str, args: &[String]) -> Result<(String, Vec<String>), ConnectError> {
    if !args.is_empty() {
        return Ok((command.to_string(), args.to_vec()));
    }

    if !command.trim().contains(char::is_whitespace) {
        return Ok((command.trim().to_string(), Vec::new()));
    }

    let mut parts = shell_words::split(command).map_err(|e| {
        ConnectError::Spawn(format!(
            "Failed to parse command string - check for unmatched quotes: {}",
            e
        ))
    })?;
    if parts.is_empty() {
        return Err(ConnectError::Spawn("Empty command after parsing".to_string()));
    }
    let executable = parts.remove(0);
    Ok((executable, parts))
}

/// STDIO transport for child process MCP servers
pub struct StdioTransport {
    server_name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl StdioTransport {
    pub fn new(
        server_name: String,
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            server_name,
            command,
            args,
            env,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    type Client = McpClient;

    async fn connect(&self, _cancel: &CancellationToken) -> Result<McpClient, ConnectError> {
        info!(
            server = %self.server_name,
            command = %self.command,
            "Connecting to STDIO server"
        );

        let (executable, args) = parse_command(&self.command, &self.args)?;

        // Validate command exists
        let command_path = which::which(&executable)
            .or_else(|_| which::which(format!("{}.exe", &executable)))
            .map_err(|_| {
                let err = ConnectError::CommandNotFound {
                    command: executable.clone(),
                };
                error!(server = %self.server_name, "{}", err);
                err
            })?;

        debug!(
            server = %self.server_name,
            path = ?command_path,
            "Found command"
        );

        // Configured variables are added on top of the inherited environment
        let mut cmd = Command::new(&command_path);
        cmd.args(&args).envs(&self.env).kill_on_drop(true);
        configure_child_process_platform(&mut cmd);

        let (transport, stderr) = TokioChildProcess::builder(cmd)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                let err = ConnectError::Spawn(e.to_string());
                error!(server = %self.server_name, "{}", err);
                err
            })?;

        if let Some(stderr) = stderr {
            let server_name = self.server_name.clone();
            tokio::spawn(async move {
                let lines = forward_stderr_lines(BufReader::new(stderr), &server_name).await;
                debug!(server = %server_name, lines, "Upstream stderr closed");
            });
        }

        // Dropping the transport on handshake failure kills the child
        let client = create_client_handler(&self.server_name)
            .serve(transport)
            .await
            .map_err(|e| {
                let err = ConnectError::Handshake(e.to_string());
                error!(server = %self.server_name, "{}", err);
                err
            })?;

        info!(server = %self.server_name, "STDIO server connected");
        Ok(client)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command)
    }
}
