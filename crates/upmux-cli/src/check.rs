//! `upmux check`: connect to every configured upstream and report

use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use upmux_core::{ConnectorConfig, ServersFile};
use upmux_gateway::pool::{ConnectError, ConnectionService, McpClient, TransportType};

use crate::cli::CheckArgs;

/// Runs the probe; `Ok(false)` when at least one upstream failed.
pub async fn run(args: CheckArgs) -> anyhow::Result<bool> {
    let mut config = ConnectorConfig::from_env().context("Invalid UPMUX_* environment")?;
    if args.docker {
        config = config.with_rewrite_localhost(true);
    }
    if let Some(secs) = args.timeout {
        config = config.with_connect_timeout(Duration::from_secs(secs));
    }

    let servers = ServersFile::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?
        .into_params();
    if servers.is_empty() {
        println!("No servers configured in {}", args.config.display());
        return Ok(true);
    }

    info!(
        servers = servers.len(),
        docker = config.rewrite_localhost,
        "Checking upstream servers"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let service = ConnectionService::new(&config);
    let results = service.connect_all(&servers, &cancel).await;

    let mut all_ok = true;
    for (name, result) in results {
        match result {
            Ok(handle) => {
                let upstream = match handle.client().await {
                    Some(client) => describe_upstream(&client),
                    None => "closed".to_string(),
                };
                println!(
                    "{}",
                    format_connected(&name, handle.transport_type(), &upstream)
                );
                if let Err(e) = handle.cleanup().await {
                    warn!(server = %name, error = %e, "Cleanup failed");
                }
            }
            Err(e) => {
                all_ok = false;
                println!("{}", format_failed(&name, &e));
            }
        }
    }

    Ok(all_ok)
}

fn describe_upstream(client: &McpClient) -> String {
    match client.peer_info() {
        Some(info) => format!("{} {}", info.server_info.name, info.server_info.version),
        None => "unknown upstream".to_string(),
    }
}

fn format_connected(name: &str, transport: TransportType, upstream: &str) -> String {
    format!("{:<24} ok      {:<16} {}", name, transport.as_str(), upstream)
}

fn format_failed(name: &str, error: &ConnectError) -> String {
    format!("{:<24} FAILED  {}", name, error)
}
