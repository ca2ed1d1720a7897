//! Minimal MCP server over stdio used by the gateway tests.
//!
//! `--exit-immediately` makes it quit before the handshake, simulating an
//! upstream that crashes on start-up. `--hang <file>` appends the process id
//! to `<file>` and then never answers the handshake.

use std::io::Write;

use rmcp::{transport::stdio, ServiceExt};
use tests::TestServerHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eprintln!("mock-stdio-server starting");
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "--exit-immediately") {
        eprintln!("mock-stdio-server exiting before handshake");
        std::process::exit(1);
    }

    if let Some(pid_file) = args
        .iter()
        .position(|arg| arg == "--hang")
        .and_then(|i| args.get(i + 1))
    {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(pid_file)?;
        writeln!(file, "{}", std::process::id())?;
        eprintln!("mock-stdio-server hanging");
        std::future::pending::<()>().await;
    }

    let service = TestServerHandler::new("mock-stdio-server")
        .serve(stdio())
        .await?;
    eprintln!("mock-stdio-server ready");
    service.waiting().await?;
    Ok(())
}
