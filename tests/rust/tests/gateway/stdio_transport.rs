//! STDIO transport tests
//!
//! Full handshakes against the mock stdio server, and child process
//! lifetime when attempts are abandoned.

use std::collections::HashMap;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use upmux_core::{ServerParams, TransportType};
use upmux_gateway::pool::ConnectError;

use super::{call_text_tool, test_service, tool_names, MOCK_STDIO_SERVER};

/// Stderr lines of a child are counted as they are forwarded to tracing
#[cfg(unix)]
#[tokio::test]
async fn test_stderr_lines_forwarded() {
    use std::process::Stdio;

    use tokio::process::Command;
    use upmux_gateway::pool::transport::forward_stderr_lines;

    let mut child = Command::new("sh")
        .args([
            "-c",
            "echo 'stderr line 1' >&2; echo '' >&2; echo 'error: something failed' >&2",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn child process");

    let stderr = child.stderr.take().expect("stderr piped");
    let forwarded = forward_stderr_lines(tokio::io::BufReader::new(stderr), "sh-test").await;
    assert_eq!(forwarded, 2);
    assert!(child.wait().await.unwrap().success());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connects_to_stdio_server() {
    tests::init_test_tracing();

    let env = HashMap::from([(
        "UPMUX_TEST_GREETING".to_string(),
        "hello from env".to_string(),
    )]);
    let params = ServerParams::stdio("mock", MOCK_STDIO_SERVER, vec![]).with_env(env);

    let handle = test_service(3)
        .connect(&params, &CancellationToken::new())
        .await
        .expect("mock server connects");
    assert_eq!(handle.server_name(), "mock");
    assert_eq!(handle.transport_type(), TransportType::Stdio);

    let peer = handle.peer().await.expect("open handle");
    assert_eq!(tool_names(&peer).await, vec!["echo", "env"]);

    // The child sees the configured variables
    let greeting = call_text_tool(
        &peer,
        "env",
        serde_json::json!({"name": "UPMUX_TEST_GREETING"}),
    )
    .await;
    assert_eq!(greeting, "hello from env");

    {
        let client = handle.client().await.expect("open handle");
        let info = client.peer_info().expect("server info after handshake");
        assert_eq!(info.server_info.name, "mock-stdio-server");
    }

    assert!(handle.cleanup().await.is_ok());
    assert!(handle.cleanup().await.is_ok());
    assert!(handle.is_closed().await);
    assert!(handle.peer().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_embedded_command_string_is_split() {
    let params = ServerParams::stdio(
        "embedded",
        format!("\"{}\" --verbose", MOCK_STDIO_SERVER),
        vec![],
    );

    let handle = test_service(1)
        .try_connect(&params, &CancellationToken::new())
        .await
        .expect("command string is split into executable and args");

    let peer = handle.peer().await.unwrap();
    let echoed = call_text_tool(&peer, "echo", serde_json::json!({"message": "ping"})).await;
    assert_eq!(echoed, "ping");

    handle.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_missing_command_fails_without_retry() {
    let params = ServerParams::stdio("ghost", "upmux-no-such-command-anywhere", vec![]);
    let start = std::time::Instant::now();

    let result = test_service(3)
        .try_connect(&params, &CancellationToken::new())
        .await;

    match result {
        Err(ConnectError::CommandNotFound { command }) => {
            assert_eq!(command, "upmux-no-such-command-anywhere")
        }
        other => panic!("expected CommandNotFound, got {:?}", other.err()),
    }
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crash_before_handshake_exhausts_attempts() {
    let params = ServerParams::stdio(
        "crasher",
        MOCK_STDIO_SERVER,
        vec!["--exit-immediately".to_string()],
    );

    let result = test_service(3)
        .try_connect(&params, &CancellationToken::new())
        .await;

    match result {
        Err(ConnectError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(last.is_retryable(), "unexpected last error: {last}");
        }
        other => panic!("expected Exhausted, got {:?}", other.err()),
    }

    assert!(test_service(3)
        .connect(&params, &CancellationToken::new())
        .await
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stdio_args_untouched_by_docker_rewrite() {
    let config = super::test_config(1).with_rewrite_localhost(true);
    let service = upmux_gateway::pool::ConnectionService::new(&config);

    // The mock ignores its arguments; they only have to reach it unchanged
    let params = ServerParams::stdio(
        "proxy",
        MOCK_STDIO_SERVER,
        vec!["http://localhost:3000/sse".to_string()],
    );
    match service.factory().resolve(&params).unwrap() {
        upmux_gateway::pool::TransportBinding::Stdio { args, .. } => {
            assert_eq!(args, vec!["http://localhost:3000/sse".to_string()])
        }
        other => panic!("expected stdio binding, got {:?}", other),
    }

    let handle = service
        .try_connect(&params, &CancellationToken::new())
        .await
        .unwrap();
    handle.cleanup().await.unwrap();
}

#[cfg(target_os = "linux")]
mod child_lifetime {
    use std::path::Path;
    use std::time::{Duration, Instant};

    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;
    use upmux_core::ServerParams;
    use upmux_gateway::pool::{AddressNormalizer, ConnectError, Transport, TransportFactory};

    use super::super::{test_service, MOCK_STDIO_SERVER};

    /// Process state and process group from `/proc/<pid>/stat`
    fn proc_stat(pid: u32) -> Option<(char, u32)> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let mut fields = stat[stat.rfind(')')? + 1..].split_whitespace();
        let state = fields.next()?.chars().next()?;
        let _ppid = fields.next()?;
        let pgrp = fields.next()?.parse().ok()?;
        Some((state, pgrp))
    }

    /// Zombies count as gone; only reaping is left
    fn is_running(pid: u32) -> bool {
        matches!(proc_stat(pid), Some((state, _)) if state != 'Z' && state != 'X')
    }

    fn read_pids(path: &Path) -> Vec<u32> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect()
    }

    async fn wait_until_released(pids: &[u32]) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while pids.iter().any(|&pid| is_running(pid)) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        for &pid in pids {
            assert!(!is_running(pid), "child {pid} still running");
        }
    }

    fn hanging_server(pid_file: &Path) -> ServerParams {
        ServerParams::stdio(
            "hung",
            MOCK_STDIO_SERVER,
            vec!["--hang".to_string(), pid_file.display().to_string()],
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_hung_children_killed_after_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pids");

        let result = test_service(3)
            .with_timeout(Duration::from_secs(1))
            .try_connect(&hanging_server(&pid_file), &CancellationToken::new())
            .await;

        match result {
            Err(ConnectError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ConnectError::Timeout(_)), "{last}");
            }
            other => panic!("expected Exhausted, got {:?}", other.err()),
        }

        let pids = read_pids(&pid_file);
        assert_eq!(pids.len(), 3, "one child per attempt: {pids:?}");
        wait_until_released(&pids).await;
    }

    /// The child leads its own process group and dies with the abandoned attempt
    #[tokio::test(flavor = "multi_thread")]
    async fn test_child_in_own_process_group_and_killed_on_abort() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pids");

        let transport = TransportFactory::new(AddressNormalizer::disabled())
            .create(&hanging_server(&pid_file))
            .unwrap();
        let attempt = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            transport.connect(&cancel).await.map(|_| ())
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        let pid = loop {
            if let Some(&pid) = read_pids(&pid_file).first() {
                break pid;
            }
            assert!(Instant::now() < deadline, "child never started");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };

        let (_, pgrp) = proc_stat(pid).expect("child is alive");
        assert_eq!(pgrp, pid);

        attempt.abort();
        let _ = attempt.await;
        wait_until_released(&[pid]).await;
    }
}
