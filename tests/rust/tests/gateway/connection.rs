//! Connection service behavior across several upstreams

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use upmux_core::{ServerParams, TransportType};
use upmux_gateway::pool::ConnectError;

use super::{test_service, MOCK_STDIO_SERVER};

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_all_isolates_failures() {
    let servers = vec![
        ServerParams::stdio("good", MOCK_STDIO_SERVER, vec![]),
        ServerParams {
            name: "websocket".to_string(),
            transport: Some("websocket".to_string()),
            url: Some("ws://localhost:9000".to_string()),
            ..Default::default()
        },
        ServerParams::stdio("missing", "upmux-no-such-command-anywhere", vec![]),
    ];

    let results = test_service(1)
        .connect_all(&servers, &CancellationToken::new())
        .await;

    let names: Vec<&str> = results.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["good", "websocket", "missing"]);

    let handle = results[0].1.as_ref().expect("good upstream connects");
    assert_eq!(handle.transport_type(), TransportType::Stdio);
    assert!(matches!(results[1].1, Err(ConnectError::Config(_))));
    assert!(matches!(
        results[2].1,
        Err(ConnectError::CommandNotFound { .. })
    ));

    handle.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_token_prevents_connect() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let params = ServerParams::stdio("mock", MOCK_STDIO_SERVER, vec![]);
    let result = test_service(3).try_connect(&params, &cancel).await;

    assert!(matches!(result, Err(ConnectError::Cancelled)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_cleanup_of_live_connection() {
    let params = ServerParams::stdio("mock", MOCK_STDIO_SERVER, vec![]);
    let handle = test_service(1)
        .try_connect(&params, &CancellationToken::new())
        .await
        .unwrap();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.cleanup().await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    assert!(handle.is_closed().await);
    assert!(handle.client().await.is_none());
}
