//! Streamable HTTP upstream backed by rmcp's `StreamableHttpService`

use std::sync::Arc;

use axum::middleware;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tokio_util::sync::CancellationToken;

use crate::recorder::{record_requests, Gate, RequestLog};
use crate::{serve_router, TestServerHandler, TestUpstream};

/// Start a stateful streamable HTTP server at `/mcp`.
///
/// With `required_bearer` set, requests lacking `Authorization: Bearer <token>`
/// are answered with 401.
pub async fn start_streamable_http_server(
    handler: TestServerHandler,
    required_bearer: Option<&str>,
) -> TestUpstream {
    let ct = CancellationToken::new();
    let log = RequestLog::default();

    let service = StreamableHttpService::new(
        move || Ok(handler.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(std::time::Duration::from_secs(15)),
            sse_retry: Some(std::time::Duration::from_secs(3)),
            cancellation_token: ct.child_token(),
        },
    );

    let gate = Gate::new(log.clone(), required_bearer.map(str::to_string));
    let router = axum::Router::new()
        .nest_service("/mcp", service)
        .layer(middleware::from_fn_with_state(gate, record_requests));

    let addr = serve_router(router, &ct).await;
    let url = format!("http://127.0.0.1:{}/mcp", addr.port());
    TestUpstream::new(url, addr.port(), log, ct)
}
