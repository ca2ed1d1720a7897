//! Request recording middleware for the in-process upstreams

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;

/// What the upstream saw of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub last_event_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<RecordedRequest>>>);

impl RequestLog {
    pub fn record(&self, method: &str, path: &str, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.0.lock().push(RecordedRequest {
            method: method.to_string(),
            path: path.to_string(),
            authorization: header("authorization"),
            last_event_id: header("last-event-id"),
        });
    }

    pub fn snapshot(&self) -> Vec<RecordedRequest> {
        self.0.lock().clone()
    }
}

/// Middleware state: where to record, and which bearer token (if any) to
/// insist on
#[derive(Debug, Clone)]
pub struct Gate {
    pub log: RequestLog,
    pub required_bearer: Option<Arc<str>>,
}

impl Gate {
    pub fn new(log: RequestLog, required_bearer: Option<String>) -> Self {
        Self {
            log,
            required_bearer: required_bearer.map(Arc::from),
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.required_bearer {
            None => true,
            Some(token) => headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == format!("Bearer {}", token)),
        }
    }
}

/// Record every request, rejecting it with 401 when the gate demands a
/// bearer token it did not carry
pub async fn record_requests(State(gate): State<Gate>, req: Request, next: Next) -> Response {
    gate.log
        .record(req.method().as_str(), req.uri().path(), req.headers());

    if !gate.authorized(req.headers()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(req).await
}
