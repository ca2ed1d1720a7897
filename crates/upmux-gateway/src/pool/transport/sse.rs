//! SSE transport for MCP servers
//!
//! The client keeps a GET open on the server's event stream. The first
//! `endpoint` event names the URL that client messages are POSTed to; server
//! messages arrive as `message` events on the same stream.
//!
//! Every request of a session, including stream reconnects, goes through one
//! `reqwest::Client` whose default headers carry the bearer token.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use parking_lot::{Mutex, RwLock};
use reqwest::header::ACCEPT;
use rmcp::service::{RxJsonRpcMessage, TxJsonRpcMessage};
use rmcp::{RoleClient, ServiceExt};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};
use upmux_core::{ServerParamsError, TransportType};
use url::Url;

use super::sse_codec::{SseDecoder, SseEvent};
use super::{HttpBinding, Transport};
use crate::pool::address::AddressNormalizer;
use crate::pool::client::{create_client_handler, McpClient};
use crate::pool::error::ConnectError;

/// Stream reconnects tried in a row before the session is abandoned
const MAX_STREAM_RECONNECTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const LAST_EVENT_ID: &str = "Last-Event-ID";

/// SSE transport for legacy HTTP+SSE MCP servers
pub struct SseTransport {
    server_name: String,
    binding: HttpBinding,
    normalizer: AddressNormalizer,
    /// Session started by an attempt that has not handed it to a client yet
    pending: Mutex<Option<CancellationToken>>,
}

impl SseTransport {
    pub fn new(server_name: String, binding: HttpBinding, normalizer: AddressNormalizer) -> Self {
        Self {
            server_name,
            binding,
            normalizer,
            pending: Mutex::new(None),
        }
    }

    /// Open the event stream and wait for the server to name its message
    /// endpoint.
    async fn open_session(
        &self,
        http: &reqwest::Client,
        sse_url: &Url,
    ) -> Result<(EventStream, Url, SseEvent), ConnectError> {
        let mut stream = EventStream::open(http, sse_url, None).await?;

        while let Some(event) = stream.next_event().await {
            if event.event == "endpoint" {
                let endpoint = resolve_endpoint(sse_url, &event.data, &self.normalizer)?;
                return Ok((stream, endpoint, event));
            }
            debug!(
                server = %self.server_name,
                event = %event.event,
                "Ignoring SSE event received before endpoint"
            );
        }

        Err(ConnectError::Unreachable(format!(
            "{} closed the event stream before sending an endpoint",
            sse_url
        )))
    }
}

#[async_trait]
impl Transport for SseTransport {
    type Client = McpClient;

    async fn connect(&self, cancel: &CancellationToken) -> Result<McpClient, ConnectError> {
        info!(
            server = %self.server_name,
            url = %self.binding.url(),
            "Connecting to SSE server"
        );

        let http = self.binding.build_http_client()?;
        let sse_url = Url::parse(self.binding.url()).map_err(|e| {
            ConnectError::Config(ServerParamsError::InvalidUrl {
                url: self.binding.url().to_string(),
                reason: e.to_string(),
            })
        })?;

        let (stream, endpoint, endpoint_event) = tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
            opened = self.open_session(&http, &sse_url) => opened?,
        };

        debug!(
            server = %self.server_name,
            endpoint = %endpoint,
            "Received message endpoint"
        );

        let session = CancellationToken::new();
        *self.pending.lock() = Some(session.clone());

        let state = Arc::new(SessionState {
            endpoint: RwLock::new(endpoint),
            last_event_id: Mutex::new(endpoint_event.id),
        });
        let reconnect_delay = endpoint_event
            .retry
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RECONNECT_DELAY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded();
        let (outbound_tx, outbound_rx) = mpsc::unbounded();

        let reader = EventReader {
            server_name: self.server_name.clone(),
            http: http.clone(),
            sse_url,
            normalizer: self.normalizer.clone(),
            state: Arc::clone(&state),
            inbound: inbound_tx,
            session: session.clone(),
        };
        tokio::spawn(reader.run(stream, reconnect_delay));
        tokio::spawn(post_messages(
            self.server_name.clone(),
            http,
            state,
            outbound_rx,
            session.clone(),
        ));

        let inbound = SseInbound {
            rx: inbound_rx,
            _guard: session.drop_guard(),
        };

        let client = create_client_handler(&self.server_name)
            .serve((outbound_tx, inbound))
            .await
            .map_err(|e| {
                let err = ConnectError::Handshake(e.to_string());
                error!(server = %self.server_name, "{}", err);
                err
            })?;

        // The running client owns the session from here on
        self.pending.lock().take();

        info!(server = %self.server_name, "SSE server connected");
        Ok(client)
    }

    async fn close(&self) -> Result<(), ConnectError> {
        if let Some(session) = self.pending.lock().take() {
            debug!(server = %self.server_name, "Stopping SSE session of failed attempt");
            session.cancel();
        }
        Ok(())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Sse
    }

    fn description(&self) -> String {
        format!("sse:{}", self.binding.url())
    }
}

/// Resolve an `endpoint` event against the stream URL.
///
/// Relative endpoints inherit the (already normalized) stream host; absolute
/// ones are normalized like any configured URL.
fn resolve_endpoint(
    sse_url: &Url,
    data: &str,
    normalizer: &AddressNormalizer,
) -> Result<Url, ConnectError> {
    let joined = sse_url
        .join(data.trim())
        .map_err(|e| ConnectError::Handshake(format!("invalid endpoint {:?}: {}", data, e)))?;
    let normalized = normalizer.normalize(joined.as_str());
    Url::parse(&normalized)
        .map_err(|e| ConnectError::Handshake(format!("invalid endpoint {:?}: {}", normalized, e)))
}

struct SessionState {
    endpoint: RwLock<Url>,
    last_event_id: Mutex<Option<String>>,
}

/// Decoded view over one GET response
struct EventStream {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
}

impl EventStream {
    async fn open(
        http: &reqwest::Client,
        url: &Url,
        last_event_id: Option<&str>,
    ) -> Result<Self, ConnectError> {
        let mut request = http.get(url.clone()).header(ACCEPT, "text/event-stream");
        if let Some(id) = last_event_id {
            request = request.header(LAST_EVENT_ID, id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConnectError::Unreachable(format!("{}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectError::Unreachable(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        Ok(Self {
            bytes: response.bytes_stream().map_ok(|b| b.to_vec()).boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        })
    }

    /// Next event, or `None` once the response has ended or failed
    async fn next_event(&mut self) -> Option<SseEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.feed(&chunk)),
                Some(Err(e)) => {
                    debug!(error = %e, "Event stream read failed");
                    return None;
                }
                None => return None,
            }
        }
    }
}

/// Background half that turns stream events into inbound messages
struct EventReader {
    server_name: String,
    http: reqwest::Client,
    sse_url: Url,
    normalizer: AddressNormalizer,
    state: Arc<SessionState>,
    inbound: UnboundedSender<RxJsonRpcMessage<RoleClient>>,
    session: CancellationToken,
}

impl EventReader {
    async fn run(self, mut stream: EventStream, mut delay: Duration) {
        let mut failures = 0u32;

        loop {
            let next = tokio::select! {
                _ = self.session.cancelled() => break,
                next = stream.next_event() => next,
            };

            match next {
                Some(event) => {
                    failures = 0;
                    if let Some(id) = &event.id {
                        *self.state.last_event_id.lock() = Some(id.clone());
                    }
                    if let Some(ms) = event.retry {
                        delay = Duration::from_millis(ms);
                    }
                    if !self.dispatch(event) {
                        break;
                    }
                }
                None => match self.reopen(&mut failures, delay).await {
                    Some(reopened) => stream = reopened,
                    None => break,
                },
            }
        }

        // Dropping `inbound` ends the client's receive side
        self.session.cancel();
        debug!(server = %self.server_name, "SSE reader stopped");
    }

    /// Returns false once the client side has gone away.
    fn dispatch(&self, event: SseEvent) -> bool {
        match event.event.as_str() {
            "message" => {
                if event.data.is_empty() {
                    return true;
                }
                match serde_json::from_str::<RxJsonRpcMessage<RoleClient>>(&event.data) {
                    Ok(message) => self.inbound.unbounded_send(message).is_ok(),
                    Err(e) => {
                        warn!(server = %self.server_name, error = %e, "Dropping malformed SSE message");
                        true
                    }
                }
            }
            "endpoint" => {
                match resolve_endpoint(&self.sse_url, &event.data, &self.normalizer) {
                    Ok(endpoint) => {
                        debug!(server = %self.server_name, endpoint = %endpoint, "Message endpoint changed");
                        *self.state.endpoint.write() = endpoint;
                    }
                    Err(e) => warn!(server = %self.server_name, error = %e, "Ignoring bad endpoint event"),
                }
                true
            }
            other => {
                debug!(server = %self.server_name, event = %other, "Ignoring SSE event");
                true
            }
        }
    }

    async fn reopen(&self, failures: &mut u32, delay: Duration) -> Option<EventStream> {
        while *failures < MAX_STREAM_RECONNECTS {
            *failures += 1;
            warn!(
                server = %self.server_name,
                attempt = *failures,
                delay_ms = delay.as_millis() as u64,
                "SSE stream ended, reconnecting"
            );

            tokio::select! {
                _ = self.session.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let last_event_id = self.state.last_event_id.lock().clone();
            match EventStream::open(&self.http, &self.sse_url, last_event_id.as_deref()).await {
                Ok(stream) => {
                    info!(server = %self.server_name, "SSE stream reconnected");
                    return Some(stream);
                }
                Err(e) => warn!(server = %self.server_name, error = %e, "SSE reconnect failed"),
            }
        }

        error!(
            server = %self.server_name,
            attempts = MAX_STREAM_RECONNECTS,
            "SSE stream lost, closing session"
        );
        None
    }
}

/// Background half that POSTs outbound messages to the current endpoint.
///
/// A rejected or failed POST ends the whole session.
async fn post_messages(
    server_name: String,
    http: reqwest::Client,
    state: Arc<SessionState>,
    mut outbound: UnboundedReceiver<TxJsonRpcMessage<RoleClient>>,
    session: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = session.cancelled() => break,
            next = outbound.next() => match next {
                Some(message) => message,
                None => break,
            },
        };

        let endpoint = state.endpoint.read().clone();
        match http.post(endpoint).json(&message).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(server = %server_name, status = %response.status(), "Upstream rejected message, closing session");
                break;
            }
            Err(e) => {
                warn!(server = %server_name, error = %e, "Failed to post message, closing session");
                break;
            }
        }
    }

    session.cancel();
    debug!(server = %server_name, "SSE writer stopped");
}

/// Receive side handed to the client; dropping it stops both background
/// tasks.
struct SseInbound {
    rx: UnboundedReceiver<RxJsonRpcMessage<RoleClient>>,
    _guard: DropGuard,
}

impl Stream for SseInbound {
    type Item = RxJsonRpcMessage<RoleClient>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}
