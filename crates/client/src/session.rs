//! Protocol session lifecycle: connect → handshake → call → close.
//!
//! ```text
//! Disconnected ──connect()──▶ Discovering ──ok──▶ Connected(endpoint)
//!                                 │                   │
//!                          retries exhausted    close() / stream lost
//!                                 ▼                   ▼
//!                               Closed ◀──────────────┘
//! ```
//!
//! No transition leaves `Closed`. The endpoint is set exactly once, on the
//! `Discovering → Connected` edge, and dropped with the session state on
//! close.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use sk_domain::config::{Credentials, SessionConfig};
use sk_domain::error::{Error, Result};
use sk_domain::trace::{millis, TraceEvent};

use crate::correlator::{CallOutcome, PendingGuard, RpcCorrelator};
use crate::discovery::{EndpointDiscoverer, StreamReader};
use crate::protocol::{
    self, initialize_params, remote_error, Frame, JsonRpcNotification, JsonRpcRequest,
    ToolCallParams,
};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::signing::signed_stream_url;
use crate::transport::{HttpTransport, RpcTransport};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Discovering,
    Connected(Url),
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Discovering => f.write_str("discovering"),
            SessionState::Connected(url) => write!(f, "connected to {url}"),
            SessionState::Closed => f.write_str("closed"),
        }
    }
}

struct Inner {
    state: SessionState,
    reader: Option<StreamReader>,
    torn_down: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProtocolSession
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One streaming-discovery RPC session.
///
/// All methods take `&self`; share the session behind an `Arc` to issue
/// calls concurrently. Responses are matched by id, not by order.
pub struct ProtocolSession {
    config: SessionConfig,
    credentials: Credentials,
    transport: Arc<dyn RpcTransport>,
    correlator: Arc<RpcCorrelator>,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
    /// Held for the whole handshake so tool calls queue behind it.
    handshake_done: tokio::sync::Mutex<bool>,
    next_id: AtomicU64,
}

impl ProtocolSession {
    /// Build a session over the reqwest transport.
    pub fn new(config: SessionConfig, credentials: Credentials) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, credentials, Arc::new(transport)))
    }

    pub fn with_transport(
        config: SessionConfig,
        credentials: Credentials,
        transport: Arc<dyn RpcTransport>,
    ) -> Self {
        Self {
            config,
            credentials,
            transport,
            correlator: Arc::new(RpcCorrelator::new()),
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner {
                state: SessionState::Disconnected,
                reader: None,
                torn_down: false,
            }),
            handshake_done: tokio::sync::Mutex::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state. A `Connected` session whose stream has died is
    /// reported (and recorded) as `Closed`.
    pub fn state(&self) -> SessionState {
        let mut inner = self.inner.lock();
        self.observe_stream_loss(&mut inner);
        inner.state.clone()
    }

    /// The resolved RPC endpoint, while connected.
    pub fn endpoint(&self) -> Option<Url> {
        match self.state() {
            SessionState::Connected(url) => Some(url),
            _ => None,
        }
    }

    /// Number of requests awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.correlator.len()
    }

    /// Next request id; starts at 1 and only increases.
    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ── lifecycle ────────────────────────────────────────────────────

    /// Discover the RPC endpoint, retrying with exponential back-off.
    ///
    /// Only valid from `Disconnected`. Failure leaves the session `Closed`.
    pub async fn connect(&self) -> Result<()> {
        self.config.ensure_valid()?;

        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Disconnected {
                return Err(Error::State(format!(
                    "connect() called while {}",
                    inner.state
                )));
            }
            inner.state = SessionState::Discovering;
        }

        match self.discover_with_retry().await {
            Ok(discovery) => {
                let stale = {
                    let mut inner = self.inner.lock();
                    if inner.state == SessionState::Discovering {
                        inner.state = SessionState::Connected(discovery.endpoint.clone());
                        inner.reader = Some(discovery.reader);
                        None
                    } else {
                        Some(discovery.reader)
                    }
                };

                match stale {
                    None => {
                        tracing::info!(endpoint = %discovery.endpoint, "session connected");
                        Ok(())
                    }
                    Some(reader) => {
                        reader.shutdown().await;
                        Err(Error::Cancelled("session closed during discovery".into()))
                    }
                }
            }
            Err(e) => {
                self.inner.lock().state = SessionState::Closed;
                self.correlator.close("endpoint discovery failed");
                tracing::error!(error = %e, "endpoint discovery failed");
                Err(e)
            }
        }
    }

    async fn discover_with_retry(&self) -> Result<crate::discovery::Discovery> {
        let stream_url = signed_stream_url(&self.config.base_url, &self.credentials)?;
        let base_url = Url::parse(&self.config.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL: {e}")))?;
        let discoverer = EndpointDiscoverer::new(self.transport.clone(), self.correlator.clone());
        let timeout = self.config.endpoint_timeout();

        run_with_retry(
            RetryPolicy::from_config(&self.config),
            &self.cancel,
            |attempt| {
                let discoverer = &discoverer;
                let stream_url = &stream_url;
                let base_url = &base_url;
                async move {
                    tracing::debug!(attempt = attempt + 1, "discovering endpoint");
                    discoverer
                        .discover(stream_url, base_url, timeout, &self.cancel)
                        .await
                }
            },
        )
        .await
    }

    /// Run the `initialize` → `notifications/initialized` exchange.
    ///
    /// Must succeed once before [`call_tool`](Self::call_tool); a second
    /// handshake is refused.
    pub async fn initialize_handshake(&self) -> Result<()> {
        let mut done = self.handshake_done.lock().await;
        if *done {
            return Err(Error::State("handshake already completed".into()));
        }

        let params = serde_json::to_value(initialize_params(&self.config))?;
        let frame = self
            .call("initialize", Some(params), self.next_request_id())
            .await?;
        if let Some(err) = remote_error(&frame) {
            return Err(err);
        }

        self.notify("notifications/initialized", None).await?;
        *done = true;

        tracing::info!("JSON-RPC handshake completed");
        Ok(())
    }

    /// Cancel the stream reader, cancel every pending call, and release the
    /// transport. Safe to call more than once.
    pub async fn close(&self) {
        let reader = {
            let mut inner = self.inner.lock();
            if inner.torn_down {
                return;
            }
            inner.torn_down = true;
            inner.state = SessionState::Closed;
            inner.reader.take()
        };

        self.cancel.cancel();
        if let Some(reader) = reader {
            reader.shutdown().await;
        }

        let cancelled_calls = self.correlator.close("session closed");
        self.transport.shutdown().await;

        TraceEvent::SessionClosed { cancelled_calls }.emit();
        tracing::info!(cancelled_calls, "session closed");
    }

    // ── requests ─────────────────────────────────────────────────────

    /// Send one request and wait for the frame that answers it.
    ///
    /// The returned frame may carry `error`; interpreting it is up to the
    /// caller. A timeout fails only this call.
    pub async fn call(&self, method: &str, params: Option<Value>, id: u64) -> Result<Frame> {
        let endpoint = self.live_endpoint()?;

        let handle = self.correlator.register(id)?;
        let _guard = PendingGuard::new(self.correlator.clone(), id);

        let body = serde_json::to_value(JsonRpcRequest::new(id, method, params))?;
        let started = Instant::now();

        tracing::debug!(id, method, "sending request");

        // One deadline covers both the POST and the reply on the stream.
        let timeout = self.config.request_timeout();
        let exchange = async {
            self.transport.post(&endpoint, &body).await?;
            Ok::<_, Error>(handle.wait().await)
        };
        let (result, outcome) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(CallOutcome::Response(frame))) => {
                let outcome = if frame.contains_key("error") { "error" } else { "result" };
                (Ok(frame), outcome)
            }
            Ok(Ok(CallOutcome::Cancelled(reason))) => (Err(Error::Cancelled(reason)), "cancelled"),
            Ok(Err(e)) => (Err(e), "post_failed"),
            Err(_) => {
                tracing::warn!(id, method, timeout_ms = millis(timeout), "request timed out");
                (Err(Error::RpcTimeout(method.to_string())), "timeout")
            }
        };

        TraceEvent::RpcCompleted {
            method: method.to_string(),
            id,
            duration_ms: millis(started.elapsed()),
            outcome: outcome.to_string(),
        }
        .emit();

        result
    }

    /// POST a notification; nothing is awaited on the stream.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let endpoint = self.live_endpoint()?;
        let body = serde_json::to_value(JsonRpcNotification::new(method, params))?;
        tracing::debug!(method, "sending notification");
        self.transport.post(&endpoint, &body).await
    }

    /// Invoke a remote tool and return its concatenated text output.
    ///
    /// A JSON-RPC `error` in the response becomes [`Error::Remote`].
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        if !*self.handshake_done.lock().await {
            return Err(Error::State("handshake not completed".into()));
        }

        let params = serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments,
        })?;
        let frame = self
            .call("tools/call", Some(params), self.next_request_id())
            .await?;
        protocol::tool_call_text(&frame)
    }

    // ── helpers ──────────────────────────────────────────────────────

    fn live_endpoint(&self) -> Result<Url> {
        let mut inner = self.inner.lock();
        if self.observe_stream_loss(&mut inner) {
            return Err(Error::Connection("event stream closed".into()));
        }
        match &inner.state {
            SessionState::Connected(url) => Ok(url.clone()),
            other => Err(Error::State(format!("session is {other}"))),
        }
    }

    /// Move `Connected → Closed` if the reader has stopped. Returns whether
    /// that transition happened now.
    fn observe_stream_loss(&self, inner: &mut Inner) -> bool {
        if !matches!(inner.state, SessionState::Connected(_)) {
            return false;
        }
        let reader_gone = inner.reader.as_ref().map_or(true, StreamReader::is_finished);
        if reader_gone || self.correlator.is_closed() {
            tracing::warn!("event stream lost; session closed");
            inner.state = SessionState::Closed;
            return true;
        }
        false
    }
}

impl Drop for ProtocolSession {
    fn drop(&mut self) {
        // Stops the reader task if close() was never awaited.
        self.cancel.cancel();
    }
}
