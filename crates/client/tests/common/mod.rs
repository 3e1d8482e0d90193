//! Scripted in-memory transport shared by the session tests.
//!
//! Each `open_stream` call consumes the next [`Script`]. Request bodies are
//! recorded and handed to an optional responder whose output lines are
//! pushed onto the most recently opened stream, the way the real server
//! answers POSTs on the event stream.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use url::Url;

use sk_client::RpcTransport;
use sk_domain::config::{Credentials, SessionConfig};
use sk_domain::error::{Error, Result};
use sk_domain::stream::LineStream;

pub const BASE_URL: &str = "https://api.example.com/open/sse";

/// Short timeouts so paused-clock tests stay readable.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        base_url: BASE_URL.into(),
        endpoint_timeout_ms: 100,
        request_timeout_ms: 1_000,
        max_retries: 3,
        retry_delay_ms: 10,
        ..SessionConfig::default()
    }
}

pub fn creds() -> Credentials {
    Credentials::new("id", "key")
}

pub fn data(payload: impl std::fmt::Display) -> String {
    format!("data: {payload}")
}

/// What one `open_stream` call does.
pub enum Script {
    /// Fail to open with a connection error.
    Fail(String),
    /// Yield `lines`, then either stay open (answering POSTs) or end.
    Stream { lines: Vec<String>, keep_open: bool },
}

impl Script {
    /// An open stream that announces `endpoint` first.
    pub fn announce(endpoint: &str) -> Self {
        Script::Stream {
            lines: vec!["event: endpoint".into(), data(endpoint)],
            keep_open: true,
        }
    }

    /// An open stream that never says anything.
    pub fn silent() -> Self {
        Script::Stream {
            lines: Vec::new(),
            keep_open: true,
        }
    }
}

pub type Responder = Box<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    live: Mutex<Option<mpsc::UnboundedSender<Result<String>>>>,
    responder: Mutex<Option<Responder>>,
    posted: Mutex<Vec<(Url, Value)>>,
    opened: Mutex<Vec<Url>>,
    post_delay: Mutex<Option<Duration>>,
    shutdowns: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn respond_with(&self, responder: Responder) {
        *self.responder.lock() = Some(responder);
    }

    /// Push a raw line onto the live stream.
    pub fn push_line(&self, line: impl Into<String>) {
        if let Some(tx) = self.live.lock().as_ref() {
            let _ = tx.send(Ok(line.into()));
        }
    }

    /// End the live stream as if the server hung up.
    pub fn hang_up(&self) {
        self.live.lock().take();
    }

    /// Make every POST take `delay` before it is accepted.
    pub fn set_post_delay(&self, delay: Duration) {
        *self.post_delay.lock() = Some(delay);
    }

    /// True once nothing is reading the live stream any more.
    pub fn stream_released(&self) -> bool {
        self.live.lock().as_ref().map_or(true, |tx| tx.is_closed())
    }

    pub fn opens(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn opened_urls(&self) -> Vec<Url> {
        self.opened.lock().clone()
    }

    pub fn posted(&self) -> Vec<(Url, Value)> {
        self.posted.lock().clone()
    }

    pub fn posted_methods(&self) -> Vec<String> {
        self.posted
            .lock()
            .iter()
            .map(|(_, body)| body["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn open_stream(&self, url: &Url) -> Result<LineStream> {
        self.opened.lock().push(url.clone());

        let script = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Connection("no scripted stream left".into()))?;

        match script {
            Script::Fail(msg) => Err(Error::Connection(msg)),
            Script::Stream { lines, keep_open } => {
                let (tx, rx) = mpsc::unbounded_channel();
                for line in lines {
                    let _ = tx.send(Ok(line));
                }
                if keep_open {
                    *self.live.lock() = Some(tx);
                }
                let stream = futures_util::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(Box::pin(stream))
            }
        }
    }

    async fn post(&self, url: &Url, body: &Value) -> Result<()> {
        self.posted.lock().push((url.clone(), body.clone()));

        let delay = *self.post_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let replies = match self.responder.lock().as_ref() {
            Some(respond) => respond(body),
            None => Vec::new(),
        };
        for line in replies {
            self.push_line(line);
        }
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

// ── canned server behaviour ──────────────────────────────────────────

/// Answers `initialize` with an empty result and `tools/call` with
/// `tool_reply` (a frame fragment such as `{"result": ..}` or
/// `{"error": ..}`). Notifications get no reply.
pub fn office_server(tool_reply: Value) -> Responder {
    Box::new(move |body: &Value| {
        let Some(id) = body.get("id").cloned() else {
            return Vec::new();
        };
        let mut frame = match body["method"].as_str() {
            Some("initialize") => json!({
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "office", "version": "1.0" }
                }
            }),
            Some("tools/call") => tool_reply.clone(),
            _ => return Vec::new(),
        };
        frame["jsonrpc"] = json!("2.0");
        frame["id"] = id;
        vec![data(frame)]
    })
}

pub fn text_result(text: &str) -> Value {
    json!({ "result": { "content": [{ "type": "text", "text": text }] } })
}
