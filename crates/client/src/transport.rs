//! Transport layer.
//!
//! A session needs two things from the network: a long-lived event stream
//! (GET) and a way to deliver request bodies (POST). [`RpcTransport`] is the
//! seam; [`HttpTransport`] is the reqwest implementation used in production.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use sk_domain::config::SessionConfig;
use sk_domain::error::{Error, Result};
use sk_domain::stream::LineStream;

use crate::sse::line_stream;

/// Trait for session transports.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Open the event stream. Failing to connect, or a non-success status,
    /// is an [`Error::Connection`].
    async fn open_stream(&self, url: &Url) -> Result<LineStream>;

    /// POST a JSON body. The response body is not inspected; replies arrive
    /// on the event stream.
    async fn post(&self, url: &Url, body: &Value) -> Result<()>;

    /// Release pooled connections. Called once when the session closes.
    async fn shutdown(&self);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// reqwest-backed transport.
///
/// The client has no overall timeout because the stream stays open for the
/// whole session; POSTs carry their own per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(cfg: &SessionConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            request_timeout: cfg.request_timeout(),
        })
    }

    /// Decorate a `RequestBuilder` with the standard client headers.
    fn decorate(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        rb.header("X-Client-Type", "skywork-relay")
            .header("X-Trace-Id", Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn open_stream(&self, url: &Url) -> Result<LineStream> {
        tracing::debug!(host = url.host_str().unwrap_or(""), "opening event stream");

        let resp = self
            .decorate(self.http.get(url.clone()))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::Connection(format!("event stream request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Connection(format!(
                "event stream returned HTTP {status}: {body}"
            )));
        }

        Ok(line_stream(resp))
    }

    async fn post(&self, url: &Url, body: &Value) -> Result<()> {
        let resp = self
            .decorate(self.http.post(url.clone()))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Connection(format!("POST timed out: {e}"))
                } else {
                    Error::Connection(format!("POST failed: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Connection(format!(
                "POST returned HTTP {status}: {body}"
            )));
        }

        Ok(())
    }

    async fn shutdown(&self) {
        // reqwest drops pooled connections with the last client handle;
        // nothing to flush.
        tracing::debug!("http transport shut down");
    }
}
