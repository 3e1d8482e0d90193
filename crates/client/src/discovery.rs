//! Endpoint discovery and the background stream reader.
//!
//! Discovery opens the event stream and spawns the task that reads it. The
//! same task keeps running after the endpoint is announced: from then on it
//! feeds response frames to the [`RpcCorrelator`] for the rest of the
//! session. Only the first valid announcement is honoured.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use sk_domain::error::{Error, Result};
use sk_domain::stream::LineStream;
use sk_domain::trace::{millis, TraceEvent};

use crate::correlator::RpcCorrelator;
use crate::endpoint::resolve_candidate;
use crate::sse::{parse_line, StreamEvent};
use crate::transport::RpcTransport;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream reader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle to the task reading one event stream.
#[derive(Debug)]
pub struct StreamReader {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamReader {
    fn spawn(lines: LineStream, ctx: ReaderContext) -> Self {
        let cancel = ctx.cancel.clone();
        let handle = tokio::spawn(read_stream(lines, ctx));
        Self { cancel, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the pending read and wait for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::warn!(error = %e, "event stream reader panicked");
            }
        }
    }
}

struct ReaderContext {
    base_url: Url,
    correlator: Arc<RpcCorrelator>,
    /// First-writer-wins slot for the discovery outcome.
    ready: Option<oneshot::Sender<Result<Url>>>,
    /// Most recent candidate that failed validation.
    rejected: Arc<Mutex<Option<String>>>,
    cancel: CancellationToken,
}

enum ReaderExit {
    Cancelled,
    Ended,
    Failed(Error),
}

async fn read_stream(mut lines: LineStream, mut ctx: ReaderContext) {
    // Whether discovery accepted our announcement; only then does this
    // stream own the session's pending calls.
    let mut adopted = false;

    let exit = loop {
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => break ReaderExit::Cancelled,
            next = lines.next() => next,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => break ReaderExit::Failed(e),
            None => break ReaderExit::Ended,
        };

        match parse_line(&line, ctx.ready.is_some()) {
            Ok(StreamEvent::EndpointCandidate(candidate)) => {
                match resolve_candidate(&candidate, &ctx.base_url) {
                    Some(endpoint) => {
                        if let Some(tx) = ctx.ready.take() {
                            adopted = tx.send(Ok(endpoint)).is_ok();
                            if !adopted {
                                tracing::debug!("endpoint announced after discovery gave up");
                            }
                        }
                    }
                    None => {
                        TraceEvent::EndpointRejected {
                            candidate: candidate.clone(),
                        }
                        .emit();
                        *ctx.rejected.lock() = Some(candidate);
                    }
                }
            }
            Ok(StreamEvent::RpcFrame(frame)) => {
                ctx.correlator.on_frame(frame);
            }
            Ok(StreamEvent::Ignore) => {}
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed stream line");
            }
        }
    };

    let reason = match exit {
        ReaderExit::Cancelled => {
            tracing::debug!("event stream reader cancelled");
            return;
        }
        ReaderExit::Ended => "event stream closed".to_string(),
        ReaderExit::Failed(e) => e.to_string(),
    };

    if let Some(tx) = ctx.ready.take() {
        let _ = tx.send(Err(Error::Connection(format!(
            "{reason} before an endpoint was announced"
        ))));
    } else if adopted {
        let cancelled = ctx.correlator.close(&reason);
        tracing::warn!(reason = %reason, cancelled, "event stream lost");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discoverer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A successful discovery: the validated endpoint plus the still-running
/// reader of the stream that announced it.
#[derive(Debug)]
pub struct Discovery {
    pub endpoint: Url,
    pub reader: StreamReader,
}

pub struct EndpointDiscoverer {
    transport: Arc<dyn RpcTransport>,
    correlator: Arc<RpcCorrelator>,
}

impl EndpointDiscoverer {
    pub fn new(transport: Arc<dyn RpcTransport>, correlator: Arc<RpcCorrelator>) -> Self {
        Self {
            transport,
            correlator,
        }
    }

    /// Run one discovery attempt.
    ///
    /// `timeout` covers opening the stream and waiting for a valid
    /// announcement. Errors:
    /// - [`Error::Connection`] if the stream fails to open or breaks first;
    /// - [`Error::Validation`] if only rejected candidates were seen;
    /// - [`Error::DiscoveryTimeout`] if nothing usable arrived in time;
    /// - [`Error::Cancelled`] if `cancel` fires.
    ///
    /// On any error the reader is shut down before returning.
    pub async fn discover(
        &self,
        stream_url: &Url,
        base_url: &Url,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Discovery> {
        let started = Instant::now();
        let deadline = started + timeout;

        let lines = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled("discovery cancelled".into()));
            }
            opened = tokio::time::timeout_at(deadline, self.transport.open_stream(stream_url)) => {
                opened.map_err(|_| Error::DiscoveryTimeout(timeout))??
            }
        };

        let (ready_tx, mut ready_rx) = oneshot::channel();
        let rejected = Arc::new(Mutex::new(None));
        let reader = StreamReader::spawn(
            lines,
            ReaderContext {
                base_url: base_url.clone(),
                correlator: self.correlator.clone(),
                ready: Some(ready_tx),
                rejected: rejected.clone(),
                cancel: cancel.child_token(),
            },
        );

        // Cancellation also stops the reader, which drops `ready_tx`; polling
        // the token first keeps that from surfacing as a connection error.
        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = tokio::time::timeout_at(deadline, &mut ready_rx) => Some(r),
        };

        let outcome = match waited {
            None => Err(Error::Cancelled("discovery cancelled".into())),
            Some(Ok(Ok(result))) => result,
            Some(Ok(Err(_))) if cancel.is_cancelled() => {
                Err(Error::Cancelled("discovery cancelled".into()))
            }
            Some(Ok(Err(_))) => Err(Error::Connection(
                "event stream reader exited before announcing an endpoint".into(),
            )),
            Some(Err(_elapsed)) => {
                // Close first so a late announcement cannot slip in between.
                ready_rx.close();
                match ready_rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(match rejected.lock().take() {
                        Some(candidate) => Error::Validation(candidate),
                        None => Error::DiscoveryTimeout(timeout),
                    }),
                }
            }
        };

        match outcome {
            Ok(endpoint) => {
                let duration_ms = millis(started.elapsed());
                TraceEvent::EndpointDiscovered {
                    endpoint: endpoint.to_string(),
                    duration_ms,
                }
                .emit();
                tracing::info!(endpoint = %endpoint, duration_ms, "discovered endpoint");
                Ok(Discovery { endpoint, reader })
            }
            Err(e) => {
                reader.shutdown().await;
                Err(e)
            }
        }
    }
}
