//! In-flight request table.
//!
//! Responses arrive on the event stream, not on the POST that carried the
//! request, so every outstanding request id maps to a oneshot that the
//! stream reader completes. The table is the only state shared between the
//! reader task and callers; a single mutex serialises both sides.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use sk_domain::error::{Error, Result};
use sk_domain::trace::millis;

use crate::protocol::Frame;

/// How a pending call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The full response frame (`result` or `error`).
    Response(Frame),
    /// Torn down before a response arrived.
    Cancelled(String),
}

/// What [`RpcCorrelator::on_frame`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Resolved(u64),
    /// Server-originated request or notification; never answered.
    Notification,
    /// No pending call for this id (late, duplicate, or foreign).
    Unmatched,
    /// Neither a notification nor a `result`/`error` response.
    Malformed,
}

struct PendingCall {
    tx: oneshot::Sender<CallOutcome>,
    created_at: Instant,
}

#[derive(Default)]
struct Table {
    pending: HashMap<u64, PendingCall>,
    /// Set once the stream is gone; later registrations are refused.
    closed: Option<String>,
}

/// Awaitable handle for one registered request.
#[derive(Debug)]
pub struct PendingHandle {
    id: u64,
    rx: oneshot::Receiver<CallOutcome>,
}

impl PendingHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the outcome. A dropped sender counts as cancellation.
    pub async fn wait(self) -> CallOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| CallOutcome::Cancelled("pending call dropped".into()))
    }
}

#[derive(Default)]
pub struct RpcCorrelator {
    table: Mutex<Table>,
}

impl RpcCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending entry for `id`.
    ///
    /// Fails if `id` is already pending or the correlator has been closed.
    pub fn register(&self, id: u64) -> Result<PendingHandle> {
        let mut table = self.table.lock();
        if let Some(reason) = &table.closed {
            return Err(Error::Connection(reason.clone()));
        }
        if table.pending.contains_key(&id) {
            return Err(Error::Protocol(format!("request id {id} is already pending")));
        }

        let (tx, rx) = oneshot::channel();
        table.pending.insert(
            id,
            PendingCall {
                tx,
                created_at: Instant::now(),
            },
        );
        Ok(PendingHandle { id, rx })
    }

    /// Remove `id` without resolving it. Returns whether it was pending.
    pub fn deregister(&self, id: u64) -> bool {
        self.table.lock().pending.remove(&id).is_some()
    }

    /// Route one incoming frame to its pending call.
    pub fn on_frame(&self, frame: Frame) -> FrameDisposition {
        if let Some(method) = frame.get("method") {
            tracing::debug!(method = %method, "ignoring server-initiated message");
            return FrameDisposition::Notification;
        }

        let Some(id) = frame.get("id").and_then(Value::as_u64) else {
            let frame = Value::Object(frame);
            tracing::debug!(frame = %frame, "dropping frame without numeric id");
            return FrameDisposition::Malformed;
        };

        if !frame.contains_key("result") && !frame.contains_key("error") {
            tracing::debug!(id, "dropping frame with neither result nor error");
            return FrameDisposition::Malformed;
        }

        let Some(call) = self.table.lock().pending.remove(&id) else {
            tracing::debug!(id, "no pending call for response, dropping");
            return FrameDisposition::Unmatched;
        };

        let elapsed_ms = millis(call.created_at.elapsed());
        if call.tx.send(CallOutcome::Response(frame)).is_err() {
            tracing::debug!(id, "caller went away before response arrived");
        } else {
            tracing::debug!(id, elapsed_ms, "resolved pending call");
        }
        FrameDisposition::Resolved(id)
    }

    /// Resolve every pending call as cancelled. Returns how many there were.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<(u64, PendingCall)> = self.table.lock().pending.drain().collect();
        let count = drained.len();
        for (id, call) in drained {
            tracing::debug!(id, reason, "cancelling pending call");
            let _ = call.tx.send(CallOutcome::Cancelled(reason.to_string()));
        }
        count
    }

    /// Refuse further registrations and cancel everything pending.
    pub fn close(&self, reason: &str) -> usize {
        {
            let mut table = self.table.lock();
            if table.closed.is_none() {
                table.closed = Some(reason.to_string());
            }
        }
        self.cancel_all(reason)
    }

    pub fn is_closed(&self) -> bool {
        self.table.lock().closed.is_some()
    }

    pub fn len(&self) -> usize {
        self.table.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deregisters its id on drop, so a caller that times out or is itself
/// cancelled never leaves an entry behind.
pub(crate) struct PendingGuard {
    correlator: Arc<RpcCorrelator>,
    id: u64,
}

impl PendingGuard {
    pub(crate) fn new(correlator: Arc<RpcCorrelator>, id: u64) -> Self {
        Self { correlator, id }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.correlator.deregister(self.id);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
