//! `sk-client`: streaming-discovery JSON-RPC client for the Skywork
//! document-generation server.
//!
//! This crate provides:
//! - Request signing and the signed event-stream URL.
//! - Endpoint discovery: the server announces the RPC endpoint on the event
//!   stream, and only same-origin http(s) announcements are accepted.
//! - An id-keyed correlator matching responses on the stream to requests
//!   POSTed to the endpoint.
//! - A [`ProtocolSession`] with bounded exponential-backoff connect, the
//!   `initialize` handshake, tool calls, and clean shutdown.
//! - A text-only tool boundary for hosts that must always get a string back.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sk_client::{ProtocolSession, RemoteTool, tool_arguments};
//! use sk_domain::config::{Credentials, SessionConfig};
//!
//! let session = ProtocolSession::new(SessionConfig::default(), Credentials::from_env()?)?;
//! session.connect().await?;
//! session.initialize_handshake().await?;
//! let text = session
//!     .call_tool(RemoteTool::Doc.as_str(), tool_arguments("Quarterly report", true))
//!     .await?;
//! session.close().await;
//! ```

pub mod correlator;
pub mod discovery;
pub mod endpoint;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod signing;
pub mod sse;
pub mod tools;
pub mod transport;

// Re-exports for convenience.
pub use correlator::{CallOutcome, FrameDisposition, RpcCorrelator};
pub use protocol::NO_CONTENT_MESSAGE;
pub use session::{ProtocolSession, SessionState};
pub use tools::{
    call_remote_tool, call_remote_tool_with, signed_server_config, tool_arguments, RemoteTool,
};
pub use transport::{HttpTransport, RpcTransport};
