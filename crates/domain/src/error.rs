use std::time::Duration;

/// Shared error type used across all skywork-relay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    /// The event stream failed to open, or the transport failed underneath it.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("endpoint discovery timed out after {}ms", .0.as_millis())]
    DiscoveryTimeout(Duration),

    /// Only rejected endpoint candidates were seen before the discovery deadline.
    #[error("invalid endpoint URL: {0}")]
    Validation(String),

    /// Discovery kept failing until the retry budget ran out.
    #[error("failed to connect after {attempts} attempts: {source}")]
    DiscoveryFailed {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("RPC request timed out: {0}")]
    RpcTimeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// A JSON-RPC `error` object returned by the remote service.
    #[error("{message}")]
    Remote { code: Option<i64>, message: String },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("invalid session state: {0}")]
    State(String),

    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Whether endpoint discovery should be retried after this error.
    ///
    /// A rejected candidate counts as transient: the server may announce a
    /// corrected endpoint on the next attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::DiscoveryTimeout(_) | Error::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
