//! Transport error type for retry classification.

/// Failure of one HTTP exchange with a collaborator service.
/// Kept separate from `RecoveryError` so it can be classified before retrying.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// HTTP response had a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u32, body: String },
    /// Reading the local file to send failed. Not retried.
    #[error("local read: {0}")]
    Io(#[from] std::io::Error),
    /// The blocking transfer task panicked or was cancelled.
    #[error("transport task join: {0}")]
    Join(String),
}
