//! Retry and backoff for collaborator transports.
//!
//! Transient transport failures (timeouts, throttling, connection errors)
//! talking to the transfer agent or the upload endpoint are retried with
//! exponential backoff. Protocol-level answers are never retried here; the
//! scheduler and resolver own those decisions.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::TransportError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
