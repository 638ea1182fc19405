//! Error taxonomy for the recovery engine.
//!
//! Provider-level failures are recovered locally by the fallback resolver;
//! everything else propagates to the caller of the pipeline.

use std::fmt;
use std::path::PathBuf;

/// Typed failure of a scheduler submission, provider resolution, or recovery.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The request itself is unusable (empty, conflicting destinations, ...).
    #[error("invalid recovery request: {0}")]
    InvalidRequest(String),

    /// Reassembly would consume its own output.
    #[error("input path must not be the same as output path: {}", .path.display())]
    SameDirectories { path: PathBuf },

    /// Malformed or unexpected response from the transfer agent. Not retried.
    #[error("transfer agent protocol error for {url}: {reason}")]
    AgentProtocol { url: String, reason: String },

    /// The agent rejected or failed the transfer, or the result failed verification.
    #[error("transfer failed for {url}: {reason}")]
    TransferFailed { url: String, reason: String },

    /// A single provider attempt failed; the resolver moves to the next candidate.
    #[error("retrieve {cid} from provider {provider} failed: {reason}")]
    ProviderUnavailable {
        cid: String,
        provider: String,
        reason: String,
    },

    /// Every candidate provider for an artifact failed.
    #[error("retrieve failed for {cid}: all providers exhausted ({})", AttemptList(.attempts))]
    AllProvidersExhausted {
        cid: String,
        attempts: Vec<ProviderFailure>,
    },

    /// The shard directory does not hold exactly the expected shards.
    #[error(
        "incomplete shard set in {}: missing [{}], unexpected [{}]",
        .dir.display(),
        .missing.join(", "),
        .unexpected.join(", ")
    )]
    IncompleteShardSet {
        dir: PathBuf,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// The reassembly collaborator failed or produced no output.
    #[error("reassembly failed: {0}")]
    ReassemblyFailed(String),

    /// The storage upload collaborator failed.
    #[error("upload of {} failed: {reason}", .path.display())]
    StorageUploadFailed { path: PathBuf, reason: String },

    /// The caller aborted the submission.
    #[error("recovery aborted")]
    Aborted,

    /// The submission deadline passed before all jobs settled.
    #[error("deadline exceeded with {active} active and {pending} pending transfer(s)")]
    DeadlineExceeded { active: usize, pending: usize },

    /// Local filesystem failure.
    #[error("{context}: {}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecoveryError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecoveryError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// True for failures that the pipeline may recover from by provider retrieval.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(
            self,
            RecoveryError::TransferFailed { .. }
                | RecoveryError::AgentProtocol { .. }
                | RecoveryError::DeadlineExceeded { .. }
        )
    }
}

/// One failed provider attempt, kept for the exhaustion report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

struct AttemptList<'a>(&'a [ProviderFailure]);

impl fmt::Display for AttemptList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no providers");
        }
        for (i, a) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", a.provider, a.reason)?;
        }
        Ok(())
    }
}
