//! Transfer agent boundary.
//!
//! A transfer agent is an out-of-process download service: it accepts a URL
//! plus destination and hands back an opaque job handle, then answers status
//! queries for that handle. The scheduler only ever talks to this trait.

pub mod aria2;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

pub use aria2::Aria2Client;

/// Opaque job handle assigned by the agent (aria2 calls it a gid).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agent-side lifecycle state of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    /// Queued on the agent, not started yet.
    Pending,
    /// Bytes are flowing.
    Active,
    /// Agent reports the file complete.
    Complete,
    /// Agent gave up; carries its error message.
    Failed(String),
    /// A state this client does not understand.
    Unknown(String),
}

/// Point-in-time status of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatus {
    pub state: AgentState,
    pub completed_bytes: u64,
    pub total_bytes: u64,
    /// Bytes per second as reported by the agent.
    pub download_speed: u64,
    /// Where the agent is writing the file, if it reports it.
    pub path: Option<PathBuf>,
}

impl AgentStatus {
    pub fn new(state: AgentState) -> Self {
        Self {
            state,
            completed_bytes: 0,
            total_bytes: 0,
            download_speed: 0,
            path: None,
        }
    }
}

/// Error talking to the agent. `Rejected` is an explicit refusal by the agent;
/// `Protocol` is a transport failure or an answer that could not be understood.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent rejected request: {0}")]
    Rejected(String),
    #[error("{0}")]
    Protocol(String),
}

/// Out-of-process download service.
#[async_trait]
pub trait TransferAgent: Send + Sync {
    /// Start downloading `url` into `dest_dir/dest_name`; returns the job handle.
    async fn start_transfer(
        &self,
        url: &str,
        dest_dir: &Path,
        dest_name: &str,
    ) -> Result<JobHandle, AgentError>;

    /// Current status of a started transfer. Safe to call repeatedly.
    async fn poll_status(&self, handle: &JobHandle) -> Result<AgentStatus, AgentError>;

    /// Ask the agent to stop a transfer. Best effort; the default does nothing.
    async fn cancel(&self, handle: &JobHandle) -> Result<(), AgentError> {
        let _ = handle;
        Ok(())
    }
}
