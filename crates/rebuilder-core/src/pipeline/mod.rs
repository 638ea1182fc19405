//! End-to-end recovery: acquire shards, verify the set, reassemble, upload.
//!
//! Shards are first downloaded directly through the [`JobScheduler`]. Any
//! artifact that did not land is then retrieved from its providers, one
//! artifact at a time. Only a complete, exact shard set is reassembled.
//!
//! [`JobScheduler`]: crate::transfer::JobScheduler

mod orchestrator;
mod plan;
mod session;
mod shards;

use std::path::PathBuf;

use crate::provider::ArtifactSpec;

pub use orchestrator::PipelineOrchestrator;
pub use session::{RecoverySession, SessionCounts};

/// What to recover and where to work.
#[derive(Debug, Clone)]
pub struct RecoveryRequest {
    /// Name of the recovered file set, used in logs.
    pub name: String,
    /// Where shards are collected. Must differ from `output_dir`.
    pub input_dir: PathBuf,
    /// Where reassembled files are written before upload.
    pub output_dir: PathBuf,
    pub artifacts: Vec<ArtifactSpec>,
}
