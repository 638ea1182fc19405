//! Reassembly collaborator: turns a complete shard directory back into files.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::ReassemblyConfig;

/// Merges the shards in `shard_dir` into `output_dir`. Only called with a
/// verified, complete shard set.
#[async_trait]
pub trait Reassembler: Send + Sync {
    async fn reassemble(&self, shard_dir: &Path, output_dir: &Path, concurrency: usize) -> Result<()>;
}

/// Runs `graphsplit restore --car-path <shards> --output-dir <out> --parallel <n>`.
pub struct GraphsplitReassembler {
    binary: String,
}

impl GraphsplitReassembler {
    pub fn new(cfg: &ReassemblyConfig) -> Self {
        Self {
            binary: cfg.binary.clone(),
        }
    }

    fn command(&self, shard_dir: &Path, output_dir: &Path, concurrency: usize) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("restore")
            .arg("--car-path")
            .arg(shard_dir)
            .arg("--output-dir")
            .arg(output_dir)
            .arg("--parallel")
            .arg(concurrency.max(1).to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Reassembler for GraphsplitReassembler {
    async fn reassemble(&self, shard_dir: &Path, output_dir: &Path, concurrency: usize) -> Result<()> {
        tracing::info!(shards = %shard_dir.display(), output = %output_dir.display(), "restoring");
        let output = self
            .command(shard_dir, output_dir, concurrency)
            .output()
            .await
            .with_context(|| format!("run {} restore", self.binary))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} restore exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}
