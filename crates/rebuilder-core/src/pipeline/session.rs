//! Per-request working state: validated directories and running counts.

use std::path::{Path, PathBuf};

use crate::error::RecoveryError;
use crate::transfer::SubmitOutcome;

use super::RecoveryRequest;

/// Shard acquisition counts for one recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// One recovery in progress. Input and output directories exist, are
/// absolute, and are never the same directory.
#[derive(Debug)]
pub struct RecoverySession {
    name: String,
    input_dir: PathBuf,
    output_dir: PathBuf,
    concurrency: usize,
    counts: SessionCounts,
}

impl RecoverySession {
    /// Validate and create the working directories.
    pub async fn open(req: &RecoveryRequest, concurrency: usize) -> Result<Self, RecoveryError> {
        if req.input_dir.as_os_str().is_empty() || req.output_dir.as_os_str().is_empty() {
            return Err(RecoveryError::InvalidRequest(
                "input and output directories are required".to_string(),
            ));
        }
        if req.input_dir == req.output_dir {
            return Err(RecoveryError::SameDirectories {
                path: req.input_dir.clone(),
            });
        }
        let input_dir = prepare_dir(&req.input_dir).await?;
        let output_dir = prepare_dir(&req.output_dir).await?;
        if input_dir == output_dir {
            return Err(RecoveryError::SameDirectories { path: input_dir });
        }
        tracing::debug!(input = %input_dir.display(), output = %output_dir.display(), "session directories ready");
        Ok(Self {
            name: req.name.clone(),
            input_dir,
            output_dir,
            concurrency: concurrency.max(1),
            counts: SessionCounts::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn counts(&self) -> SessionCounts {
        self.counts
    }

    pub(crate) fn record_transfers(&mut self, outcome: &SubmitOutcome) {
        for status in outcome.settled.values() {
            if status.is_success() {
                self.counts.succeeded += 1;
            } else {
                self.counts.failed += 1;
            }
        }
    }

    pub(crate) fn retrieval_started(&mut self) {
        self.counts.running += 1;
    }

    pub(crate) fn retrieval_finished(&mut self, ok: bool) {
        self.counts.running = self.counts.running.saturating_sub(1);
        if ok {
            self.counts.succeeded += 1;
        } else {
            self.counts.failed += 1;
        }
    }
}

/// Create `dir` and return its canonical absolute path.
async fn prepare_dir(dir: &Path) -> Result<PathBuf, RecoveryError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| RecoveryError::io("create directory", dir, e))?;
    tokio::fs::canonicalize(dir)
        .await
        .map_err(|e| RecoveryError::io("resolve directory", dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(input: PathBuf, output: PathBuf) -> RecoveryRequest {
        RecoveryRequest {
            name: "movie".to_string(),
            input_dir: input,
            output_dir: output,
            artifacts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn creates_and_canonicalizes_dirs() {
        let root = tempfile::tempdir().unwrap();
        let req = request(root.path().join("in/movie"), root.path().join("out/movie"));
        let session = RecoverySession::open(&req, 0).await.unwrap();
        assert!(session.input_dir().is_absolute());
        assert!(session.input_dir().is_dir());
        assert!(session.output_dir().is_dir());
        assert_eq!(session.concurrency(), 1);
        assert_eq!(session.name(), "movie");
    }

    #[tokio::test]
    async fn same_dir_rejected_even_through_dot_segments() {
        let root = tempfile::tempdir().unwrap();
        let same = root.path().join("work");
        let err = RecoverySession::open(&request(same.clone(), same.clone()), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::SameDirectories { .. }));

        let err = RecoverySession::open(&request(same.clone(), same.join("x/..")), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::SameDirectories { .. }));
    }

    #[test]
    fn counts_track_retrievals() {
        let mut session = RecoverySession {
            name: "m".to_string(),
            input_dir: PathBuf::from("/in"),
            output_dir: PathBuf::from("/out"),
            concurrency: 1,
            counts: SessionCounts::default(),
        };
        session.retrieval_started();
        assert_eq!(session.counts().running, 1);
        session.retrieval_finished(true);
        session.retrieval_started();
        session.retrieval_finished(false);
        assert_eq!(
            session.counts(),
            SessionCounts {
                running: 0,
                succeeded: 1,
                failed: 1
            }
        );
    }
}
