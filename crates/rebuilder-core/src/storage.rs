//! Staging files and atomic promotion.
//!
//! Retrieved shards are written to `<final>.part` and renamed into place only
//! once the retrieval succeeded, so a failed attempt never leaves a partial
//! file at the final destination.

use std::path::{Path, PathBuf};

use crate::error::RecoveryError;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the staging file: appends `.part` to the final path (e.g. `a.car` → `a.car.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Remove a leftover staging file before an attempt. Missing files are fine.
pub async fn clear_staging(staging: &Path) -> Result<(), RecoveryError> {
    match tokio::fs::remove_file(staging).await {
        Ok(()) => {
            tracing::debug!(path = %staging.display(), "removed stale staging file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RecoveryError::io("remove staging file", staging, e)),
    }
}

/// Best-effort removal of a failed attempt's output.
pub async fn discard(staging: &Path) {
    if let Err(e) = tokio::fs::remove_file(staging).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %staging.display(), "could not remove partial file: {}", e);
        }
    }
}

/// Atomically rename the staging file to the final path. The staging file must
/// be a non-empty regular file; otherwise it is discarded and an error returned.
pub async fn promote(staging: &Path, final_path: &Path) -> anyhow::Result<()> {
    let meta = match tokio::fs::metadata(staging).await {
        Ok(m) => m,
        Err(e) => anyhow::bail!("retrieval produced no file at {}: {}", staging.display(), e),
    };
    if !meta.is_file() || meta.len() == 0 {
        discard(staging).await;
        anyhow::bail!("retrieval produced an empty file at {}", staging.display());
    }
    tokio::fs::rename(staging, final_path).await.map_err(|e| {
        anyhow::anyhow!(
            "failed to rename {} to {}: {}",
            staging.display(),
            final_path.display(),
            e
        )
    })
}
