//! Completion check: the agent says complete, the disk must agree.

use crate::agent::AgentStatus;
use crate::storage;

use super::source::TransferSource;

/// Confirms the destination file exists where the source says and has the
/// size the agent reported. Returns the file size.
///
/// A file the agent wrote under another name in the destination directory is
/// removed, so it cannot show up as a stray shard later.
pub(super) async fn verify_complete(source: &TransferSource, status: &AgentStatus) -> Result<u64, String> {
    let expected = source.dest_path();
    if let Some(reported) = status.path.as_deref() {
        if reported != expected {
            if reported.parent() == Some(source.dest_dir.as_path()) {
                storage::discard(reported).await;
            }
            return Err(format!(
                "agent wrote {} instead of {}",
                reported.display(),
                expected.display()
            ));
        }
    }
    let meta = tokio::fs::metadata(&expected)
        .await
        .map_err(|e| format!("completed file {} not found: {}, check the transfer agent", expected.display(), e))?;
    if !meta.is_file() {
        return Err(format!("{} is not a regular file", expected.display()));
    }
    if status.total_bytes > 0 && meta.len() != status.total_bytes {
        return Err(format!(
            "size mismatch for {}: agent reported {} bytes, found {}",
            expected.display(),
            status.total_bytes,
            meta.len()
        ));
    }
    Ok(meta.len())
}
