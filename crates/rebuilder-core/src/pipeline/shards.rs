//! Shard-set verification and output discovery.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::RecoveryError;
use crate::url_model;

/// The shard directory must hold every expected shard (non-empty) and no
/// other shard files. Non-shard files such as staging or agent control files
/// are ignored.
pub(crate) async fn verify_shard_set(dir: &Path, expected: &[String]) -> Result<(), RecoveryError> {
    let mut present: BTreeSet<String> = BTreeSet::new();
    let mut empty: BTreeSet<String> = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| RecoveryError::io("read shard directory", dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RecoveryError::io("read shard directory", dir, e))?
    {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !url_model::is_shard_name(&name) {
            continue;
        }
        let meta = entry
            .metadata()
            .await
            .map_err(|e| RecoveryError::io("stat shard", entry.path(), e))?;
        if !meta.is_file() {
            continue;
        }
        if meta.len() == 0 {
            empty.insert(name.clone());
        }
        present.insert(name);
    }

    let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    let missing: Vec<String> = expected
        .iter()
        .filter(|n| !present.contains(**n) || empty.contains(**n))
        .map(|n| n.to_string())
        .collect();
    let unexpected: Vec<String> = present
        .iter()
        .filter(|n| !expected.contains(n.as_str()))
        .cloned()
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        tracing::debug!(dir = %dir.display(), shards = expected.len(), "shard set complete");
        return Ok(());
    }
    Err(RecoveryError::IncompleteShardSet {
        dir: dir.to_path_buf(),
        missing,
        unexpected,
    })
}

/// Every regular file under `dir`, recursively, in lexical path order.
pub(crate) async fn list_outputs(dir: &Path) -> Result<Vec<PathBuf>, RecoveryError> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| RecoveryError::io("read output directory", &current, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RecoveryError::io("read output directory", &current, e))?
        {
            let kind = entry
                .file_type()
                .await
                .map_err(|e| RecoveryError::io("stat output", entry.path(), e))?;
            if kind.is_dir() {
                stack.push(entry.path());
            } else if kind.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Upload key for `path`: its `/`-separated path relative to `root`.
pub(crate) fn object_key(root: &Path, path: &Path) -> Result<String, RecoveryError> {
    let rel = path.strip_prefix(root).map_err(|_| {
        RecoveryError::ReassemblyFailed(format!("{} is outside {}", path.display(), root.display()))
    })?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return Err(RecoveryError::ReassemblyFailed(format!(
            "no file name in {}",
            path.display()
        )));
    }
    Ok(parts.join("/"))
}
