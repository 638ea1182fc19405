//! What to download and where it lands.

use std::path::{Path, PathBuf};

use crate::url_model;

/// One transfer request: URL plus deterministic destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferSource {
    pub url: String,
    pub dest_dir: PathBuf,
    pub dest_name: String,
}

impl TransferSource {
    pub fn new(url: impl Into<String>, dest_dir: impl Into<PathBuf>, dest_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest_dir: dest_dir.into(),
            dest_name: dest_name.into(),
        }
    }

    /// Source for a shard URL, named with [`url_model::shard_filename`].
    pub fn for_shard(url: &str, dest_dir: &Path) -> Self {
        Self::new(url, dest_dir, url_model::shard_filename(url))
    }

    pub fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(&self.dest_name)
    }
}
