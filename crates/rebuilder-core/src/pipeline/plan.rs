//! Turns requested artifacts into the exact set of shard files to expect.

use std::collections::HashMap;

use crate::error::RecoveryError;
use crate::provider::ArtifactSpec;
use crate::url_model;

/// An artifact plus the file name its shard must have in the input directory,
/// whichever way it is acquired.
#[derive(Debug, Clone)]
pub(crate) struct PlannedArtifact {
    pub spec: ArtifactSpec,
    pub file_name: String,
}

impl PlannedArtifact {
    /// Short label for messages: the URL if there is one, else the cid.
    pub fn label(&self) -> &str {
        self.spec.direct_url.as_deref().unwrap_or(&self.spec.cid)
    }
}

/// Deduplicate artifacts (by URL, else by cid) keeping first-seen order, and
/// assign each a distinct shard file name.
pub(crate) fn plan_artifacts(artifacts: &[ArtifactSpec]) -> Result<Vec<PlannedArtifact>, RecoveryError> {
    if artifacts.is_empty() {
        return Err(RecoveryError::InvalidRequest("no artifacts to recover".to_string()));
    }

    let mut merged: Vec<ArtifactSpec> = Vec::with_capacity(artifacts.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for spec in artifacts {
        let key = match spec.direct_url.as_deref() {
            Some(url) if !url_model::is_http_url(url) => {
                return Err(RecoveryError::InvalidRequest(format!("invalid download URL: {}", url)));
            }
            Some(url) => url.to_string(),
            None if spec.cid.trim().is_empty() => {
                return Err(RecoveryError::InvalidRequest(
                    "artifact without download URL or content address".to_string(),
                ));
            }
            None => format!("cid:{}", spec.cid.trim()),
        };
        match by_key.get(&key) {
            Some(&i) => {
                let existing = &mut merged[i];
                if existing.cid.trim().is_empty() {
                    existing.cid = spec.cid.clone();
                }
                for p in &spec.providers {
                    if !existing.providers.contains(p) {
                        existing.providers.push(p.clone());
                    }
                }
            }
            None => {
                by_key.insert(key, merged.len());
                merged.push(spec.clone());
            }
        }
    }

    let mut names: HashMap<String, String> = HashMap::new();
    let mut planned = Vec::with_capacity(merged.len());
    for spec in merged {
        let file_name = match spec.direct_url.as_deref() {
            Some(url) => url_model::shard_filename(url),
            None => url_model::cid_shard_filename(spec.cid.trim()),
        };
        let entry = PlannedArtifact { spec, file_name };
        if let Some(other) = names.insert(entry.file_name.clone(), entry.label().to_string()) {
            return Err(RecoveryError::InvalidRequest(format!(
                "{} and {} both map to shard file {}",
                other,
                entry.label(),
                entry.file_name
            )));
        }
        planned.push(entry);
    }
    Ok(planned)
}
