//! `rebuilder build`: direct download with provider fallback.

use anyhow::Result;
use rebuilder_core::manifest;
use rebuilder_core::provider::ArtifactSpec;
use rebuilder_core::url_model::{last_path_segment, sanitize_component};
use std::path::{Path, PathBuf};

use super::recover::{self, LotusOverrides};

pub async fn run_build(
    urls: &[String],
    file: Option<&Path>,
    name: Option<String>,
    save_path: Option<PathBuf>,
    conf: Option<&Path>,
    lotus: LotusOverrides<'_>,
) -> Result<String> {
    let artifacts = build_artifacts(urls, file)?;
    let name = match name {
        Some(n) => sanitize_component(&n),
        None => default_name(&artifacts),
    };
    if name.is_empty() {
        anyhow::bail!("cannot derive a name from the shard URLs, pass --name");
    }

    let cfg = recover::load_config(conf, lotus)?;
    let resolver = recover::lotus_resolver(&cfg);
    let req = recover::request(&cfg, &name, save_path, artifacts);
    tracing::info!(name = %name, shards = req.artifacts.len(), "rebuild start");
    recover::recover(&cfg, resolver, &req).await
}

/// Manifest artifacts (with their deals) followed by bare command-line URLs.
fn build_artifacts(urls: &[String], file: Option<&Path>) -> Result<Vec<ArtifactSpec>> {
    let mut artifacts = match file {
        Some(path) => manifest::to_artifacts(&manifest::read_manifest(path)?),
        None => Vec::new(),
    };
    artifacts.extend(
        urls.iter()
            .map(|u| ArtifactSpec::new("", Vec::new()).with_direct_url(u.trim())),
    );
    if artifacts.is_empty() {
        anyhow::bail!("a manifest file or shard URLs are required");
    }
    Ok(artifacts)
}

fn default_name(artifacts: &[ArtifactSpec]) -> String {
    artifacts
        .iter()
        .find_map(|a| a.direct_url.as_deref())
        .and_then(last_path_segment)
        .map(|s| sanitize_component(&s))
        .unwrap_or_default()
}
