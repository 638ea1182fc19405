//! `rebuilder retrieve`: provider retrieval only.

use anyhow::Result;
use rebuilder_core::manifest;
use rebuilder_core::provider::ArtifactSpec;
use rebuilder_core::url_model::sanitize_component;
use std::path::{Path, PathBuf};

use super::recover::{self, LotusOverrides};

pub async fn run_retrieve(
    file: Option<&Path>,
    cids: &[String],
    miners: &[String],
    name: Option<String>,
    save_path: Option<PathBuf>,
    conf: Option<&Path>,
    lotus: LotusOverrides<'_>,
) -> Result<String> {
    let artifacts = retrieve_artifacts(file, cids, miners)?;
    let name = sanitize_component(name.as_deref().unwrap_or(&artifacts[0].cid));
    if name.is_empty() {
        anyhow::bail!("invalid --name");
    }

    let cfg = recover::load_config(conf, lotus)?;
    let Some(resolver) = recover::lotus_resolver(&cfg) else {
        anyhow::bail!("wallet is required: set lotus.wallet or pass --wallet");
    };
    let req = recover::request(&cfg, &name, save_path, artifacts);
    tracing::info!(name = %name, shards = req.artifacts.len(), "retrieve start");
    recover::recover(&cfg, Some(resolver), &req).await
}

/// Artifacts without direct URLs, each with a content address and at least one provider.
fn retrieve_artifacts(file: Option<&Path>, cids: &[String], miners: &[String]) -> Result<Vec<ArtifactSpec>> {
    let artifacts: Vec<ArtifactSpec> = match file {
        Some(path) => manifest::to_artifacts(&manifest::read_manifest(path)?)
            .into_iter()
            .map(|mut a| {
                a.direct_url = None;
                a
            })
            .collect(),
        None => manifest::artifacts_from_pairs(cids, miners)?,
    };
    if artifacts.is_empty() {
        anyhow::bail!("no shards to retrieve");
    }
    if let Some(a) = artifacts.iter().find(|a| !a.has_fallback()) {
        anyhow::bail!("shard {:?} needs a content address and at least one provider", a.cid);
    }
    Ok(artifacts)
}
