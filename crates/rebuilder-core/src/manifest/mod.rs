//! Shard manifests: which shard URLs make up a file and which providers hold
//! each shard.
//!
//! Two formats are accepted, chosen by file extension: a JSON array of
//! records and a CSV table with a header row.

mod table;
mod json;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::provider::{ArtifactSpec, Provider};
use crate::url_model;

/// A storage deal: the provider (`MinerFid`) holding a copy of the shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Deal {
    pub deal_id: u64,
    pub deal_cid: String,
    pub miner_fid: String,
}

/// One shard: where to download it, its content address, and its deals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardRecord {
    pub url: String,
    pub cid: String,
    pub deals: Vec<Deal>,
}

/// Read a `.json` or `.csv` manifest. Records sharing a URL are merged.
pub fn read_manifest(path: &Path) -> Result<Vec<ShardRecord>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let text = std::fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
    let records = match ext.as_str() {
        "json" => json::parse(&text),
        "csv" => table::parse(&text),
        other => anyhow::bail!("unsupported manifest format: .{}", other),
    }
    .with_context(|| format!("parse manifest {}", path.display()))?;
    let merged = merge_records(records)?;
    tracing::debug!(path = %path.display(), records = merged.len(), "manifest loaded");
    Ok(merged)
}

/// Merge records with the same URL (deals concatenated, first non-empty cid
/// kept), preserving first-seen order. Every URL must be http(s).
pub fn merge_records(records: Vec<ShardRecord>) -> Result<Vec<ShardRecord>> {
    let mut out: Vec<ShardRecord> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for rec in records {
        if !url_model::is_http_url(&rec.url) {
            anyhow::bail!("invalid download URL: {:?}", rec.url);
        }
        match index.get(&rec.url) {
            Some(&i) => {
                let existing = &mut out[i];
                if existing.cid.is_empty() {
                    existing.cid = rec.cid;
                }
                existing.deals.extend(rec.deals);
            }
            None => {
                index.insert(rec.url.clone(), out.len());
                out.push(rec);
            }
        }
    }
    Ok(out)
}

/// One artifact per record: direct URL plus the deduplicated providers of its deals.
pub fn to_artifacts(records: &[ShardRecord]) -> Vec<ArtifactSpec> {
    records
        .iter()
        .map(|rec| {
            let mut providers: Vec<Provider> = Vec::new();
            for deal in &rec.deals {
                let id = deal.miner_fid.trim();
                if !id.is_empty() && !providers.iter().any(|p| p.id == id) {
                    providers.push(Provider::new(id));
                }
            }
            ArtifactSpec::new(rec.cid.trim(), providers).with_direct_url(rec.url.clone())
        })
        .collect()
}

/// Artifacts from parallel `--cids`/`--miners` lists, one provider each.
pub fn artifacts_from_pairs(cids: &[String], miners: &[String]) -> Result<Vec<ArtifactSpec>> {
    if cids.len() != miners.len() {
        anyhow::bail!(
            "the number of cids ({}) and miners ({}) must be equal",
            cids.len(),
            miners.len()
        );
    }
    if cids.is_empty() {
        anyhow::bail!("no cids given");
    }
    Ok(cids
        .iter()
        .zip(miners)
        .map(|(cid, miner)| ArtifactSpec::new(cid.trim(), vec![Provider::new(miner.trim())]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(url: &str, cid: &str, miners: &[&str]) -> ShardRecord {
        ShardRecord {
            url: url.to_string(),
            cid: cid.to_string(),
            deals: miners
                .iter()
                .map(|m| Deal {
                    miner_fid: m.to_string(),
                    ..Deal::default()
                })
                .collect(),
        }
    }

    #[test]
    fn merge_keeps_order_and_concatenates_deals() {
        let merged = merge_records(vec![
            rec("https://x/a.car", "", &["f01"]),
            rec("https://x/b.car", "bafyb", &["f02"]),
            rec("https://x/a.car", "bafya", &["f03", "f01"]),
        ])
        .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].url, "https://x/a.car");
        assert_eq!(merged[0].cid, "bafya");
        assert_eq!(merged[0].deals.len(), 3);
        assert_eq!(merged[1].url, "https://x/b.car");
    }

    #[test]
    fn merge_rejects_non_http() {
        assert!(merge_records(vec![rec("ftp://x/a.car", "", &[])]).is_err());
        assert!(merge_records(vec![rec("", "bafy", &[])]).is_err());
    }

    #[test]
    fn artifacts_dedupe_providers_in_order() {
        let arts = to_artifacts(&[rec("https://x/a.car", "bafya", &["f03", "f01", "f03", " "])]);
        assert_eq!(arts.len(), 1);
        let ids: Vec<_> = arts[0].providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["f03", "f01"]);
        assert_eq!(arts[0].direct_url.as_deref(), Some("https://x/a.car"));
        assert!(arts[0].has_fallback());
    }

    #[test]
    fn pairs_must_match() {
        let cids = vec!["bafy1".to_string(), "bafy2".to_string()];
        assert!(artifacts_from_pairs(&cids, &["f01".to_string()]).is_err());
        assert!(artifacts_from_pairs(&[], &[]).is_err());
        let arts = artifacts_from_pairs(&cids, &["f01".to_string(), "f02".to_string()]).unwrap();
        assert_eq!(arts[1].cid, "bafy2");
        assert_eq!(arts[1].providers, vec![Provider::new("f02")]);
        assert!(arts[1].direct_url.is_none());
    }

    #[test]
    fn read_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("cars.JSON");
        std::fs::write(
            &json_path,
            r#"[{"CarFileUrl":"https://x/a.car","PayloadCid":"bafya","Deals":[{"DealId":7,"DealCid":"bafydeal","MinerFid":"f01"}]}]"#,
        )
        .unwrap();
        let recs = read_manifest(&json_path).unwrap();
        assert_eq!(recs[0].deals[0].deal_id, 7);

        let txt = dir.path().join("cars.txt");
        std::fs::write(&txt, "x").unwrap();
        assert!(read_manifest(&txt).is_err());
    }
}
