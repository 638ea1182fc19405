use anyhow::Result;
use serde::Deserialize;

use super::{Deal, ShardRecord};

#[derive(Debug, Deserialize)]
struct JsonRecord {
    #[serde(rename = "CarFileUrl", default)]
    car_file_url: String,
    #[serde(rename = "PayloadCid", default)]
    payload_cid: String,
    #[serde(rename = "Deals", default)]
    deals: Option<Vec<Deal>>,
}

/// `[{"CarFileUrl": .., "PayloadCid": .., "Deals": [{"DealId", "DealCid", "MinerFid"}]}]`
pub(super) fn parse(text: &str) -> Result<Vec<ShardRecord>> {
    let list: Vec<JsonRecord> = serde_json::from_str(text)?;
    Ok(list
        .into_iter()
        .map(|r| ShardRecord {
            url: r.car_file_url.trim().to_string(),
            cid: r.payload_cid.trim().to_string(),
            deals: r.deals.unwrap_or_default(),
        })
        .collect())
}
