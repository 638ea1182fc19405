//! Header-indexed CSV manifest. The `deals` cell holds a JSON array, so
//! quoted fields with embedded commas and `""` escapes are common.

use anyhow::{Context, Result};
use std::collections::HashMap;

use super::{Deal, ShardRecord};

const COL_URL: &str = "car_file_url";
const COL_CID: &str = "pay_load_cid";
const COL_DEALS: &str = "deals";

pub(super) fn parse(text: &str) -> Result<Vec<ShardRecord>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(text.as_bytes());

    let cols: HashMap<String, usize> = reader
        .headers()
        .context("read CSV header")?
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim_start_matches('\u{feff}').to_string(), i))
        .collect();
    let url_col = *cols
        .get(COL_URL)
        .with_context(|| format!("missing column {}", COL_URL))?;
    let cid_col = cols.get(COL_CID).copied();
    let deals_col = cols.get(COL_DEALS).copied();

    let mut out = Vec::new();
    for (n, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("row {}", n + 2))?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        let line = row.position().map(|p| p.line()).unwrap_or(n as u64 + 2);
        let cell = |col: usize| row.get(col).unwrap_or("");
        let deals = match deals_col.map(cell).filter(|s| !s.is_empty()) {
            Some(raw) => serde_json::from_str::<Vec<Deal>>(raw)
                .with_context(|| format!("row {}: invalid deals cell", line))?,
            None => Vec::new(),
        };
        out.push(ShardRecord {
            url: cell(url_col).to_string(),
            cid: cid_col.map(cell).unwrap_or("").to_string(),
            deals,
        });
    }
    Ok(out)
}
