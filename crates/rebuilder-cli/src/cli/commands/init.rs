//! `rebuilder init`: write a default config file.

use anyhow::Result;
use rebuilder_core::config;
use std::path::{Path, PathBuf};

pub fn run_init(dir: Option<&Path>) -> Result<()> {
    let path = config_file_in(dir)?;
    config::write_template(&path)?;
    println!("config written to {}", path.display());
    Ok(())
}

fn config_file_in(dir: Option<&Path>) -> Result<PathBuf> {
    match dir {
        Some(d) => Ok(d.join("config.toml")),
        None => config::config_path(),
    }
}
