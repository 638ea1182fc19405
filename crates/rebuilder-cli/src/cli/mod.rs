//! CLI for rebuilder.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_build, run_init, run_retrieve, LotusOverrides};

/// Top-level CLI for rebuilder.
#[derive(Debug, Parser)]
#[command(name = "rebuilder")]
#[command(about = "rebuilder: recover files from CAR shards and publish them", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Write a default config file.
    Init {
        /// Directory for config.toml (default: the XDG config dir).
        #[arg(long, value_name = "DIR")]
        path: Option<PathBuf>,
    },

    /// Download shards directly, fall back to storage providers, reassemble and upload.
    Build {
        /// Shard URLs to download.
        #[arg(required_unless_present = "file")]
        urls: Vec<String>,

        /// Manifest (JSON or CSV) listing shard URLs, content addresses and deals.
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: Option<PathBuf>,

        /// Name of the recovered file set (default: last segment of the first URL).
        #[arg(long)]
        name: Option<String>,

        /// Output directory (default: task.output_path from config).
        #[arg(long, value_name = "DIR")]
        save_path: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Retrieve shards from storage providers only, reassemble and upload.
    Retrieve {
        /// Manifest (JSON or CSV) with content addresses and deals.
        #[arg(short = 'f', long = "file", value_name = "FILE", conflicts_with_all = ["cids", "miners"])]
        file: Option<PathBuf>,

        /// Comma-separated content addresses.
        #[arg(long, value_delimiter = ',', required_unless_present = "file", requires = "miners")]
        cids: Vec<String>,

        /// Comma-separated provider ids, one per content address.
        #[arg(long, value_delimiter = ',', requires = "cids")]
        miners: Vec<String>,

        /// Name of the recovered file set (default: the first content address).
        #[arg(long)]
        name: Option<String>,

        /// Output directory (default: task.output_path from config).
        #[arg(long, value_name = "DIR")]
        save_path: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

/// Flags shared by `build` and `retrieve`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CommonArgs {
    /// Config file (default: the XDG config location).
    #[arg(long, value_name = "FILE")]
    pub conf: Option<PathBuf>,

    /// Lotus node API info (overrides lotus.node_api).
    #[arg(long, value_name = "API")]
    pub lotus_node: Option<String>,

    /// Wallet paying for retrievals (overrides lotus.wallet).
    #[arg(long)]
    pub wallet: Option<String>,

    /// Per-provider retrieval timeout in seconds (overrides lotus.timeout).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl CommonArgs {
    fn lotus_overrides(&self) -> LotusOverrides<'_> {
        LotusOverrides {
            node_api: self.lotus_node.as_deref(),
            wallet: self.wallet.as_deref(),
            timeout_secs: self.timeout,
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Init { path } => run_init(path.as_deref())?,
            CliCommand::Build {
                urls,
                file,
                name,
                save_path,
                common,
            } => {
                let location = run_build(
                    &urls,
                    file.as_deref(),
                    name,
                    save_path,
                    common.conf.as_deref(),
                    common.lotus_overrides(),
                )
                .await?;
                println!("download url: {}", location);
            }
            CliCommand::Retrieve {
                file,
                cids,
                miners,
                name,
                save_path,
                common,
            } => {
                let location = run_retrieve(
                    file.as_deref(),
                    &cids,
                    &miners,
                    name,
                    save_path,
                    common.conf.as_deref(),
                    common.lotus_overrides(),
                )
                .await?;
                println!("download url: {}", location);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
