use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection to the aria2 JSON-RPC daemon that performs direct downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aria2Config {
    pub host: String,
    pub port: u16,
    /// `--rpc-secret` of the daemon; empty when the daemon runs without one.
    #[serde(default)]
    pub secret: String,
    /// Per-request timeout in seconds for RPC calls.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6800,
            secret: String::new(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
        }
    }
}

impl Aria2Config {
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}/jsonrpc", self.host, self.port)
    }
}

/// Working directories and scheduling knobs for a recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Root under which shards are collected (`<input_path>/<name>`).
    pub input_path: PathBuf,
    /// Root under which the reassembled file is written (`<output_path>/<name>`).
    pub output_path: PathBuf,
    /// Maximum concurrent transfers; 0 means the default of 3.
    #[serde(default)]
    pub parallel: usize,
    /// Poll interval for active transfers in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Optional deadline for the whole download phase, in seconds.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("./cars"),
            output_path: PathBuf::from("./output"),
            parallel: DEFAULT_PARALLEL,
            poll_interval_ms: default_poll_interval_ms(),
            deadline_secs: None,
        }
    }
}

impl TaskConfig {
    pub fn effective_parallel(&self) -> usize {
        if self.parallel == 0 {
            DEFAULT_PARALLEL
        } else {
            self.parallel
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Lotus node used for provider (storage miner) retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotusConfig {
    /// Path or name of the `lotus` executable.
    #[serde(default = "default_lotus_binary")]
    pub binary: String,
    /// `FULLNODE_API_INFO` value (`<token>:/ip4/.../http`).
    #[serde(default)]
    pub node_api: String,
    /// Default payer wallet address.
    #[serde(default)]
    pub wallet: String,
    /// Per-provider retrieval timeout in seconds; 0 means the default of 600.
    #[serde(default)]
    pub timeout: u64,
}

impl Default for LotusConfig {
    fn default() -> Self {
        Self {
            binary: default_lotus_binary(),
            node_api: String::new(),
            wallet: String::new(),
            timeout: DEFAULT_RETRIEVE_TIMEOUT_SECS,
        }
    }
}

impl LotusConfig {
    pub fn attempt_timeout(&self) -> Duration {
        if self.timeout == 0 {
            Duration::from_secs(DEFAULT_RETRIEVE_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.timeout)
        }
    }
}

/// Shard reassembly tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassemblyConfig {
    #[serde(default = "default_graphsplit_binary")]
    pub binary: String,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            binary: default_graphsplit_binary(),
        }
    }
}

/// Storage bucket the recovered file is uploaded to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL files are PUT to (`<endpoint>/<file name>`).
    pub endpoint: String,
    /// Public base URL returned when the endpoint does not report one.
    #[serde(default)]
    pub public_base: String,
    /// Optional bearer token.
    #[serde(default)]
    pub token: Option<String>,
}

/// Retry policy for agent and upload transports (optional section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per request (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_secs: 0.25,
            max_delay_secs: 10,
        }
    }
}

/// Configuration loaded from `~/.config/rebuilder/config.toml` or `--conf`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebuilderConfig {
    pub aria2: Aria2Config,
    pub task: TaskConfig,
    /// Missing section disables provider retrieval.
    #[serde(default)]
    pub lotus: Option<LotusConfig>,
    #[serde(default)]
    pub reassembly: ReassemblyConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl RebuilderConfig {
    /// Default config written by `rebuilder init`: every section present so it can be filled in.
    pub fn template() -> Self {
        Self {
            lotus: Some(LotusConfig::default()),
            retry: Some(RetryConfig::default()),
            ..Self::default()
        }
    }

    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Apply CLI overrides for the lotus section, creating it if needed.
    pub fn override_lotus(&mut self, node_api: Option<&str>, wallet: Option<&str>, timeout_secs: Option<u64>) {
        if node_api.is_none() && wallet.is_none() && timeout_secs.is_none() {
            return;
        }
        let lotus = self.lotus.get_or_insert_with(LotusConfig::default);
        if let Some(api) = node_api.filter(|s| !s.is_empty()) {
            lotus.node_api = api.to_string();
        }
        if let Some(w) = wallet.filter(|s| !s.is_empty()) {
            lotus.wallet = w.to_string();
        }
        if let Some(t) = timeout_secs.filter(|t| *t > 0) {
            lotus.timeout = t;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.aria2.host.trim().is_empty() {
            anyhow::bail!("config: aria2.host is empty");
        }
        if self.task.input_path.as_os_str().is_empty() || self.task.output_path.as_os_str().is_empty() {
            anyhow::bail!("config: task.input_path and task.output_path are required");
        }
        Ok(())
    }
}

const DEFAULT_PARALLEL: usize = 3;
const DEFAULT_RETRIEVE_TIMEOUT_SECS: u64 = 600;

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_lotus_binary() -> String {
    "lotus".to_string()
}

fn default_graphsplit_binary() -> String {
    "graphsplit".to_string()
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rebuilder")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load and validate configuration from `path`.
pub fn load_from_path(path: &Path) -> Result<RebuilderConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {} (run `rebuilder init` first)", path.display()))?;
    let cfg: RebuilderConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Write the template config to `path`, creating parent directories.
pub fn write_template(path: &Path) -> Result<()> {
    let toml = toml::to_string_pretty(&RebuilderConfig::template())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml).with_context(|| format!("write config {}", path.display()))?;
    tracing::info!("config file saved to {}", path.display());
    Ok(())
}

/// Load configuration from the XDG location, creating the template if none exists.
pub fn load_or_init() -> Result<RebuilderConfig> {
    let path = config_path()?;
    if !path.exists() {
        write_template(&path)?;
    }
    load_from_path(&path)
}
