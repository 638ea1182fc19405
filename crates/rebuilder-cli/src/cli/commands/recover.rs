//! Shared wiring for `build` and `retrieve`: config, collaborators, orchestrator.

use anyhow::{Context, Result};
use rebuilder_core::agent::Aria2Client;
use rebuilder_core::config::{self, RebuilderConfig};
use rebuilder_core::control::AbortHandle;
use rebuilder_core::pipeline::{PipelineOrchestrator, RecoveryRequest};
use rebuilder_core::provider::{ArtifactSpec, LotusRetriever, ProviderFallbackResolver};
use rebuilder_core::reassemble::GraphsplitReassembler;
use rebuilder_core::retry::RetryPolicy;
use rebuilder_core::transfer::{JobScheduler, SchedulerOptions, SchedulerSnapshot};
use rebuilder_core::upload::HttpUploader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `--lotus-node`, `--wallet` and `--timeout` as given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LotusOverrides<'a> {
    pub node_api: Option<&'a str>,
    pub wallet: Option<&'a str>,
    pub timeout_secs: Option<u64>,
}

/// Load `--conf` (or the XDG config) and apply CLI overrides.
pub(super) fn load_config(conf: Option<&Path>, lotus: LotusOverrides<'_>) -> Result<RebuilderConfig> {
    let mut cfg = match conf {
        Some(path) => config::load_from_path(path)?,
        None => config::load_or_init()?,
    };
    cfg.override_lotus(lotus.node_api, lotus.wallet, lotus.timeout_secs);
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

/// Resolver backed by `lotus client retrieve`, when a wallet is configured.
pub(super) fn lotus_resolver(cfg: &RebuilderConfig) -> Option<ProviderFallbackResolver> {
    let lotus = cfg.lotus.as_ref().filter(|l| !l.wallet.trim().is_empty())?;
    let retriever = Arc::new(LotusRetriever::new(lotus));
    Some(
        ProviderFallbackResolver::new(retriever, lotus.wallet.trim())
            .with_attempt_timeout(lotus.attempt_timeout()),
    )
}

/// Shard and output directories for `name`.
pub(super) fn request(
    cfg: &RebuilderConfig,
    name: &str,
    save_path: Option<PathBuf>,
    artifacts: Vec<ArtifactSpec>,
) -> RecoveryRequest {
    let output_root = save_path.unwrap_or_else(|| cfg.task.output_path.clone());
    RecoveryRequest {
        name: name.to_string(),
        input_dir: cfg.task.input_path.join(name),
        output_dir: output_root.join(name),
        artifacts,
    }
}

/// Run the pipeline for `req` and return the public location of the result.
/// Ctrl-C aborts the recovery.
pub(super) async fn recover(
    cfg: &RebuilderConfig,
    resolver: Option<ProviderFallbackResolver>,
    req: &RecoveryRequest,
) -> Result<String> {
    let retry = RetryPolicy::from(&cfg.retry_or_default());
    let agent = Arc::new(Aria2Client::new(&cfg.aria2, retry));
    tracing::info!(endpoint = agent.endpoint(), "using aria2");
    let scheduler = JobScheduler::new(
        agent,
        SchedulerOptions {
            concurrency: cfg.task.effective_parallel(),
            poll_interval: cfg.task.poll_interval(),
            deadline: cfg.task.deadline(),
        },
    );

    let abort = AbortHandle::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, aborting recovery");
                abort.abort();
            }
        });
    }

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<SchedulerSnapshot>(16);
    let progress_handle = tokio::spawn(async move {
        let mut last: Option<SchedulerSnapshot> = None;
        while let Some(snap) = progress_rx.recv().await {
            if last.as_ref() != Some(&snap) {
                println!(
                    "  shards: {}/{} done, {} active, {} queued, {} failed",
                    snap.succeeded,
                    snap.total(),
                    snap.active,
                    snap.pending,
                    snap.failed
                );
                last = Some(snap);
            }
        }
    });

    let mut orchestrator = PipelineOrchestrator::new(
        scheduler,
        Arc::new(GraphsplitReassembler::new(&cfg.reassembly)),
        Arc::new(HttpUploader::new(&cfg.upload, retry)),
    );
    match resolver {
        Some(r) => orchestrator = orchestrator.with_resolver(r),
        None => tracing::info!("no wallet configured, provider fallback disabled"),
    }
    let orchestrator = orchestrator
        .with_abort(abort)
        .with_progress(progress_tx)
        .with_span(tracing::info_span!("rebuilder"));

    let result = orchestrator
        .recover(req)
        .await
        .with_context(|| format!("recover {}", req.name));
    drop(orchestrator);
    let _ = progress_handle.await;
    result
}
