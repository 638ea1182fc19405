//! The recovery flow.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{Instrument, Span};

use crate::control::AbortHandle;
use crate::error::RecoveryError;
use crate::provider::ProviderFallbackResolver;
use crate::reassemble::Reassembler;
use crate::storage;
use crate::transfer::{JobScheduler, SchedulerSnapshot, TransferSource};
use crate::upload::Uploader;

use super::plan::{plan_artifacts, PlannedArtifact};
use super::session::RecoverySession;
use super::shards::{list_outputs, object_key, verify_shard_set};
use super::RecoveryRequest;

/// Composes direct download, provider fallback, reassembly and upload.
pub struct PipelineOrchestrator {
    scheduler: JobScheduler,
    resolver: Option<ProviderFallbackResolver>,
    reassembler: Arc<dyn Reassembler>,
    uploader: Arc<dyn Uploader>,
    abort: AbortHandle,
    overwrite: bool,
    span: Span,
}

impl PipelineOrchestrator {
    pub fn new(scheduler: JobScheduler, reassembler: Arc<dyn Reassembler>, uploader: Arc<dyn Uploader>) -> Self {
        Self {
            scheduler,
            resolver: None,
            reassembler,
            uploader,
            abort: AbortHandle::new(),
            overwrite: true,
            span: tracing::info_span!("pipeline"),
        }
    }

    /// Enable provider retrieval for artifacts that direct download did not deliver.
    pub fn with_resolver(mut self, resolver: ProviderFallbackResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Abort flag shared with the scheduler; also checked between phases.
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.scheduler = self.scheduler.with_abort(abort.clone());
        self.abort = abort;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<SchedulerSnapshot>) -> Self {
        self.scheduler = self.scheduler.with_progress(tx);
        self
    }

    /// Whether uploads may replace an existing object (default true).
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Parent span; the scheduler and resolver log under child spans of it.
    pub fn with_span(mut self, span: Span) -> Self {
        self.scheduler = self
            .scheduler
            .with_span(tracing::info_span!(parent: &span, "scheduler"));
        self.resolver = self
            .resolver
            .map(|r| r.with_span(tracing::info_span!(parent: &span, "resolver")));
        self.span = span;
        self
    }

    /// Recover `req` and return the public location of the uploaded artifact.
    pub async fn recover(&self, req: &RecoveryRequest) -> Result<String, RecoveryError> {
        let span = tracing::info_span!(parent: &self.span, "recover", name = %req.name);
        self.run(req).instrument(span).await
    }

    async fn run(&self, req: &RecoveryRequest) -> Result<String, RecoveryError> {
        let plan = plan_artifacts(&req.artifacts)?;
        let mut session = RecoverySession::open(req, self.scheduler.concurrency()).await?;
        tracing::info!(
            name = session.name(),
            artifacts = plan.len(),
            input = %session.input_dir().display(),
            output = %session.output_dir().display(),
            "recovery started"
        );

        let missing = self.download_direct(&plan, &mut session).await?;
        if !missing.is_empty() {
            self.retrieve_missing(&missing, &mut session).await?;
        }
        self.check_abort()?;

        let expected: Vec<String> = plan.iter().map(|p| p.file_name.clone()).collect();
        verify_shard_set(session.input_dir(), &expected).await?;
        let counts = session.counts();
        tracing::info!(succeeded = counts.succeeded, failed = counts.failed, "shards complete, start restore");

        self.reassembler
            .reassemble(session.input_dir(), session.output_dir(), session.concurrency())
            .await
            .map_err(|e| RecoveryError::ReassemblyFailed(format!("{:#}", e)))?;
        self.check_abort()?;

        let location = self.upload_outputs(&session).await?;
        tracing::info!(location = %location, "recovery finished");
        Ok(location)
    }

    /// Phase 1. Returns the artifacts still missing afterwards, or the
    /// download error when none of them can fall back to providers.
    async fn download_direct<'p>(
        &self,
        plan: &'p [PlannedArtifact],
        session: &mut RecoverySession,
    ) -> Result<Vec<&'p PlannedArtifact>, RecoveryError> {
        let sources: Vec<TransferSource> = plan
            .iter()
            .filter_map(|p| {
                p.spec
                    .direct_url
                    .as_deref()
                    .map(|url| TransferSource::new(url, session.input_dir(), p.file_name.clone()))
            })
            .collect();
        if sources.is_empty() {
            return Ok(plan.iter().collect());
        }

        // A shard left by an earlier run is downloaded again, not renamed around.
        for src in &sources {
            storage::discard(&src.dest_path()).await;
        }
        tracing::info!(sources = sources.len(), "start download");
        let outcome = self.scheduler.submit_with_report(sources).await;
        session.record_transfers(&outcome);

        let landed: HashSet<&str> = outcome.succeeded().map(|s| s.dest_name.as_str()).collect();
        let missing: Vec<&PlannedArtifact> = plan
            .iter()
            .filter(|p| !landed.contains(p.file_name.as_str()))
            .collect();

        match outcome.error {
            None => Ok(missing),
            Some(RecoveryError::Aborted) => Err(RecoveryError::Aborted),
            Some(err) if self.can_fall_back(&missing) => {
                tracing::warn!(missing = missing.len(), "direct download failed, falling back to providers: {}", err);
                Ok(missing)
            }
            Some(err) => Err(err),
        }
    }

    fn can_fall_back(&self, missing: &[&PlannedArtifact]) -> bool {
        self.resolver.is_some() && missing.iter().all(|p| p.spec.has_fallback())
    }

    /// Phase 2: sequential provider retrieval; the first artifact that cannot
    /// be retrieved ends the recovery.
    async fn retrieve_missing(
        &self,
        missing: &[&PlannedArtifact],
        session: &mut RecoverySession,
    ) -> Result<(), RecoveryError> {
        let Some(resolver) = &self.resolver else {
            return Err(RecoveryError::InvalidRequest(format!(
                "{} shard(s) need provider retrieval, which is not configured",
                missing.len()
            )));
        };
        if let Some(p) = missing.iter().find(|p| !p.spec.has_fallback()) {
            return Err(RecoveryError::InvalidRequest(format!(
                "no content address or providers for {}",
                p.label()
            )));
        }

        for p in missing {
            self.check_abort()?;
            let dest = session.input_dir().join(&p.file_name);
            // Whatever a failed direct download left behind is not trusted.
            storage::discard(&dest).await;
            session.retrieval_started();
            let res = resolver.resolve(&p.spec, &dest).await;
            session.retrieval_finished(res.is_ok());
            res?;
        }
        Ok(())
    }

    async fn upload_outputs(&self, session: &RecoverySession) -> Result<String, RecoveryError> {
        let outputs = list_outputs(session.output_dir()).await?;
        if outputs.is_empty() {
            return Err(RecoveryError::ReassemblyFailed(format!(
                "no files produced in {}",
                session.output_dir().display()
            )));
        }
        let mut location = String::new();
        for path in &outputs {
            let key = object_key(session.output_dir(), path)?;
            tracing::info!(file = %path.display(), key = %key, "upload file");
            location = self
                .uploader
                .upload(path, &key, self.overwrite)
                .await
                .map_err(|e| RecoveryError::StorageUploadFailed {
                    path: path.clone(),
                    reason: format!("{:#}", e),
                })?;
        }
        Ok(location)
    }

    fn check_abort(&self) -> Result<(), RecoveryError> {
        if self.abort.is_aborted() {
            return Err(RecoveryError::Aborted);
        }
        Ok(())
    }
}
