//! Ordered provider fallback for one artifact.
//!
//! Providers are tried strictly in list order and the first success wins.
//! Each attempt writes to `<dest>.part` under a timeout; the staging file is
//! renamed into place only after success and removed otherwise, so `dest`
//! never holds a partial shard.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, Span};

use crate::error::{ProviderFailure, RecoveryError};
use crate::storage;

use super::{ArtifactSpec, Provider, RetrievalRequest, Retriever};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(600);

pub struct ProviderFallbackResolver {
    retriever: Arc<dyn Retriever>,
    payer: String,
    attempt_timeout: Duration,
    span: Span,
}

impl ProviderFallbackResolver {
    pub fn new(retriever: Arc<dyn Retriever>, payer: impl Into<String>) -> Self {
        Self {
            retriever,
            payer: payer.into(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            span: tracing::info_span!("resolver"),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Retrieve `spec` into `dest`, trying each provider in order.
    ///
    /// Returns the provider that delivered it, or `AllProvidersExhausted`
    /// listing every attempt. Local I/O failures abort immediately.
    pub async fn resolve(&self, spec: &ArtifactSpec, dest: &Path) -> Result<Provider, RecoveryError> {
        if spec.cid.trim().is_empty() {
            return Err(RecoveryError::InvalidRequest("artifact without content address".to_string()));
        }
        if spec.providers.is_empty() {
            return Err(RecoveryError::InvalidRequest(format!("no providers for {}", spec.cid)));
        }

        let span = self.span.clone();
        async move {
            let staging = storage::temp_path(dest);
            let mut attempts = Vec::with_capacity(spec.providers.len());
            for provider in &spec.providers {
                match self.attempt(&spec.cid, provider, dest, &staging).await {
                    Ok(()) => {
                        tracing::info!(cid = %spec.cid, provider = %provider, dest = %dest.display(), "retrieve succeeded");
                        return Ok(provider.clone());
                    }
                    Err(RecoveryError::ProviderUnavailable { provider, reason, .. }) => {
                        tracing::warn!(cid = %spec.cid, provider = %provider, "retrieve failed: {}", reason);
                        attempts.push(ProviderFailure { provider, reason });
                    }
                    Err(e) => return Err(e),
                }
            }
            tracing::error!(cid = %spec.cid, attempts = attempts.len(), "all providers exhausted");
            Err(RecoveryError::AllProvidersExhausted {
                cid: spec.cid.clone(),
                attempts,
            })
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        cid: &str,
        provider: &Provider,
        dest: &Path,
        staging: &Path,
    ) -> Result<(), RecoveryError> {
        storage::clear_staging(staging).await?;
        let req = RetrievalRequest {
            cid: cid.to_string(),
            provider: provider.clone(),
            payer: self.payer.clone(),
            dest: staging.to_path_buf(),
            timeout: self.attempt_timeout,
        };
        tracing::info!(cid, provider = %provider, "retrieving from provider");

        let reason = match tokio::time::timeout(self.attempt_timeout, self.retriever.retrieve(&req)).await {
            Ok(Ok(())) => match storage::promote(staging, dest).await {
                Ok(()) => return Ok(()),
                Err(e) => format!("{:#}", e),
            },
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {}s", self.attempt_timeout.as_secs_f64()),
        };
        storage::discard(staging).await;
        Err(RecoveryError::ProviderUnavailable {
            cid: cid.to_string(),
            provider: provider.id.clone(),
            reason,
        })
    }
}
