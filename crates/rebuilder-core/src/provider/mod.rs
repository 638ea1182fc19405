//! Provider retrieval: artifacts known by content address, the retrieval
//! collaborator boundary, and the ordered fallback over candidate providers.

mod lotus;
mod resolver;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub use lotus::LotusRetriever;
pub use resolver::ProviderFallbackResolver;

/// A party that can serve a shard by content address (a storage miner).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Provider {
    pub id: String,
    /// Retriever-specific address; when absent the retriever uses `id`.
    pub address: Option<String>,
}

impl Provider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: None,
        }
    }

    /// What to hand the retrieval tool.
    pub fn target(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// One shard to recover: content address, candidates in priority order, and
/// an optional direct-download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub cid: String,
    pub providers: Vec<Provider>,
    pub direct_url: Option<String>,
}

impl ArtifactSpec {
    pub fn new(cid: impl Into<String>, providers: Vec<Provider>) -> Self {
        Self {
            cid: cid.into(),
            providers,
            direct_url: None,
        }
    }

    pub fn with_direct_url(mut self, url: impl Into<String>) -> Self {
        self.direct_url = Some(url.into());
        self
    }

    /// True when provider retrieval is possible at all.
    pub fn has_fallback(&self) -> bool {
        !self.cid.trim().is_empty() && !self.providers.is_empty()
    }
}

/// Arguments of one retrieval attempt.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub cid: String,
    pub provider: Provider,
    /// Wallet paying for the retrieval.
    pub payer: String,
    /// Where to write the shard (a staging path; the resolver promotes it).
    pub dest: PathBuf,
    /// Time budget of the attempt. The resolver enforces it.
    pub timeout: Duration,
}

/// Retrieval collaborator. Must write the whole shard to `req.dest` or fail.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, req: &RetrievalRequest) -> anyhow::Result<()>;
}
