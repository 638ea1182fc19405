//! Upload collaborator: hands the recovered file to durable storage.
//!
//! [`HttpUploader`] PUTs the file to `<endpoint>/<key>` with libcurl on the
//! blocking pool, retrying transient failures like the agent transport. The
//! key is the file's `/`-separated path relative to the output directory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::config::UploadConfig;
use crate::retry::{run_with_retry, RetryPolicy, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Stores `path` under `key` and returns its public location.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: &Path, key: &str, overwrite: bool) -> Result<String>;
}

#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
}

pub struct HttpUploader {
    endpoint: String,
    public_base: String,
    token: Option<String>,
    policy: RetryPolicy,
}

impl HttpUploader {
    pub fn new(cfg: &UploadConfig, policy: RetryPolicy) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            public_base: cfg.public_base.clone(),
            token: cfg.token.clone().filter(|t| !t.is_empty()),
            policy,
        }
    }

    /// `<base>/<key>`, each `/`-separated part of `key` percent-encoded as a path segment.
    fn join(base: &str, key: &str) -> Result<String> {
        let mut url = url::Url::parse(base).with_context(|| format!("invalid upload URL {}", base))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("upload URL {} cannot take a path", base))?
            .pop_if_empty()
            .extend(key.split('/').filter(|s| !s.is_empty()));
        Ok(url.to_string())
    }

    fn public_url(&self, key: &str, body: &[u8]) -> Result<String> {
        if let Ok(resp) = serde_json::from_slice::<UploadResponse>(body) {
            if let Some(url) = resp.url.filter(|u| !u.is_empty()) {
                return Ok(url);
            }
        }
        let base = if self.public_base.is_empty() {
            &self.endpoint
        } else {
            &self.public_base
        };
        Self::join(base, key)
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, path: &Path, key: &str, overwrite: bool) -> Result<String> {
        if key.split('/').all(str::is_empty) {
            anyhow::bail!("empty upload key for {}", path.display());
        }
        let target = Self::join(&self.endpoint, key)?;
        tracing::info!(file = %path.display(), target = %target, "uploading");

        let body = run_with_retry(&self.policy, "upload", || {
            let target = target.clone();
            let path = path.to_path_buf();
            let token = self.token.clone();
            async move {
                tokio::task::spawn_blocking(move || put_file(&target, &path, token.as_deref(), overwrite))
                    .await
                    .map_err(|e| TransportError::Join(e.to_string()))?
            }
        })
        .await
        .with_context(|| format!("PUT {}", target))?;

        let url = self.public_url(key, &body)?;
        tracing::info!(url = %url, "upload finished");
        Ok(url)
    }
}

/// PUT the file at `path` to `target` and return the response body. Runs in the current thread.
fn put_file(target: &str, path: &Path, token: Option<&str>, overwrite: bool) -> Result<Vec<u8>, TransportError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut easy = curl::easy::Easy::new();
    easy.url(target)?;
    easy.upload(true)?;
    easy.in_filesize(size)?;
    easy.connect_timeout(CONNECT_TIMEOUT)?;
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(Duration::from_secs(60))?;

    let mut list = curl::easy::List::new();
    list.append("Content-Type: application/octet-stream")?;
    if let Some(t) = token {
        list.append(&format!("Authorization: Bearer {}", t))?;
    }
    if !overwrite {
        list.append("If-None-Match: *")?;
    }
    easy.http_headers(list)?;

    let mut out = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.read_function(|buf| Ok(file.read(buf).unwrap_or(0)))?;
        transfer.write_function(|data| {
            out.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransportError::Http {
            status: code,
            body: String::from_utf8_lossy(&out).into_owned(),
        });
    }
    Ok(out)
}
