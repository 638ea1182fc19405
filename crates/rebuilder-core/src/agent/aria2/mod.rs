//! aria2 transfer agent over JSON-RPC.
//!
//! `aria2.addUri` starts a download and returns its gid, `aria2.tellStatus`
//! reports progress and `aria2.forceRemove` stops it.

mod payload;
mod rpc;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::{AgentError, AgentStatus, JobHandle, TransferAgent};
use crate::config::Aria2Config;
use crate::retry::RetryPolicy;

use payload::{StatusResult, METHOD_ADD_URI, METHOD_FORCE_REMOVE, METHOD_TELL_STATUS};
use rpc::RpcTransport;

/// Client for an aria2 daemon started with `--enable-rpc`.
pub struct Aria2Client {
    transport: RpcTransport,
    token: Option<String>,
}

impl Aria2Client {
    pub fn new(cfg: &Aria2Config, policy: RetryPolicy) -> Self {
        Self::with_url(
            cfg.rpc_url(),
            &cfg.secret,
            Duration::from_secs(cfg.rpc_timeout_secs.max(1)),
            policy,
        )
    }

    /// Client for an explicit JSON-RPC endpoint (e.g. `http://127.0.0.1:6800/jsonrpc`).
    pub fn with_url(url: String, secret: &str, timeout: Duration, policy: RetryPolicy) -> Self {
        let token = Some(secret.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            transport: RpcTransport::new(url, timeout, policy),
            token,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.url()
    }
}

#[async_trait]
impl TransferAgent for Aria2Client {
    async fn start_transfer(
        &self,
        url: &str,
        dest_dir: &Path,
        dest_name: &str,
    ) -> Result<JobHandle, AgentError> {
        let dir = dest_dir.to_string_lossy();
        let params = payload::add_uri_params(self.token.as_deref(), url, &dir, dest_name);
        let gid: String = self.transport.call(METHOD_ADD_URI, params).await?;
        if gid.is_empty() {
            return Err(AgentError::Protocol(format!("{} returned an empty gid", METHOD_ADD_URI)));
        }
        Ok(JobHandle::new(gid))
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<AgentStatus, AgentError> {
        let params = payload::gid_params(self.token.as_deref(), handle.as_str());
        let result: StatusResult = self.transport.call(METHOD_TELL_STATUS, params).await?;
        payload::status_from_result(result)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), AgentError> {
        let params = payload::gid_params(self.token.as_deref(), handle.as_str());
        let _: String = self.transport.call(METHOD_FORCE_REMOVE, params).await?;
        Ok(())
    }
}
