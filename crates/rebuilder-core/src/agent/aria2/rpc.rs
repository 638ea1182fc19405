//! JSON-RPC over HTTP POST using libcurl on the blocking pool.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::payload::{self, RpcRequest};
use crate::agent::AgentError;
use crate::retry::{run_with_retry, RetryPolicy, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) struct RpcTransport {
    url: String,
    timeout: Duration,
    policy: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub(crate) fn new(url: String, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            url,
            timeout,
            policy,
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Call `method`; transient transport failures are retried per policy.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, AgentError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: format!("rebuilder-{}", id),
            method,
            params,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| AgentError::Protocol(format!("encode {}: {}", method, e)))?;

        let response = run_with_retry(&self.policy, method, || {
            let url = self.url.clone();
            let body = body.clone();
            let timeout = self.timeout;
            async move {
                tokio::task::spawn_blocking(move || post_json(&url, &body, timeout))
                    .await
                    .map_err(|e| TransportError::Join(e.to_string()))?
            }
        })
        .await;

        match response {
            Ok(bytes) => payload::decode_response(&bytes),
            Err(TransportError::Http { status, body }) => Err(payload::rejection_from_body(&body)
                .unwrap_or_else(|| {
                    AgentError::Protocol(format!("{} {}: HTTP {}", method, self.url, status))
                })),
            Err(e) => Err(AgentError::Protocol(format!("{} {}: {}", method, self.url, e))),
        }
    }
}

/// POST `body` as JSON and return the response body. Runs in the current thread.
fn post_json(url: &str, body: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.post(true)?;
    easy.post_fields_copy(body)?;
    easy.connect_timeout(CONNECT_TIMEOUT)?;
    easy.timeout(timeout)?;

    let mut list = curl::easy::List::new();
    list.append("Content-Type: application/json; charset=UTF-8")?;
    easy.http_headers(list)?;

    let mut out = Vec::new();
    {
        let mut transfer = easy.transfer();
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
