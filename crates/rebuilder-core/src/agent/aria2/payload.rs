//! aria2 JSON-RPC request/response shapes and status mapping.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::agent::{AgentError, AgentState, AgentStatus};

pub(crate) const METHOD_ADD_URI: &str = "aria2.addUri";
pub(crate) const METHOD_TELL_STATUS: &str = "aria2.tellStatus";
pub(crate) const METHOD_FORCE_REMOVE: &str = "aria2.forceRemove";

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'a str,
    pub params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Result of `aria2.tellStatus`. aria2 encodes every number as a string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StatusResult {
    pub gid: String,
    pub status: String,
    pub total_length: String,
    pub completed_length: String,
    pub download_speed: String,
    pub error_code: String,
    pub error_message: String,
    pub files: Vec<StatusFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StatusFile {
    pub path: String,
    pub length: String,
    pub completed_length: String,
}

/// Leading params: `token:<secret>` only when a secret is configured.
pub(crate) fn with_token(token: Option<&str>, rest: Vec<Value>) -> Vec<Value> {
    let mut params = Vec::with_capacity(rest.len() + 1);
    if let Some(t) = token {
        params.push(Value::String(format!("token:{}", t)));
    }
    params.extend(rest);
    params
}

/// `addUri` params. The daemon must write exactly `dir/out`: an existing file
/// is replaced, never renamed to `out.1`.
pub(crate) fn add_uri_params(token: Option<&str>, url: &str, dir: &str, out: &str) -> Vec<Value> {
    with_token(
        token,
        vec![
            json!([url]),
            json!({
                "dir": dir,
                "out": out,
                "allow-overwrite": "true",
                "auto-file-renaming": "false",
            }),
        ],
    )
}

pub(crate) fn gid_params(token: Option<&str>, gid: &str) -> Vec<Value> {
    with_token(token, vec![Value::String(gid.to_string())])
}

/// Decode a JSON-RPC response body. An `error` object is a rejection by the agent.
pub(crate) fn decode_response<T: DeserializeOwned>(body: &[u8]) -> Result<T, AgentError> {
    let resp: RpcResponse<T> = serde_json::from_slice(body)
        .map_err(|e| AgentError::Protocol(format!("invalid JSON-RPC response: {}", e)))?;
    if let Some(err) = resp.error {
        return Err(AgentError::Rejected(format!("{} (code {})", err.message, err.code)));
    }
    resp.result
        .ok_or_else(|| AgentError::Protocol("JSON-RPC response without result".to_string()))
}

/// Only returns a rejection if `body` is a JSON-RPC error object.
pub(crate) fn rejection_from_body(body: &str) -> Option<AgentError> {
    let resp: RpcResponse<Value> = serde_json::from_str(body).ok()?;
    resp.error
        .map(|err| AgentError::Rejected(format!("{} (code {})", err.message, err.code)))
}

fn parse_len(s: &str) -> u64 {
    s.trim().parse().unwrap_or(0)
}

/// Map a `tellStatus` result to an `AgentStatus`. A status must describe exactly one file.
pub(crate) fn status_from_result(result: StatusResult) -> Result<AgentStatus, AgentError> {
    if result.files.len() != 1 {
        return Err(AgentError::Protocol(format!(
            "invalid status response for {}: expected 1 file, got {}",
            result.gid,
            result.files.len()
        )));
    }
    let file = &result.files[0];

    let state = match result.status.as_str() {
        "waiting" | "paused" => AgentState::Pending,
        "active" => AgentState::Active,
        "complete" => AgentState::Complete,
        "error" => {
            let msg = if result.error_message.is_empty() {
                format!("aria2 error code {}", result.error_code)
            } else {
                result.error_message.clone()
            };
            AgentState::Failed(msg)
        }
        "removed" => AgentState::Failed("transfer removed".to_string()),
        other => AgentState::Unknown(other.to_string()),
    };

    let total = match parse_len(&file.length) {
        0 => parse_len(&result.total_length),
        n => n,
    };
    let completed = match parse_len(&file.completed_length) {
        0 => parse_len(&result.completed_length),
        n => n,
    };

    Ok(AgentStatus {
        state,
        completed_bytes: completed,
        total_bytes: total,
        download_speed: parse_len(&result.download_speed),
        path: Some(file.path.as_str())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from),
    })
}
