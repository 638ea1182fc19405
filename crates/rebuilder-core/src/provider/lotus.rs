//! Retrieval through the `lotus` command line client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::{RetrievalRequest, Retriever};
use crate::config::LotusConfig;

/// Env var the lotus client reads its full-node endpoint from.
const NODE_API_ENV: &str = "FULLNODE_API_INFO";

/// Runs `lotus client retrieve --provider <p> --from <payer> --car <cid> <dest>`.
/// The child is killed if the attempt is dropped (e.g. on timeout).
pub struct LotusRetriever {
    binary: String,
    node_api: String,
}

impl LotusRetriever {
    pub fn new(cfg: &LotusConfig) -> Self {
        Self {
            binary: cfg.binary.clone(),
            node_api: cfg.node_api.clone(),
        }
    }

    fn command(&self, req: &RetrievalRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("client")
            .arg("retrieve")
            .arg("--provider")
            .arg(req.provider.target())
            .arg("--from")
            .arg(&req.payer)
            .arg("--car")
            .arg(&req.cid)
            .arg(&req.dest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.node_api.is_empty() {
            cmd.env(NODE_API_ENV, &self.node_api);
        }
        cmd
    }
}

#[async_trait]
impl Retriever for LotusRetriever {
    async fn retrieve(&self, req: &RetrievalRequest) -> Result<()> {
        let output = self
            .command(req)
            .output()
            .await
            .with_context(|| format!("run {} client retrieve", self.binary))?;
        if !output.status.success() {
            anyhow::bail!(
                "{} client retrieve exited with {}: {}",
                self.binary,
                output.status,
                tail(&output.stderr)
            );
        }
        tracing::debug!(cid = %req.cid, provider = %req.provider, "lotus: {}", tail(&output.stdout));
        Ok(())
    }
}

/// Last non-empty line of a command's output, for error messages.
fn tail(out: &[u8]) -> String {
    String::from_utf8_lossy(out)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use std::ffi::OsStr;
    use std::path::PathBuf;
    use std::time::Duration;

    fn request() -> RetrievalRequest {
        RetrievalRequest {
            cid: "bafyshard".to_string(),
            provider: Provider::new("f01234"),
            payer: "f1payer".to_string(),
            dest: PathBuf::from("/in/movie/bafyshard.car.part"),
            timeout: Duration::from_secs(600),
        }
    }

    #[test]
    fn command_line_and_env() {
        let cfg = LotusConfig {
            node_api: "tok:/ip4/127.0.0.1/tcp/1234/http".to_string(),
            ..LotusConfig::default()
        };
        let cmd = LotusRetriever::new(&cfg).command(&request());
        let inner = cmd.as_std();
        assert_eq!(inner.get_program(), OsStr::new("lotus"));
        let args: Vec<_> = inner.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "client",
                "retrieve",
                "--provider",
                "f01234",
                "--from",
                "f1payer",
                "--car",
                "bafyshard",
                "/in/movie/bafyshard.car.part"
            ]
        );
        let env: Vec<_> = inner.get_envs().collect();
        assert_eq!(
            env,
            vec![(OsStr::new(NODE_API_ENV), Some(OsStr::new("tok:/ip4/127.0.0.1/tcp/1234/http")))]
        );
    }

    #[test]
    fn provider_address_overrides_id() {
        let mut req = request();
        req.provider.address = Some("t01234".to_string());
        let cmd = LotusRetriever::new(&LotusConfig::default()).command(&req);
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args[3], OsStr::new("t01234"));
        assert_eq!(cmd.as_std().get_envs().count(), 0);
    }

    #[test]
    fn tail_picks_last_line() {
        assert_eq!(tail(b"first\nERROR: deal rejected\n\n"), "ERROR: deal rejected");
        assert_eq!(tail(b""), "");
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let cfg = LotusConfig {
            binary: "/nonexistent/lotus-binary".to_string(),
            ..LotusConfig::default()
        };
        let err = LotusRetriever::new(&cfg).retrieve(&request()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("client retrieve"));
    }
}
