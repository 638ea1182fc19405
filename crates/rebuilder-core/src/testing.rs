//! In-process fakes for the collaborator traits, shared by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::agent::{AgentError, AgentState, AgentStatus, JobHandle, TransferAgent};
use crate::provider::{RetrievalRequest, Retriever};
use crate::reassemble::Reassembler;
use crate::upload::Uploader;

/// How a fake transfer behaves once started.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Completes on the `polls`-th status query, writing `bytes` bytes.
    Complete { polls: usize, bytes: usize },
    /// Completes but reports `reported` bytes while writing `bytes`.
    WrongSize { polls: usize, bytes: usize, reported: u64 },
    /// Completes after writing the file under a renamed path (`a.car` -> `a.1.car`).
    WrongPath { polls: usize, bytes: usize },
    /// Fails on the `polls`-th status query.
    Fail { polls: usize, msg: String },
    /// Reports a state the scheduler does not know.
    Unknown,
    /// The agent refuses to start it.
    Reject(String),
    /// Stays active forever.
    Never,
}

struct FakeJob {
    dest: PathBuf,
    script: Script,
    polls: usize,
    done: bool,
}

#[derive(Default)]
struct FakeAgentState {
    next_gid: u64,
    jobs: HashMap<String, FakeJob>,
    started: Vec<String>,
    cancelled: Vec<String>,
    active: usize,
    max_active: usize,
    polls_after_done: usize,
}

/// Scriptable [`TransferAgent`] that records what the scheduler asked of it.
pub(crate) struct FakeAgent {
    scripts: HashMap<String, Script>,
    default: Script,
    renames_existing: bool,
    state: Mutex<FakeAgentState>,
}

/// `dir/a.car` -> `dir/a.1.car`, the way aria2 avoids an existing file.
fn renamed(dest_dir: &Path, dest_name: &str) -> PathBuf {
    let name = match dest_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}.1.{}", stem, ext),
        None => format!("{}.1", dest_name),
    };
    dest_dir.join(name)
}

impl FakeAgent {
    /// Every URL completes after `polls` queries with `bytes` bytes.
    pub(crate) fn completing(polls: usize, bytes: usize) -> Self {
        Self {
            scripts: HashMap::new(),
            default: Script::Complete { polls, bytes },
            renames_existing: false,
            state: Mutex::new(FakeAgentState::default()),
        }
    }

    pub(crate) fn script(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    /// Like aria2 with auto file renaming: a destination that already exists
    /// at start is written under a renamed path instead.
    pub(crate) fn renaming_existing(mut self) -> Self {
        self.renames_existing = true;
        self
    }

    /// URLs in the order they were started.
    pub(crate) fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub(crate) fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub(crate) fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    /// Status queries for jobs that had already reported a terminal state.
    pub(crate) fn polls_after_done(&self) -> usize {
        self.state.lock().unwrap().polls_after_done
    }
}

#[async_trait]
impl TransferAgent for FakeAgent {
    async fn start_transfer(
        &self,
        url: &str,
        dest_dir: &Path,
        dest_name: &str,
    ) -> Result<JobHandle, AgentError> {
        let script = self.scripts.get(url).cloned().unwrap_or_else(|| self.default.clone());
        let mut st = self.state.lock().unwrap();
        st.started.push(url.to_string());
        if let Script::Reject(msg) = script {
            return Err(AgentError::Rejected(msg));
        }
        st.next_gid += 1;
        let gid = format!("gid-{}", st.next_gid);
        let exact = dest_dir.join(dest_name);
        let dest = if matches!(script, Script::WrongPath { .. }) || (self.renames_existing && exact.exists()) {
            renamed(dest_dir, dest_name)
        } else {
            exact
        };
        st.jobs.insert(
            gid.clone(),
            FakeJob {
                dest,
                script,
                polls: 0,
                done: false,
            },
        );
        st.active += 1;
        st.max_active = st.max_active.max(st.active);
        Ok(JobHandle::new(gid))
    }

    async fn poll_status(&self, handle: &JobHandle) -> Result<AgentStatus, AgentError> {
        let mut st = self.state.lock().unwrap();
        let FakeAgentState {
            jobs,
            active,
            polls_after_done,
            ..
        } = &mut *st;
        let job = jobs
            .get_mut(handle.as_str())
            .ok_or_else(|| AgentError::Protocol(format!("unknown gid {}", handle)))?;
        job.polls += 1;
        if job.done {
            *polls_after_done += 1;
            return Ok(AgentStatus::new(AgentState::Complete));
        }

        let mut status = AgentStatus::new(AgentState::Active);
        status.path = Some(job.dest.clone());
        match job.script.clone() {
            Script::Complete { polls, bytes }
            | Script::WrongSize { polls, bytes, .. }
            | Script::WrongPath { polls, bytes }
                if job.polls >= polls =>
            {
                std::fs::write(&job.dest, vec![7u8; bytes]).map_err(|e| AgentError::Protocol(e.to_string()))?;
                status.state = AgentState::Complete;
                status.completed_bytes = bytes as u64;
                status.total_bytes = match job.script {
                    Script::WrongSize { reported, .. } => reported,
                    _ => bytes as u64,
                };
            }
            Script::Complete { bytes, .. } | Script::WrongSize { bytes, .. } | Script::WrongPath { bytes, .. } => {
                status.total_bytes = bytes as u64;
                status.completed_bytes = bytes as u64 / 2;
                status.download_speed = 1024;
            }
            Script::Fail { polls, msg } if job.polls >= polls => {
                status.state = AgentState::Failed(msg);
            }
            Script::Fail { .. } | Script::Never | Script::Reject(_) => {}
            Script::Unknown => {
                status.state = AgentState::Unknown("mystery".to_string());
            }
        }
        if !matches!(status.state, AgentState::Active) {
            job.done = true;
            *active -= 1;
        }
        Ok(status)
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), AgentError> {
        let mut st = self.state.lock().unwrap();
        st.cancelled.push(handle.to_string());
        let was_running = match st.jobs.get_mut(handle.as_str()) {
            Some(job) if !job.done => {
                job.done = true;
                true
            }
            _ => false,
        };
        if was_running {
            st.active -= 1;
        }
        Ok(())
    }
}

/// How a fake provider answers a retrieval.
#[derive(Debug, Clone)]
pub(crate) enum RetrieveScript {
    Write(Vec<u8>),
    Fail(String),
    /// Writes some bytes to the destination, then fails.
    PartialThenFail(Vec<u8>),
    Hang,
}

/// Scriptable [`Retriever`] keyed by provider id. Unknown providers fail.
#[derive(Default)]
pub(crate) struct FakeRetriever {
    scripts: HashMap<String, RetrieveScript>,
    requests: Mutex<Vec<RetrievalRequest>>,
}

impl FakeRetriever {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(mut self, provider: &str, script: RetrieveScript) -> Self {
        self.scripts.insert(provider.to_string(), script);
        self
    }

    /// Provider ids in the order they were asked.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.provider.id.clone()).collect()
    }

    pub(crate) fn requests(&self) -> Vec<RetrievalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, req: &RetrievalRequest) -> anyhow::Result<()> {
        self.requests.lock().unwrap().push(req.clone());
        let script = self
            .scripts
            .get(&req.provider.id)
            .cloned()
            .unwrap_or_else(|| RetrieveScript::Fail("unknown provider".to_string()));
        match script {
            RetrieveScript::Write(bytes) => {
                tokio::fs::write(&req.dest, bytes).await?;
                Ok(())
            }
            RetrieveScript::Fail(msg) => anyhow::bail!(msg),
            RetrieveScript::PartialThenFail(bytes) => {
                tokio::fs::write(&req.dest, bytes).await?;
                anyhow::bail!("connection reset mid-transfer")
            }
            RetrieveScript::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// Ordered record of collaborator calls across fakes.
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

/// Writes the configured files into the output directory.
pub(crate) struct FakeReassembler {
    outputs: Vec<(String, Vec<u8>)>,
    fail: Option<String>,
    log: EventLog,
}

impl FakeReassembler {
    pub(crate) fn new(log: EventLog, outputs: &[(&str, &[u8])]) -> Self {
        Self {
            outputs: outputs.iter().map(|(n, b)| (n.to_string(), b.to_vec())).collect(),
            fail: None,
            log,
        }
    }

    pub(crate) fn failing(log: EventLog, msg: &str) -> Self {
        Self {
            outputs: Vec::new(),
            fail: Some(msg.to_string()),
            log,
        }
    }
}

#[async_trait]
impl Reassembler for FakeReassembler {
    async fn reassemble(&self, shard_dir: &Path, output_dir: &Path, _concurrency: usize) -> anyhow::Result<()> {
        let mut shards: Vec<String> = std::fs::read_dir(shard_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        shards.sort();
        self.log
            .lock()
            .unwrap()
            .push(format!("reassemble:{}", shards.join(",")));
        if let Some(msg) = &self.fail {
            anyhow::bail!("{}", msg);
        }
        for (name, bytes) in &self.outputs {
            let path = output_dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
        }
        Ok(())
    }
}

/// Records uploads and returns a gateway URL per file name.
pub(crate) struct FakeUploader {
    fail: bool,
    log: EventLog,
}

impl FakeUploader {
    pub(crate) fn new(log: EventLog) -> Self {
        Self { fail: false, log }
    }

    pub(crate) fn failing(log: EventLog) -> Self {
        Self { fail: true, log }
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, path: &Path, key: &str, _overwrite: bool) -> anyhow::Result<String> {
        assert!(path.ends_with(key), "{} uploaded as {}", path.display(), key);
        self.log.lock().unwrap().push(format!("upload:{}", key));
        if self.fail {
            anyhow::bail!("bucket unavailable");
        }
        Ok(format!("https://gw.example.com/ipfs/{}", key))
    }
}
