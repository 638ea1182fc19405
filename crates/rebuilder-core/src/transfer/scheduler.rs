//! The coordinating loop.
//!
//! A single task owns the pending queue, the active set and the settled map.
//! Each round it dispatches up to `concurrency` jobs, polls every active job
//! once, and then waits for the next tick. A slot freed by a completed job is
//! refilled right away instead of waiting for the tick. The first failure
//! stops dispatch, asks the agent to cancel what is still active, and is
//! returned to the caller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, Span};

use crate::agent::{AgentState, JobHandle, TransferAgent};
use crate::control::AbortHandle;
use crate::error::RecoveryError;

use super::job::{TerminalStatus, TransferJob};
use super::progress::{SchedulerSnapshot, TransferProgress};
use super::source::TransferSource;
use super::verify::verify_complete;

/// Scheduling knobs. `concurrency` is clamped to at least 1 and `poll_interval` to 1ms.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Upper bound on the whole submission; `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            poll_interval: Duration::from_secs(1),
            deadline: None,
        }
    }
}

/// Everything a submission settled, plus the error that ended it early (if any).
///
/// When `error` is set, jobs that were still active or pending are recorded as
/// failed so every submitted source appears exactly once.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub settled: HashMap<TransferSource, TerminalStatus>,
    pub error: Option<RecoveryError>,
}

impl SubmitOutcome {
    pub fn into_result(self) -> Result<HashMap<TransferSource, TerminalStatus>, RecoveryError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.settled),
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TransferSource> {
        self.settled
            .iter()
            .filter(|(_, st)| st.is_success())
            .map(|(src, _)| src)
    }
}

/// Runs batches of transfers through a [`TransferAgent`] with bounded concurrency.
pub struct JobScheduler {
    agent: Arc<dyn TransferAgent>,
    opts: SchedulerOptions,
    abort: AbortHandle,
    progress_tx: Option<mpsc::Sender<SchedulerSnapshot>>,
    span: Span,
}

impl JobScheduler {
    pub fn new(agent: Arc<dyn TransferAgent>, mut opts: SchedulerOptions) -> Self {
        opts.concurrency = opts.concurrency.max(1);
        opts.poll_interval = opts.poll_interval.max(Duration::from_millis(1));
        Self {
            agent,
            opts,
            abort: AbortHandle::new(),
            progress_tx: None,
            span: tracing::info_span!("scheduler"),
        }
    }

    /// Share an abort flag with the caller.
    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Receive a snapshot after every round. Snapshots are dropped when the channel is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<SchedulerSnapshot>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Span that every log line of a submission is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.opts.concurrency
    }

    /// Run `sources` to completion. Returns the terminal status of every source,
    /// or the first failure.
    pub async fn submit(
        &self,
        sources: Vec<TransferSource>,
    ) -> Result<HashMap<TransferSource, TerminalStatus>, RecoveryError> {
        self.submit_with_report(sources).await.into_result()
    }

    /// Like [`submit`](Self::submit) but keeps the per-source results when the
    /// submission fails, so the caller can tell which artifacts did land.
    pub async fn submit_with_report(&self, sources: Vec<TransferSource>) -> SubmitOutcome {
        if let Err(e) = validate_sources(&sources) {
            return SubmitOutcome {
                settled: HashMap::new(),
                error: Some(e),
            };
        }
        let total = sources.len();
        let run = SubmissionRun::new(self, sources);
        async move {
            tracing::info!(total, concurrency = self.opts.concurrency, "submitting transfers");
            run.drive().await
        }
        .instrument(self.span.clone())
        .await
    }
}

fn validate_sources(sources: &[TransferSource]) -> Result<(), RecoveryError> {
    if sources.is_empty() {
        return Err(RecoveryError::InvalidRequest("no transfer sources".to_string()));
    }
    let mut seen: HashSet<PathBuf> = HashSet::with_capacity(sources.len());
    for src in sources {
        if src.dest_name.is_empty() {
            return Err(RecoveryError::InvalidRequest(format!(
                "empty destination name for {}",
                src.url
            )));
        }
        if !seen.insert(src.dest_path()) {
            return Err(RecoveryError::InvalidRequest(format!(
                "two sources write to {}",
                src.dest_path().display()
            )));
        }
    }
    Ok(())
}

/// Owned state of one submission. Only `drive` touches it.
struct SubmissionRun<'a> {
    sched: &'a JobScheduler,
    pending: VecDeque<TransferJob>,
    active: Vec<(JobHandle, TransferJob)>,
    handles_seen: HashSet<JobHandle>,
    settled: HashMap<TransferSource, TerminalStatus>,
    succeeded: usize,
    failed: usize,
}

impl<'a> SubmissionRun<'a> {
    fn new(sched: &'a JobScheduler, sources: Vec<TransferSource>) -> Self {
        let total = sources.len();
        Self {
            sched,
            pending: sources.into_iter().map(TransferJob::new).collect(),
            active: Vec::with_capacity(sched.opts.concurrency),
            handles_seen: HashSet::with_capacity(total),
            settled: HashMap::with_capacity(total),
            succeeded: 0,
            failed: 0,
        }
    }

    async fn drive(mut self) -> SubmitOutcome {
        let result = self.run_loop().await;
        if let Err(e) = &result {
            self.abandon(e).await;
        }
        self.publish();
        SubmitOutcome {
            settled: self.settled,
            error: result.err(),
        }
    }

    async fn run_loop(&mut self) -> Result<(), RecoveryError> {
        let abort = self.sched.abort.clone();
        let deadline = self.sched.opts.deadline.map(|d| Instant::now() + d);
        let mut ticker = tokio::time::interval(self.sched.opts.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            if abort.is_aborted() {
                return Err(RecoveryError::Aborted);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.deadline_error());
            }

            self.dispatch().await?;
            if self.active.is_empty() {
                tracing::info!(succeeded = self.succeeded, "all transfers finished");
                return Ok(());
            }

            let freed = self.poll_active().await?;
            self.publish();
            if self.active.is_empty() && self.pending.is_empty() {
                tracing::info!(succeeded = self.succeeded, "all transfers finished");
                return Ok(());
            }
            if freed > 0 && !self.pending.is_empty() {
                continue;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = abort.aborted() => return Err(RecoveryError::Aborted),
                _ = sleep_until_opt(deadline) => return Err(self.deadline_error()),
            }
        }
    }

    fn deadline_error(&self) -> RecoveryError {
        RecoveryError::DeadlineExceeded {
            active: self.active.len(),
            pending: self.pending.len(),
        }
    }

    /// Start pending jobs while there is capacity.
    async fn dispatch(&mut self) -> Result<(), RecoveryError> {
        let sched = self.sched;
        let agent = &sched.agent;
        while self.active.len() < sched.opts.concurrency {
            let Some(mut job) = self.pending.pop_front() else {
                break;
            };
            let src = job.source().clone();
            tracing::info!(url = %src.url, dest = %src.dest_path().display(), "start download job");
            match agent.start_transfer(&src.url, &src.dest_dir, &src.dest_name).await {
                Ok(handle) => {
                    if !self.handles_seen.insert(handle.clone()) {
                        let reason = format!("agent reused job handle {}", handle);
                        self.settle_failed(job, &reason);
                        return Err(RecoveryError::AgentProtocol { url: src.url, reason });
                    }
                    tracing::info!(url = %src.url, gid = %handle, "download started");
                    job.activate(handle.clone());
                    self.active.push((handle, job));
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::error!(url = %src.url, "start download failed: {}", reason);
                    self.settle_failed(job, &reason);
                    return Err(RecoveryError::TransferFailed { url: src.url, reason });
                }
            }
        }
        Ok(())
    }

    /// Poll each active job once. Returns how many slots were freed.
    async fn poll_active(&mut self) -> Result<usize, RecoveryError> {
        let agent = Arc::clone(&self.sched.agent);
        let mut freed = 0;
        let mut i = 0;
        while i < self.active.len() {
            let (handle, job) = &self.active[i];
            let url = job.source().url.clone();
            let status = match agent.poll_status(handle).await {
                Ok(st) => st,
                Err(e) => {
                    let reason = e.to_string();
                    let (_, job) = self.active.remove(i);
                    self.settle_failed(job, &reason);
                    return Err(RecoveryError::AgentProtocol { url, reason });
                }
            };

            match &status.state {
                AgentState::Pending => {
                    tracing::debug!(url = %url, gid = %handle, "download waiting");
                    i += 1;
                }
                AgentState::Active => {
                    let p = TransferProgress::from(&status);
                    tracing::info!(
                        url = %url,
                        gid = %handle,
                        completed = p.completed_bytes,
                        total = p.total_bytes,
                        speed_kib = p.bytes_per_sec / 1024,
                        eta_secs = ?p.eta_secs(),
                        "download progress {:.2}%",
                        p.percent()
                    );
                    i += 1;
                }
                AgentState::Complete => {
                    let (handle, mut job) = self.active.remove(i);
                    match verify_complete(job.source(), &status).await {
                        Ok(bytes) => {
                            tracing::info!(url = %url, gid = %handle, bytes, "download completed");
                            job.succeed();
                            self.succeeded += 1;
                            self.settled
                                .insert(job.source().clone(), TerminalStatus::Succeeded { bytes });
                            freed += 1;
                        }
                        Err(reason) => {
                            tracing::error!(url = %url, gid = %handle, "completed download failed verification: {}", reason);
                            self.settle_failed(job, &reason);
                            return Err(RecoveryError::TransferFailed { url, reason });
                        }
                    }
                }
                AgentState::Failed(msg) => {
                    let reason = msg.clone();
                    let (handle, job) = self.active.remove(i);
                    tracing::error!(url = %url, gid = %handle, "download failed: {}", reason);
                    self.settle_failed(job, &reason);
                    return Err(RecoveryError::TransferFailed { url, reason });
                }
                AgentState::Unknown(state) => {
                    let reason = format!("invalid download status: {}", state);
                    let (_, job) = self.active.remove(i);
                    self.settle_failed(job, &reason);
                    return Err(RecoveryError::AgentProtocol { url, reason });
                }
            }
        }
        Ok(freed)
    }

    fn settle_failed(&mut self, mut job: TransferJob, reason: &str) {
        job.fail(reason);
        self.failed += 1;
        self.settled.insert(
            job.source().clone(),
            TerminalStatus::Failed {
                reason: reason.to_string(),
            },
        );
    }

    /// After a fatal error: cancel active transfers (best effort) and record
    /// everything unsettled as failed.
    async fn abandon(&mut self, cause: &RecoveryError) {
        let agent = Arc::clone(&self.sched.agent);
        for (handle, job) in std::mem::take(&mut self.active) {
            if let Err(e) = agent.cancel(&handle).await {
                tracing::warn!(gid = %handle, "cancel download failed: {}", e);
            }
            self.settle_failed(job, &format!("cancelled: {}", cause));
        }
        for job in std::mem::take(&mut self.pending) {
            self.settle_failed(job, &format!("not started: {}", cause));
        }
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            pending: self.pending.len(),
            active: self.active.len(),
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }

    fn publish(&self) {
        if let Some(tx) = &self.sched.progress_tx {
            let _ = tx.try_send(self.snapshot());
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}
