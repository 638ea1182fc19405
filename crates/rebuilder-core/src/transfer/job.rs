//! Per-job lifecycle: NotStarted → Active → {Succeeded | Failed}.

use crate::agent::JobHandle;

use super::source::TransferSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Active,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    fn can_become(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::NotStarted, JobState::Active)
                | (JobState::NotStarted, JobState::Failed)
                | (JobState::Active, JobState::Succeeded)
                | (JobState::Active, JobState::Failed)
        )
    }
}

/// Final result recorded for a submitted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Succeeded { bytes: u64 },
    Failed { reason: String },
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Succeeded { .. })
    }
}

/// A transfer tracked by the scheduler loop. Only that loop mutates it.
#[derive(Debug)]
pub struct TransferJob {
    source: TransferSource,
    handle: Option<JobHandle>,
    state: JobState,
    last_error: Option<String>,
}

impl TransferJob {
    pub fn new(source: TransferSource) -> Self {
        Self {
            source,
            handle: None,
            state: JobState::NotStarted,
            last_error: None,
        }
    }

    pub fn source(&self) -> &TransferSource {
        &self.source
    }

    pub fn handle(&self) -> Option<&JobHandle> {
        self.handle.as_ref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn transition(&mut self, next: JobState) -> bool {
        if !self.state.can_become(next) {
            tracing::warn!(url = %self.source.url, from = ?self.state, to = ?next, "ignored job transition");
            return false;
        }
        self.state = next;
        true
    }

    /// The agent accepted the transfer. Happens at most once per job.
    pub fn activate(&mut self, handle: JobHandle) -> bool {
        if !self.transition(JobState::Active) {
            return false;
        }
        self.handle = Some(handle);
        true
    }

    pub fn succeed(&mut self) -> bool {
        self.transition(JobState::Succeeded)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if !self.transition(JobState::Failed) {
            return false;
        }
        self.last_error = Some(reason.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn job() -> TransferJob {
        TransferJob::new(TransferSource::for_shard("https://example.com/a.car", Path::new("/in")))
    }

    #[test]
    fn happy_path() {
        let mut j = job();
        assert_eq!(j.state(), JobState::NotStarted);
        assert!(j.activate(JobHandle::new("gid1")));
        assert_eq!(j.handle().map(|h| h.as_str()), Some("gid1"));
        assert!(j.succeed());
        assert!(j.state().is_terminal());
    }

    #[test]
    fn start_rejection_goes_straight_to_failed() {
        let mut j = job();
        assert!(j.fail("agent said no"));
        assert_eq!(j.state(), JobState::Failed);
        assert_eq!(j.last_error(), Some("agent said no"));
        assert!(j.handle().is_none());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut j = job();
        j.activate(JobHandle::new("gid1"));
        j.succeed();
        assert!(!j.succeed());
        assert!(!j.fail("late"));
        assert!(!j.activate(JobHandle::new("gid2")));
        assert_eq!(j.state(), JobState::Succeeded);
        assert_eq!(j.handle().map(|h| h.as_str()), Some("gid1"));
    }

    #[test]
    fn cannot_succeed_without_starting() {
        let mut j = job();
        assert!(!j.succeed());
        assert_eq!(j.state(), JobState::NotStarted);
    }
}
