//! Progress views: per-transfer progress and whole-submission snapshots.

use crate::agent::AgentStatus;

/// Progress of one active transfer, derived from an agent status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub completed_bytes: u64,
    pub total_bytes: u64,
    pub bytes_per_sec: u64,
}

impl From<&AgentStatus> for TransferProgress {
    fn from(st: &AgentStatus) -> Self {
        Self {
            completed_bytes: st.completed_bytes,
            total_bytes: st.total_bytes,
            bytes_per_sec: st.download_speed,
        }
    }
}

impl TransferProgress {
    /// Percent complete in [0, 100]; 0 while the size is unknown.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.completed_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    /// Seconds remaining at the current rate (None if the rate is 0).
    pub fn eta_secs(&self) -> Option<u64> {
        let remaining = self.total_bytes.saturating_sub(self.completed_bytes);
        if remaining == 0 {
            return Some(0);
        }
        if self.bytes_per_sec == 0 {
            return None;
        }
        Some(remaining.div_ceil(self.bytes_per_sec))
    }
}

/// Counts published after every dispatch/poll round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub pending: usize,
    pub active: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SchedulerSnapshot {
    pub fn total(&self) -> usize {
        self.pending + self.active + self.succeeded + self.failed
    }
}
