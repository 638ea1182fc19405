//! Bounded-concurrency transfer scheduling.
//!
//! Sources flow pending → active → settled. One coordinating loop owns every
//! job: it dispatches while capacity allows, polls the agent on a fixed tick,
//! verifies completed files, and aborts the whole submission on the first
//! failure.

mod job;
mod progress;
mod scheduler;
mod source;
mod verify;

pub use job::{JobState, TerminalStatus, TransferJob};
pub use progress::{SchedulerSnapshot, TransferProgress};
pub use scheduler::{JobScheduler, SchedulerOptions, SubmitOutcome};
pub use source::TransferSource;
