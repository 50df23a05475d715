//! Events emitted by the import tracker.
//!
//! These describe high-level state changes of tracked jobs so observers
//! (the console, tests, metrics) can follow along without touching the
//! registry. They are broadcast via [`ImportTracker::subscribe`].
//!
//! [`ImportTracker::subscribe`]: crate::tracker::ImportTracker::subscribe

use hb_core::import::{ImportProgress, ImportStatus};
use hb_core::types::ImportId;
use serde::Serialize;

use crate::messages::RecordAction;

/// Where a status payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    Poll,
    Push,
}

/// Why a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The job reached COMPLETED or FAILED.
    Terminal,
    /// The server answered 404 for the job.
    NotFound,
    /// Too many consecutive failures, or the maximum duration elapsed.
    Abandoned,
    /// Stopped on request (explicit stop or unregister).
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub enum TrackerEvent {
    /// A job started being tracked.
    JobRegistered { import_id: ImportId, file_name: String },

    /// A new status payload changed the visible state of a job.
    ProgressApplied {
        progress: ImportProgress,
        source: UpdateSource,
    },

    /// A job reached a terminal status.
    JobTerminal {
        import_id: ImportId,
        status: ImportStatus,
    },

    /// A job's poll loop was cancelled.
    PollingStopped {
        import_id: ImportId,
        reason: StopReason,
    },

    /// A terminal job was removed after its grace period.
    JobRetired { import_id: ImportId },

    /// A job was removed before reaching a terminal status.
    JobUnregistered { import_id: ImportId },

    /// A record was created, updated or deleted on the server.
    RecordsChanged { action: RecordAction },
}
