//! Collaborators that display tracker state.
//!
//! The tracker never renders anything itself. It calls a
//! [`ProgressPresenter`] for per-job progress elements and a
//! [`RecordView`] when record data changed.
//!
//! Both traits are called while the job registry is locked so that what
//! is displayed always follows registry order. Implementations must
//! return quickly and must not call back into the tracker synchronously.

use hb_core::import::ImportProgress;
use hb_core::types::ImportId;

/// Renders per-job progress UI.
pub trait ProgressPresenter: Send + Sync {
    /// Create the progress element for a newly tracked job.
    fn create(&self, import_id: &ImportId, file_name: &str);

    /// Show the latest status payload of a job.
    fn render(&self, progress: &ImportProgress);

    /// Show an error banner under the job's element.
    fn show_error(&self, import_id: &ImportId, message: &str);

    /// Remove the job's element.
    fn remove(&self, import_id: &ImportId);
}

/// The record table collaborator.
pub trait RecordView: Send + Sync {
    /// Whether the record table is the active view.
    fn is_table_active(&self) -> bool;

    /// Schedule a full reload of the table. Must not block.
    fn request_reload(&self);
}

/// A [`RecordView`] for front ends without a record table.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRecordView;

impl RecordView for NoRecordView {
    fn is_table_active(&self) -> bool {
        false
    }

    fn request_reload(&self) {}
}
