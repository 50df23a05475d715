//! Import job status payloads.
//!
//! [`ImportProgress`] is the single shape shared by the poll endpoint
//! (`GET /api/import/progress/{id}`) and the `import_progress` push
//! notification, so both channels feed the same update path.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::serde_util::{count, null_as_default, percent};
use crate::types::ImportId;

/// File name shown for jobs first seen through a payload without one.
pub const UNKNOWN_FILE_NAME: &str = "Unknown";

/// Lifecycle state of an import job.
///
/// `Completed` and `Failed` are terminal: once a job reports either,
/// no further transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Pending,
    #[default]
    InProgress,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name, e.g. `"IN_PROGRESS"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status payload of one import job.
///
/// Missing or `null` counters read as zero; `current_progress` is clamped
/// into `0..=100`; a missing status reads as `IN_PROGRESS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub import_id: ImportId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ImportStatus,
    #[serde(default, deserialize_with = "count")]
    pub total_records: u64,
    #[serde(default, deserialize_with = "count")]
    pub processed_records: u64,
    #[serde(default, deserialize_with = "count")]
    pub successful_records: u64,
    #[serde(default, deserialize_with = "count")]
    pub failed_records: u64,
    #[serde(default, deserialize_with = "percent")]
    pub current_progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ImportProgress {
    /// A fresh `IN_PROGRESS` payload with all counters at zero.
    pub fn new(import_id: impl Into<ImportId>) -> Self {
        Self {
            import_id: import_id.into(),
            file_name: None,
            status: ImportStatus::InProgress,
            total_records: 0,
            processed_records: 0,
            successful_records: 0,
            failed_records: 0,
            current_progress: 0,
            error_message: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_status(mut self, status: ImportStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the percentage, clamped to 100.
    pub fn with_progress(mut self, percent: u8) -> Self {
        self.current_progress = percent.min(100);
        self
    }

    pub fn with_records(mut self, processed: u64, total: u64) -> Self {
        self.processed_records = processed;
        self.total_records = total;
        self
    }

    pub fn with_outcomes(mut self, successful: u64, failed: u64) -> Self {
        self.successful_records = successful;
        self.failed_records = failed;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// File name to display, falling back to [`UNKNOWN_FILE_NAME`].
    pub fn display_file_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or(UNKNOWN_FILE_NAME)
    }

    /// The error banner text, if the payload carries a non-blank message.
    pub fn error_banner(&self) -> Option<&str> {
        self.error_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}
