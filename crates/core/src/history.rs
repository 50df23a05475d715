//! Rows of the import history listing (`GET /api/import/history`).

use serde::{Deserialize, Serialize};

use crate::import::ImportStatus;
use crate::serde_util::{count, null_as_default, percent, timestamp};
use crate::types::{ImportId, Timestamp};

/// One finished or running import as recorded by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryEntry {
    pub id: ImportId,
    pub file_name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: ImportStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_admin: bool,
    #[serde(default, deserialize_with = "timestamp")]
    pub start_time: Option<Timestamp>,
    #[serde(default, deserialize_with = "timestamp")]
    pub end_time: Option<Timestamp>,
    #[serde(default, deserialize_with = "count")]
    pub total_records: u64,
    #[serde(default, deserialize_with = "count")]
    pub successful_records: u64,
    #[serde(default, deserialize_with = "count")]
    pub failed_records: u64,
    #[serde(default, deserialize_with = "percent")]
    pub current_progress: u8,
    #[serde(default)]
    pub error_message: Option<String>,
}
