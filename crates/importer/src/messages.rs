//! Push notification payloads.
//!
//! Every `MESSAGE` body on the push channel is JSON shaped
//! `{"action": "<kind>", "data": {...}}`. This module deserializes it
//! into a strongly-typed [`UpdateEvent`].

use hb_core::import::ImportProgress;
use serde::{Deserialize, Serialize};

/// Topic carrying record create/update/delete notifications.
pub const TOPIC_UPDATES: &str = "/topic/updates";

/// Topic carrying import progress notifications.
pub const TOPIC_IMPORT_PROGRESS: &str = "/topic/import-progress";

/// All known push notification kinds.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum UpdateEvent {
    /// A record was created.
    Created(serde_json::Value),

    /// A record was modified.
    Updated(serde_json::Value),

    /// A record was removed. `data` is usually the record id.
    Deleted(serde_json::Value),

    /// Status of an import job changed.
    ImportProgress(ImportProgress),
}

/// Record change kinds, without their payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Created,
    Updated,
    Deleted,
}

impl UpdateEvent {
    /// The record change this event announces, if it is one.
    pub fn record_action(&self) -> Option<RecordAction> {
        match self {
            Self::Created(_) => Some(RecordAction::Created),
            Self::Updated(_) => Some(RecordAction::Updated),
            Self::Deleted(_) => Some(RecordAction::Deleted),
            Self::ImportProgress(_) => None,
        }
    }
}

/// Parse a push notification body into a typed event.
///
/// Returns `Err` for malformed JSON or unknown `action` values.
/// Callers should log and continue.
pub fn parse_update(text: &str) -> Result<UpdateEvent, serde_json::Error> {
    serde_json::from_str(text)
}
