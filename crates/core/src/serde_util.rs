//! Lenient field deserializers for server payloads.
//!
//! The server serializes boxed integers, so any count may arrive as
//! `null`; these helpers fold that into the field default.

use serde::{Deserialize, Deserializer};

use crate::types::Timestamp;

/// Read `null` (or an absent field, with `#[serde(default)]`) as `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Record counts: `null` is 0 and negative values clamp to 0.
pub(crate) fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
    Ok(raw.max(0) as u64)
}

/// Percentages: `null` is 0, everything else clamps into `0..=100`.
pub(crate) fn percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
    Ok(raw.clamp(0, 100) as u8)
}

/// Timestamps as either RFC 3339 text or epoch milliseconds.
pub(crate) fn timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Timestamp>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Millis(ms)) => chrono::DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
        Some(Raw::Text(text)) => chrono::DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&chrono::Utc)))
            .map_err(serde::de::Error::custom),
    }
}
