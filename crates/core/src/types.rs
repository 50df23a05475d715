use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Server-assigned identifier of an import job.
///
/// The server sends it as a JSON integer today, but clients must treat it
/// as opaque, so both integers and strings are accepted and normalized to
/// their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ImportId(String);

impl ImportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImportId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ImportId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for ImportId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ImportId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(Self::from(n)),
            Raw::Text(s) if s.is_empty() => Err(serde::de::Error::custom("empty import id")),
            Raw::Text(s) => Ok(Self(s)),
        }
    }
}
