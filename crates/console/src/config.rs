use std::path::PathBuf;
use std::time::Duration;

use hb_core::session::Session;
use hb_importer::poller::PollConfig;
use hb_importer::tracker::TrackerConfig;

/// Console configuration loaded from environment variables.
///
/// All fields have defaults suitable for a record service running
/// locally. Override via environment variables or a `.env` file.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Base URL of the record service REST API.
    pub api_url: String,
    /// WebSocket URL of the STOMP push endpoint.
    pub push_url: String,
    /// Identity sent with uploads and history requests.
    pub session: Session,
    pub poll_interval: Duration,
    pub retire_grace: Duration,
    pub request_timeout: Duration,
    /// Where the record table's paging/sort/filter state is persisted.
    pub view_state_path: PathBuf,
    /// Whether the record table counts as the active view.
    pub table_active: bool,
}

/// An environment variable held a value that does not parse.
#[derive(Debug, thiserror::Error)]
#[error("{name} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub expected: &'static str,
    pub value: String,
}

impl ConsoleConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                             |
    /// |---------------------------|-------------------------------------|
    /// | `HB_API_URL`              | `http://localhost:8080`             |
    /// | `HB_PUSH_URL`             | `ws://localhost:8080/ws/websocket`  |
    /// | `HB_USER_NAME`            | `user`                              |
    /// | `HB_IS_ADMIN`             | `false`                             |
    /// | `HB_POLL_INTERVAL_MS`     | `500`                               |
    /// | `HB_RETIRE_GRACE_SECS`    | `10`                                |
    /// | `HB_REQUEST_TIMEOUT_SECS` | `10`                                |
    /// | `HB_VIEW_STATE_PATH`      | `.hb-view-state.json`               |
    /// | `HB_TABLE_ACTIVE`         | `false`                             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |name: &str, default: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let api_url = string("HB_API_URL", "http://localhost:8080");
        let push_url = string("HB_PUSH_URL", "ws://localhost:8080/ws/websocket");
        let user_name = string("HB_USER_NAME", hb_core::session::DEFAULT_USER_NAME);
        let is_admin = parse_bool("HB_IS_ADMIN", lookup("HB_IS_ADMIN"), false)?;

        let poll_interval_ms =
            parse_positive_u64("HB_POLL_INTERVAL_MS", lookup("HB_POLL_INTERVAL_MS"), 500)?;
        let retire_grace_secs = parse_u64("HB_RETIRE_GRACE_SECS", lookup("HB_RETIRE_GRACE_SECS"), 10)?;
        let request_timeout_secs =
            parse_positive_u64("HB_REQUEST_TIMEOUT_SECS", lookup("HB_REQUEST_TIMEOUT_SECS"), 10)?;

        let view_state_path = PathBuf::from(string("HB_VIEW_STATE_PATH", ".hb-view-state.json"));
        let table_active = parse_bool("HB_TABLE_ACTIVE", lookup("HB_TABLE_ACTIVE"), false)?;

        Ok(Self {
            api_url,
            push_url,
            session: Session::new(user_name, is_admin),
            poll_interval: Duration::from_millis(poll_interval_ms),
            retire_grace: Duration::from_secs(retire_grace_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            view_state_path,
            table_active,
        })
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll: PollConfig {
                interval: self.poll_interval,
                request_timeout: self.request_timeout,
                ..Default::default()
            },
            retire_grace: self.retire_grace,
        }
    }
}

fn parse_u64(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError {
            name,
            expected: "a non-negative integer",
            value: v.to_string(),
        }),
    }
}

/// Like [`parse_u64`], but zero is refused.
fn parse_positive_u64(
    name: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse_u64(name, value, default)? {
        0 => Err(ConfigError {
            name,
            expected: "greater than zero",
            value: "0".to_string(),
        }),
        n => Ok(n),
    }
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError {
            name,
            expected: "true or false",
            value: other.to_string(),
        }),
    }
}
