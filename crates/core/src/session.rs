//! Identity context for import operations.
//!
//! The server trusts whatever the client sends; a [`Session`] only makes
//! that explicit instead of asking for it mid-operation.

/// User name sent when none is configured.
pub const DEFAULT_USER_NAME: &str = "user";

/// Name the history endpoint treats as "show everyone's imports".
pub const ADMIN_HISTORY_USER: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_name: String,
    pub is_admin: bool,
}

impl Session {
    /// A session for `user_name`; a blank name falls back to [`DEFAULT_USER_NAME`].
    pub fn new(user_name: impl Into<String>, is_admin: bool) -> Self {
        let user_name = user_name.into();
        let user_name = if user_name.trim().is_empty() {
            DEFAULT_USER_NAME.to_string()
        } else {
            user_name.trim().to_string()
        };
        Self {
            user_name,
            is_admin,
        }
    }

    /// The `userName` to query history with.
    pub fn history_user(&self) -> &str {
        if self.is_admin {
            ADMIN_HISTORY_USER
        } else {
            &self.user_name
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_USER_NAME, false)
    }
}
