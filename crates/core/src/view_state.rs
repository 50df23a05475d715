//! Persisted state of the record table view.
//!
//! Page, page size, sort and filter survive restarts by being written to a
//! small JSON document after every change. A missing or unreadable
//! document restores the defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewState {
    pub current_page: u32,
    pub page_size: u32,
    pub current_sort: String,
    pub current_sort_dir: SortDirection,
    pub current_filter_by: String,
    pub current_filter_value: String,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current_page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            current_sort: String::new(),
            current_sort_dir: SortDirection::Asc,
            current_filter_by: String::new(),
            current_filter_value: String::new(),
        }
    }
}

impl ViewState {
    /// Sort by `column`; sorting by the current column again flips the
    /// direction. Always returns to the first page.
    pub fn sort_by(&mut self, column: &str) {
        if self.current_sort == column {
            self.current_sort_dir = self.current_sort_dir.flipped();
        } else {
            self.current_sort = column.to_string();
            self.current_sort_dir = SortDirection::Asc;
        }
        self.current_page = 0;
    }

    /// Filter `column` by `value`. A blank column or value clears the filter.
    pub fn apply_filter(&mut self, column: &str, value: &str) {
        let value = value.trim();
        if column.is_empty() || value.is_empty() {
            self.clear_filter();
            return;
        }
        self.current_filter_by = column.to_string();
        self.current_filter_value = value.to_string();
        self.current_page = 0;
    }

    pub fn clear_filter(&mut self) {
        self.current_filter_by.clear();
        self.current_filter_value.clear();
        self.current_page = 0;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.saturating_add(1);
    }

    pub fn prev_page(&mut self) {
        self.current_page = self.current_page.saturating_sub(1);
    }

    /// Change the page size; zero falls back to [`DEFAULT_PAGE_SIZE`].
    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        self.current_page = 0;
    }
}

/// File-backed store for [`ViewState`].
#[derive(Debug, Clone)]
pub struct ViewStateStore {
    path: PathBuf,
}

impl ViewStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore the saved state, or the defaults if there is none.
    pub fn load(&self) -> ViewState {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Corrupt view state, restoring defaults",
                );
                ViewState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ViewState::default(),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable view state, restoring defaults",
                );
                ViewState::default()
            }
        }
    }

    pub fn save(&self, state: &ViewState) -> Result<(), CoreError> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| CoreError::Internal(format!("serialize view state: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            CoreError::Internal(format!("write {}: {e}", self.path.display()))
        })
    }
}
