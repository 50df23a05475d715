//! The console's stand-in for the record table.
//!
//! There is no table to redraw in a terminal, so a reload request logs
//! which page the table would fetch. The view state is read once when
//! the view is built.

use std::sync::atomic::{AtomicU64, Ordering};

use hb_core::view_state::{SortDirection, ViewState};
use hb_importer::presenter::RecordView;

pub struct LoggingRecordView {
    active: bool,
    state: ViewState,
    reloads: AtomicU64,
}

impl LoggingRecordView {
    pub fn new(active: bool, state: ViewState) -> Self {
        Self {
            active,
            state,
            reloads: AtomicU64::new(0),
        }
    }

    /// Reload requests received so far.
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}

impl RecordView for LoggingRecordView {
    fn is_table_active(&self) -> bool {
        self.active
    }

    fn request_reload(&self) {
        let count = self.reloads.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(view = %describe(&self.state), reloads = count, "Record table reload requested");
    }
}

/// One-line summary of a table view, e.g.
/// `page 2, 25 per page, sorted by name desc, name = "Ann"`.
pub fn describe(state: &ViewState) -> String {
    let mut text = format!("page {}, {} per page", state.current_page + 1, state.page_size);
    if !state.current_sort.is_empty() {
        let dir = match state.current_sort_dir {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        text.push_str(&format!(", sorted by {} {dir}", state.current_sort));
    }
    if !state.current_filter_by.is_empty() {
        text.push_str(&format!(
            ", {} = {:?}",
            state.current_filter_by, state.current_filter_value
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reloads_are_counted() {
        let view = LoggingRecordView::new(true, ViewState::default());

        assert!(view.is_table_active());
        view.request_reload();
        view.request_reload();
        assert_eq!(view.reloads(), 2);
    }

    #[test]
    fn inactive_view_reports_inactive() {
        let view = LoggingRecordView::new(false, ViewState::default());
        assert!(!view.is_table_active());
    }

    #[test]
    fn describe_default_and_customised_views() {
        assert_eq!(describe(&ViewState::default()), "page 1, 10 per page");

        let mut state = ViewState::default();
        state.set_page_size(25);
        state.sort_by("name");
        state.sort_by("name");
        state.apply_filter("name", "Ann");
        state.next_page();
        assert_eq!(
            describe(&state),
            "page 2, 25 per page, sorted by name desc, name = \"Ann\""
        );
    }
}
