//! Terminal rendering of import progress.
//!
//! Each tracked job is one line: a progress bar, the percentage, the file
//! name and the record counters. Lines are written as they change; there
//! is no cursor movement, so the output also reads well when piped.

use std::io::Write;
use std::sync::Mutex;

use hb_core::history::ImportHistoryEntry;
use hb_core::import::{ImportProgress, ImportStatus};
use hb_core::types::{ImportId, Timestamp};
use hb_importer::presenter::ProgressPresenter;

const BAR_WIDTH: usize = 20;

/// Renders tracker output as text lines on `W`.
pub struct TerminalPresenter<W> {
    out: Mutex<W>,
}

impl TerminalPresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Consume the presenter, returning the writer.
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn line(&self, text: &str) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{text}").and_then(|_| out.flush()) {
            tracing::debug!(error = %e, "Failed to write progress line");
        }
    }
}

impl<W: Write + Send> ProgressPresenter for TerminalPresenter<W> {
    fn create(&self, import_id: &ImportId, file_name: &str) {
        self.line(&format!("[{import_id}] {file_name}: waiting for server"));
    }

    fn render(&self, progress: &ImportProgress) {
        self.line(&render_line(progress));
    }

    fn show_error(&self, import_id: &ImportId, message: &str) {
        self.line(&format!("[{import_id}] error: {message}"));
    }

    fn remove(&self, import_id: &ImportId) {
        self.line(&format!("[{import_id}] done"));
    }
}

/// One progress line, e.g.
/// `[7] [##########----------]  50% people.csv IN_PROGRESS 50/100 records`.
pub fn render_line(progress: &ImportProgress) -> String {
    let filled = usize::from(progress.current_progress) * BAR_WIDTH / 100;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled));

    let mut line = format!(
        "[{}] [{bar}] {:>3}% {} {}",
        progress.import_id,
        progress.current_progress,
        progress.display_file_name(),
        progress.status,
    );

    if progress.total_records > 0 {
        line.push_str(&format!(
            " {}/{} records",
            progress.processed_records, progress.total_records
        ));
    }
    if matches!(progress.status, ImportStatus::Completed | ImportStatus::Failed) {
        line.push_str(&format!(
            " ({} ok, {} failed)",
            progress.successful_records, progress.failed_records
        ));
    }
    line
}

/// One row of the history listing.
pub fn history_line(entry: &ImportHistoryEntry) -> String {
    let mut line = format!(
        "{:<6} {:<24} {:<11} {:>3}% {:>6} ok {:>6} failed  {} -> {}  by {}",
        entry.id.as_str(),
        entry.file_name,
        entry.status.as_str(),
        entry.current_progress,
        entry.successful_records,
        entry.failed_records,
        format_time(entry.start_time),
        format_time(entry.end_time),
        entry.user_name,
    );
    if let Some(message) = entry.error_message.as_deref().filter(|m| !m.trim().is_empty()) {
        line.push_str(&format!("  error: {message}"));
    }
    line
}

fn format_time(time: Option<Timestamp>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
