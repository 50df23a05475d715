//! Command-line interface of `hb-console`.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use hb_core::selection::{FileSelection, SelectionRejection, UploadFile};
use hb_core::view_state::ViewState;

#[derive(Parser, Debug)]
#[command(
    name = "hb-console",
    version,
    about = "Upload record files and follow their imports",
    after_help = "Configuration is read from HB_* environment variables or a .env file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Upload CSV/JSON files and follow the imports
    Upload {
        /// Files to upload (at most 5)
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },
    /// Follow imports and record changes announced by push
    Watch,
    /// List import history
    History,
    /// Delete import history (admin only)
    ClearHistory,
    /// Show or change the saved record table view
    View(ViewArgs),
}

#[derive(Args, Debug, Default, PartialEq, Eq)]
pub struct ViewArgs {
    /// Sort by COLUMN; sorting by the current column flips the direction
    #[arg(long, value_name = "COLUMN")]
    pub sort: Option<String>,

    /// Show only rows whose COLUMN matches VALUE
    #[arg(long, num_args = 2, value_names = ["COLUMN", "VALUE"], conflicts_with = "clear_filter")]
    pub filter: Option<Vec<String>>,

    /// Remove the current filter
    #[arg(long)]
    pub clear_filter: bool,

    /// Rows per page
    #[arg(long, value_name = "N")]
    pub page_size: Option<u32>,

    /// Go to the next page
    #[arg(long, conflicts_with = "prev")]
    pub next: bool,

    /// Go to the previous page
    #[arg(long)]
    pub prev: bool,
}

impl ViewArgs {
    /// No change was requested; the state is only shown.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the requested changes. Page size, sort and filter changes go
    /// back to the first page before any paging is applied.
    pub fn apply(&self, state: &mut ViewState) {
        if let Some(page_size) = self.page_size {
            state.set_page_size(page_size);
        }
        if let Some(column) = &self.sort {
            state.sort_by(column);
        }
        if let Some([column, value]) = self.filter.as_deref() {
            state.apply_filter(column, value);
        }
        if self.clear_filter {
            state.clear_filter();
        }
        if self.next {
            state.next_page();
        }
        if self.prev {
            state.prev_page();
        }
    }
}

/// Read `paths` into a selection, the way the upload dialog builds one.
///
/// Unreadable files are reported as errors; files the selection refuses
/// are returned as rejections.
pub async fn read_selection(
    paths: &[PathBuf],
) -> std::io::Result<(FileSelection, Vec<SelectionRejection>)> {
    let mut picked = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path).await?;
        picked.push(UploadFile::new(file_name(path), bytes));
    }

    let mut selection = FileSelection::new();
    let rejections = selection.add(picked);
    Ok((selection, rejections))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
