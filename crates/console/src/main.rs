//! `hb-console` -- terminal front end for record imports.
//!
//! Uploads CSV/JSON files to the record service and follows the
//! resulting import jobs through polling and the STOMP push channel
//! until they finish. Also lists and clears import history and keeps
//! the saved record table view.
//!
//! See [`hb_console::config::ConsoleConfig::from_env`] for the
//! environment variables it reads.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hb_console::cli::{self, Cli, Command, ViewArgs};
use hb_console::config::ConsoleConfig;
use hb_console::presenter::{history_line, TerminalPresenter};
use hb_console::view::{describe, LoggingRecordView};
use hb_core::types::ImportId;
use hb_core::view_state::ViewStateStore;
use hb_importer::api::ImportApi;
use hb_importer::backoff::BackoffConfig;
use hb_importer::channel::PushChannel;
use hb_importer::client::PushClient;
use hb_importer::events::TrackerEvent;
use hb_importer::tracker::ImportTracker;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Buffered push notifications between the channel and the tracker.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hb_console=info,hb_importer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- Command line ---
    let command = Cli::parse().command;

    // --- Configuration ---
    let config = ConsoleConfig::from_env()?;
    tracing::info!(
        api_url = %config.api_url,
        push_url = %config.push_url,
        user = %config.session.user_name,
        is_admin = config.session.is_admin,
        "Loaded console configuration",
    );

    if let Command::View(args) = &command {
        return update_view(&config, args);
    }

    // --- Tracker ---
    let api = ImportApi::new(config.api_url.as_str(), config.request_timeout)
        .context("Failed to build HTTP client")?;
    let view = LoggingRecordView::new(
        config.table_active,
        ViewStateStore::new(&config.view_state_path).load(),
    );
    let tracker = ImportTracker::new(
        Arc::new(api),
        Arc::new(TerminalPresenter::stdout()),
        Arc::new(view),
        config.tracker_config(),
    );

    match command {
        Command::Upload { files } => run_live(&tracker, &config, Some(files)).await,
        Command::Watch => run_live(&tracker, &config, None).await,
        Command::History => {
            let entries = tracker.history(&config.session).await?;
            if entries.is_empty() {
                println!("No imports yet");
            }
            for entry in &entries {
                println!("{}", history_line(entry));
            }
            Ok(())
        }
        Command::ClearHistory => {
            tracker.clear_history(&config.session).await?;
            println!("Import history cleared");
            Ok(())
        }
        Command::View(_) => Ok(()),
    }
}

/// Show the saved record table view, applying and saving `args` first.
fn update_view(config: &ConsoleConfig, args: &ViewArgs) -> anyhow::Result<()> {
    let store = ViewStateStore::new(&config.view_state_path);
    let mut state = store.load();
    if !args.is_empty() {
        args.apply(&mut state);
        store
            .save(&state)
            .with_context(|| format!("Failed to save view state to {}", store.path().display()))?;
    }
    println!("{}", describe(&state));
    Ok(())
}

/// Run the push channel next to the tracker, either following an upload
/// until its jobs are gone or watching until Ctrl-C.
async fn run_live(
    tracker: &ImportTracker,
    config: &ConsoleConfig,
    upload: Option<Vec<PathBuf>>,
) -> anyhow::Result<()> {
    let root = CancellationToken::new();
    let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

    let channel = PushChannel::spawn(
        PushClient::new(config.push_url.as_str()),
        updates_tx,
        BackoffConfig::default(),
        root.child_token(),
    );
    let consumer = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.run_updates(updates_rx).await })
    };
    tracing::info!("Push channel and update consumer started");

    let result = match upload {
        Some(paths) => upload_and_follow(tracker, config, &paths).await,
        None => {
            tracing::info!("Watching for updates, press Ctrl-C to stop");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            Ok(())
        }
    };

    // --- Graceful shutdown ---
    root.cancel();
    channel.shutdown().await;
    tracker.shutdown().await;
    if let Err(e) = consumer.await {
        tracing::error!(error = %e, "Update consumer panicked");
    }

    result
}

/// Upload the files at `paths` and wait until every started job has been
/// retired or dropped.
async fn upload_and_follow(
    tracker: &ImportTracker,
    config: &ConsoleConfig,
    paths: &[PathBuf],
) -> anyhow::Result<()> {
    let (mut selection, rejections) = cli::read_selection(paths)
        .await
        .context("Failed to read files")?;
    for rejection in &rejections {
        tracing::warn!(%rejection, "File left out of the upload");
    }

    // Subscribe before uploading so no retirement is missed.
    let mut events = tracker.subscribe();
    let outcome = tracker.begin_import(&config.session, selection.take()).await?;
    for rejected in &outcome.rejected {
        println!("{}: rejected: {}", rejected.file_name, rejected.error);
    }

    let mut pending: HashSet<ImportId> = outcome
        .started
        .into_iter()
        .map(|started| started.import_id)
        .collect();

    while !pending.is_empty() {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(pending = pending.len(), "Interrupted, leaving imports running on the server");
                break;
            }
            event = events.recv() => match event {
                Ok(TrackerEvent::JobRetired { import_id } | TrackerEvent::JobUnregistered { import_id }) => {
                    pending.remove(&import_id);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Tracker events lagged, re-checking jobs");
                    let mut still_tracked = HashSet::new();
                    for import_id in pending {
                        if tracker.is_tracked(&import_id).await {
                            still_tracked.insert(import_id);
                        }
                    }
                    pending = still_tracked;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}
