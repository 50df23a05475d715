//! Import job tracker.
//!
//! [`ImportTracker`] owns the job registry and everything that mutates
//! it: upload initiation, one poll loop per in-flight job, push update
//! reconciliation and grace-period retirement of finished jobs.
//!
//! State changes are broadcast as [`TrackerEvent`]s via a
//! [`tokio::sync::broadcast`] channel. Call [`ImportTracker::subscribe`]
//! to receive them.

use std::sync::Arc;
use std::time::Duration;

use hb_core::error::CoreError;
use hb_core::history::ImportHistoryEntry;
use hb_core::import::{ImportProgress, UNKNOWN_FILE_NAME};
use hb_core::selection::{validate_batch, UploadFile};
use hb_core::session::Session;
use hb_core::types::ImportId;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ImportApiError, ImportBackend};
use crate::events::{StopReason, TrackerEvent, UpdateSource};
use crate::messages::UpdateEvent;
use crate::poller::{run_poll_loop, PollConfig};
use crate::presenter::{ProgressPresenter, RecordView};
use crate::reconciler::ApplyOutcome;
use crate::registry::{JobRegistry, JobSnapshot, Registration};

/// Broadcast channel capacity for tracker events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long a finished job stays visible before it is removed.
pub const DEFAULT_RETIRE_GRACE: Duration = Duration::from_secs(10);

/// How long [`ImportTracker::shutdown`] waits for each poll loop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll: PollConfig,
    /// Delay between a job reaching a terminal status and its removal.
    pub retire_grace: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            retire_grace: DEFAULT_RETIRE_GRACE,
        }
    }
}

/// Errors returned by tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Api(#[from] ImportApiError),
}

/// An import the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedImport {
    pub import_id: ImportId,
    pub file_name: String,
}

/// A file the server refused within a multi-file upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedUpload {
    pub file_name: String,
    pub error: String,
}

/// Result of [`ImportTracker::begin_import`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub started: Vec<StartedImport>,
    pub rejected: Vec<RejectedUpload>,
}

/// A running poll loop.
#[derive(Debug)]
pub(crate) struct PollHandle {
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

/// State shared between the tracker handle, poll loops and retirement
/// timers.
pub(crate) struct Shared {
    pub(crate) registry: RwLock<JobRegistry<PollHandle>>,
    pub(crate) backend: Arc<dyn ImportBackend>,
    pub(crate) presenter: Arc<dyn ProgressPresenter>,
    pub(crate) view: Arc<dyn RecordView>,
    pub(crate) config: TrackerConfig,
    event_tx: broadcast::Sender<TrackerEvent>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

/// Tracks in-flight import jobs.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct ImportTracker {
    shared: Arc<Shared>,
}

impl ImportTracker {
    pub fn new(
        backend: Arc<dyn ImportBackend>,
        presenter: Arc<dyn ProgressPresenter>,
        view: Arc<dyn RecordView>,
        config: TrackerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(JobRegistry::new()),
                backend,
                presenter,
                view,
                config,
                event_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to tracker events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Start tracking a job and create its progress element.
    ///
    /// Returns `false` if the job is already tracked (no-op) or was
    /// retired earlier.
    pub async fn register(&self, import_id: &ImportId, file_name: &str) -> bool {
        self.shared.register(import_id, file_name).await
    }

    /// Stop polling a job and remove its tracking and UI state.
    pub async fn unregister(&self, import_id: &ImportId) -> bool {
        self.shared.unregister(import_id, StopReason::Stopped).await
    }

    /// Start the poll loop of a registered, non-terminal job.
    ///
    /// Returns `false` if the job is unknown, terminal, or already polled.
    pub async fn start_polling(&self, import_id: &ImportId) -> bool {
        self.shared.start_polling(import_id).await
    }

    /// Cancel the poll loop of a job, keeping it tracked.
    ///
    /// A response already in flight is discarded when it arrives.
    pub async fn stop_polling(&self, import_id: &ImportId) -> bool {
        self.shared
            .stop_polling(import_id, StopReason::Stopped)
            .await
    }

    pub async fn has_active_poll(&self, import_id: &ImportId) -> bool {
        self.shared.registry.read().await.is_polling(import_id)
    }

    pub async fn is_tracked(&self, import_id: &ImportId) -> bool {
        self.shared.registry.read().await.contains(import_id)
    }

    pub async fn job(&self, import_id: &ImportId) -> Option<JobSnapshot> {
        self.shared.registry.read().await.snapshot(import_id)
    }

    pub async fn tracked_ids(&self) -> Vec<ImportId> {
        self.shared.registry.read().await.ids()
    }

    /// Apply a status payload from either channel.
    pub async fn apply_progress(
        &self,
        progress: ImportProgress,
        source: UpdateSource,
    ) -> ApplyOutcome {
        self.shared.apply_progress(progress, source).await
    }

    /// Reconcile one push notification.
    pub async fn handle_update(&self, event: UpdateEvent) {
        self.shared.handle_update(event).await
    }

    /// Reconcile push notifications until the channel closes or the
    /// tracker shuts down.
    pub async fn run_updates(&self, mut updates: mpsc::Receiver<UpdateEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                event = updates.recv() => event,
            };
            match event {
                Some(event) => self.shared.handle_update(event).await,
                None => break,
            }
        }
        tracing::debug!("Update consumer exited");
    }

    /// Upload `files` and start tracking the resulting jobs.
    ///
    /// The batch is validated locally first; a validation error sends no
    /// request. One file goes to the single-upload endpoint, several go
    /// to the multi-upload endpoint in one request.
    pub async fn begin_import(
        &self,
        session: &Session,
        files: Vec<UploadFile>,
    ) -> Result<UploadOutcome, TrackerError> {
        validate_batch(&files)?;

        let uploaded = match files.as_slice() {
            [file] => {
                let mut entry = self.shared.backend.upload(session, file).await?;
                entry.file_name.get_or_insert_with(|| file.name.clone());
                vec![entry]
            }
            _ => self.shared.backend.upload_multiple(session, &files).await?,
        };

        let mut outcome = UploadOutcome::default();
        for entry in uploaded {
            let file_name = entry
                .file_name
                .unwrap_or_else(|| UNKNOWN_FILE_NAME.to_string());
            match entry.import_id {
                Some(import_id) => {
                    self.shared.register(&import_id, &file_name).await;
                    self.shared.start_polling(&import_id).await;
                    outcome.started.push(StartedImport {
                        import_id,
                        file_name,
                    });
                }
                None => {
                    let error = entry.error.unwrap_or_else(|| "Upload rejected".to_string());
                    tracing::warn!(file_name = %file_name, error = %error, "Server rejected file");
                    outcome.rejected.push(RejectedUpload { file_name, error });
                }
            }
        }

        tracing::info!(
            user = %session.user_name,
            started = outcome.started.len(),
            rejected = outcome.rejected.len(),
            "Upload finished",
        );
        Ok(outcome)
    }

    /// Import history visible to the session.
    pub async fn history(&self, session: &Session) -> Result<Vec<ImportHistoryEntry>, TrackerError> {
        Ok(self.shared.backend.history(session.history_user()).await?)
    }

    /// Delete all import history. Admin sessions only.
    pub async fn clear_history(&self, session: &Session) -> Result<(), TrackerError> {
        if !session.is_admin {
            return Err(CoreError::Forbidden("Only admin can clear import history".into()).into());
        }
        self.shared.backend.clear_history(&session.user_name).await?;
        tracing::info!(user = %session.user_name, "Import history cleared");
        Ok(())
    }

    /// Stop all poll loops and pending retirements.
    ///
    /// Waits up to 5 seconds per poll loop for a clean exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down import tracker");
        self.shared.cancel.cancel();

        let polls = self.shared.registry.write().await.drain_polls();
        for (import_id, handle) in polls {
            handle.cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.task).await;
            tracing::debug!(import_id = %import_id, "Poll loop stopped");
        }

        tracing::info!("Import tracker shut down complete");
    }
}

impl Shared {
    pub(crate) fn emit(&self, event: TrackerEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.event_tx.send(event);
    }

    pub(crate) async fn register(&self, import_id: &ImportId, file_name: &str) -> bool {
        let mut registry = self.registry.write().await;
        match registry.register(import_id.clone(), file_name.to_string()) {
            Registration::Registered => {
                self.presenter.create(import_id, file_name);
                self.emit(TrackerEvent::JobRegistered {
                    import_id: import_id.clone(),
                    file_name: file_name.to_string(),
                });
                tracing::info!(import_id = %import_id, file_name, "Tracking import");
                true
            }
            Registration::AlreadyTracked => false,
            Registration::Retired => {
                tracing::debug!(import_id = %import_id, "Ignoring registration of retired import");
                false
            }
        }
    }

    pub(crate) async fn start_polling(self: &Arc<Self>, import_id: &ImportId) -> bool {
        let mut registry = self.registry.write().await;
        let Some(job) = registry.get_mut(import_id) else {
            return false;
        };
        if job.poll.is_some() || job.status.is_terminal() || self.cancel.is_cancelled() {
            return false;
        }

        let cancel = self.cancel.child_token();
        let task = tokio::spawn(run_poll_loop(
            Arc::clone(self),
            import_id.clone(),
            cancel.clone(),
        ));
        job.poll = Some(PollHandle { cancel, task });
        tracing::debug!(import_id = %import_id, "Polling started");
        true
    }

    pub(crate) async fn stop_polling(&self, import_id: &ImportId, reason: StopReason) -> bool {
        let mut registry = self.registry.write().await;
        let Some(handle) = registry.take_poll(import_id) else {
            return false;
        };
        handle.cancel.cancel();
        self.emit(TrackerEvent::PollingStopped {
            import_id: import_id.clone(),
            reason,
        });
        true
    }

    /// Remove a job before it finished, cancelling its poll loop.
    pub(crate) async fn unregister(&self, import_id: &ImportId, reason: StopReason) -> bool {
        self.remove_job(import_id, reason, None).await
    }

    /// Like [`Shared::unregister`], on behalf of the poll loop owning `poll`.
    /// A loop that was stopped meanwhile removes nothing.
    pub(crate) async fn unregister_polled(
        &self,
        import_id: &ImportId,
        reason: StopReason,
        poll: &CancellationToken,
    ) -> bool {
        self.remove_job(import_id, reason, Some(poll)).await
    }

    async fn remove_job(
        &self,
        import_id: &ImportId,
        reason: StopReason,
        poll: Option<&CancellationToken>,
    ) -> bool {
        let mut registry = self.registry.write().await;
        if poll.is_some_and(CancellationToken::is_cancelled) {
            tracing::debug!(import_id = %import_id, ?reason, "Poll loop already stopped, keeping import");
            return false;
        }
        let Some(job) = registry.remove(import_id) else {
            return false;
        };
        if let Some(handle) = job.poll {
            handle.cancel.cancel();
            self.emit(TrackerEvent::PollingStopped {
                import_id: import_id.clone(),
                reason,
            });
        }
        self.presenter.remove(import_id);
        self.emit(TrackerEvent::JobUnregistered {
            import_id: import_id.clone(),
        });
        tracing::info!(import_id = %import_id, ?reason, "Stopped tracking import");
        true
    }

    /// Remove a terminal job once the grace period has passed.
    pub(crate) fn schedule_retirement(self: &Arc<Self>, import_id: ImportId) {
        let shared = Arc::clone(self);
        let grace = self.config.retire_grace;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(grace) => shared.retire(&import_id).await,
            }
        });
    }

    async fn retire(&self, import_id: &ImportId) {
        let mut registry = self.registry.write().await;
        if !registry.get(import_id).is_some_and(|job| job.retiring) {
            return;
        }
        registry.remove(import_id);
        self.presenter.remove(import_id);
        self.emit(TrackerEvent::JobRetired {
            import_id: import_id.clone(),
        });
        tracing::info!(import_id = %import_id, "Retired finished import");
    }
}
