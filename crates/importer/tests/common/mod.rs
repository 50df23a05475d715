//! Fakes shared by the tracker integration tests.
//!
//! [`FakeBackend`] answers progress requests from a per-job script and
//! records when each request was made; [`RecordingPresenter`] and
//! [`FakeView`] record every collaborator call.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hb_core::history::ImportHistoryEntry;
use hb_core::import::ImportProgress;
use hb_core::selection::UploadFile;
use hb_core::session::Session;
use hb_core::types::ImportId;
use hb_importer::api::{ImportApiError, ImportBackend, UploadedImport};
use hb_importer::events::TrackerEvent;
use hb_importer::presenter::{ProgressPresenter, RecordView};
use hb_importer::tracker::{ImportTracker, TrackerConfig};
use tokio::sync::broadcast;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// One scripted answer to a progress request.
#[derive(Debug, Clone)]
pub enum Reply {
    Progress(ImportProgress),
    /// Answer with `progress` after `delay`.
    Delayed(Duration, ImportProgress),
    NotFound,
    Error(u16),
    /// Never answer.
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRequest {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Default)]
pub struct FakeBackend {
    replies: Mutex<HashMap<ImportId, VecDeque<Reply>>>,
    progress_calls: Mutex<Vec<(ImportId, Instant)>>,
    upload_reply: Mutex<Vec<UploadedImport>>,
    upload_requests: Mutex<Vec<UploadRequest>>,
    history: Mutex<Vec<ImportHistoryEntry>>,
    history_users: Mutex<Vec<String>>,
    cleared_by: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue replies for `import_id`. The last reply repeats forever;
    /// an unscripted job reports a fresh `IN_PROGRESS` payload.
    pub fn script(&self, import_id: &str, replies: impl IntoIterator<Item = Reply>) {
        self.replies
            .lock()
            .unwrap()
            .entry(ImportId::from(import_id))
            .or_default()
            .extend(replies);
    }

    pub fn set_upload_reply(&self, entries: Vec<UploadedImport>) {
        *self.upload_reply.lock().unwrap() = entries;
    }

    pub fn set_history(&self, entries: Vec<ImportHistoryEntry>) {
        *self.history.lock().unwrap() = entries;
    }

    /// Instants at which progress of `import_id` was requested.
    pub fn progress_calls(&self, import_id: &str) -> Vec<Instant> {
        self.progress_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id.as_str() == import_id)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn upload_requests(&self) -> Vec<UploadRequest> {
        self.upload_requests.lock().unwrap().clone()
    }

    pub fn history_users(&self) -> Vec<String> {
        self.history_users.lock().unwrap().clone()
    }

    pub fn cleared_by(&self) -> Vec<String> {
        self.cleared_by.lock().unwrap().clone()
    }

    fn next_reply(&self, import_id: &ImportId) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(import_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::Progress(ImportProgress::new(import_id.clone())),
        }
    }
}

#[async_trait]
impl ImportBackend for FakeBackend {
    async fn upload(
        &self,
        _session: &Session,
        file: &UploadFile,
    ) -> Result<UploadedImport, ImportApiError> {
        self.upload_requests
            .lock()
            .unwrap()
            .push(UploadRequest::Single(file.name.clone()));
        self.upload_reply
            .lock()
            .unwrap()
            .first()
            .cloned()
            .ok_or(ImportApiError::ApiError {
                status: 500,
                message: "no upload reply scripted".into(),
            })
    }

    async fn upload_multiple(
        &self,
        _session: &Session,
        files: &[UploadFile],
    ) -> Result<Vec<UploadedImport>, ImportApiError> {
        self.upload_requests.lock().unwrap().push(UploadRequest::Multiple(
            files.iter().map(|f| f.name.clone()).collect(),
        ));
        Ok(self.upload_reply.lock().unwrap().clone())
    }

    async fn progress(&self, import_id: &ImportId) -> Result<ImportProgress, ImportApiError> {
        self.progress_calls
            .lock()
            .unwrap()
            .push((import_id.clone(), Instant::now()));

        match self.next_reply(import_id) {
            Reply::Progress(progress) => Ok(progress),
            Reply::Delayed(delay, progress) => {
                tokio::time::sleep(delay).await;
                Ok(progress)
            }
            Reply::NotFound => Err(ImportApiError::NotFound),
            Reply::Error(status) => Err(ImportApiError::ApiError {
                status,
                message: "scripted failure".into(),
            }),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn history(&self, user_name: &str) -> Result<Vec<ImportHistoryEntry>, ImportApiError> {
        self.history_users.lock().unwrap().push(user_name.to_string());
        Ok(self.history.lock().unwrap().clone())
    }

    async fn clear_history(&self, user_name: &str) -> Result<(), ImportApiError> {
        self.cleared_by.lock().unwrap().push(user_name.to_string());
        self.history.lock().unwrap().clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Presenter and view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    Create(ImportId, String),
    Render(ImportProgress),
    ShowError(ImportId, String),
    Remove(ImportId),
}

#[derive(Default)]
pub struct RecordingPresenter {
    calls: Mutex<Vec<PresenterCall>>,
}

impl RecordingPresenter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<PresenterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn renders(&self, import_id: &str) -> Vec<ImportProgress> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PresenterCall::Render(p) if p.import_id.as_str() == import_id => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&PresenterCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }
}

impl ProgressPresenter for RecordingPresenter {
    fn create(&self, import_id: &ImportId, file_name: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(PresenterCall::Create(import_id.clone(), file_name.to_string()));
    }

    fn render(&self, progress: &ImportProgress) {
        self.calls
            .lock()
            .unwrap()
            .push(PresenterCall::Render(progress.clone()));
    }

    fn show_error(&self, import_id: &ImportId, message: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(PresenterCall::ShowError(import_id.clone(), message.to_string()));
    }

    fn remove(&self, import_id: &ImportId) {
        self.calls
            .lock()
            .unwrap()
            .push(PresenterCall::Remove(import_id.clone()));
    }
}

#[derive(Default)]
pub struct FakeView {
    active: AtomicBool,
    reloads: AtomicUsize,
}

impl FakeView {
    pub fn new(active: bool) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(active),
            reloads: AtomicUsize::new(0),
        })
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl RecordView for FakeView {
    fn is_table_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn request_reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub tracker: ImportTracker,
    pub backend: Arc<FakeBackend>,
    pub presenter: Arc<RecordingPresenter>,
    pub view: Arc<FakeView>,
    pub events: broadcast::Receiver<TrackerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self::build(config, true)
    }

    /// A harness whose record table is not the active view.
    pub fn with_inactive_view() -> Self {
        Self::build(TrackerConfig::default(), false)
    }

    fn build(config: TrackerConfig, table_active: bool) -> Self {
        let backend = FakeBackend::new();
        let presenter = RecordingPresenter::new();
        let view = FakeView::new(table_active);
        let tracker = ImportTracker::new(
            backend.clone(),
            presenter.clone(),
            view.clone(),
            config,
        );
        let events = tracker.subscribe();
        Self {
            tracker,
            backend,
            presenter,
            view,
            events,
        }
    }

    /// Register `import_id` and start polling it.
    pub async fn track(&self, import_id: &str, file_name: &str) {
        let id = ImportId::from(import_id);
        assert!(self.tracker.register(&id, file_name).await);
        assert!(self.tracker.start_polling(&id).await);
    }

    /// Every event emitted so far.
    pub fn drain_events(&mut self) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn id(s: &str) -> ImportId {
    ImportId::from(s)
}

/// Let the paused clock run for `millis` milliseconds.
pub async fn advance_ms(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
