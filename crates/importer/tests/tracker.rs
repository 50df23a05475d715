//! Integration tests for `ImportTracker`.
//!
//! The tracker runs against scripted fakes on a paused clock, so poll
//! intervals, backoff delays and the retirement grace period are observed
//! exactly.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use hb_core::error::CoreError;
use hb_core::history::ImportHistoryEntry;
use hb_core::import::{ImportProgress, ImportStatus};
use hb_core::selection::UploadFile;
use hb_core::session::Session;
use hb_core::types::ImportId;
use hb_importer::api::{ImportApiError, ImportBackend, UploadedImport};
use hb_importer::events::{StopReason, TrackerEvent, UpdateSource};
use hb_importer::messages::{RecordAction, UpdateEvent};
use hb_importer::poller::PollConfig;
use hb_importer::presenter::ProgressPresenter;
use hb_importer::reconciler::ApplyOutcome;
use hb_importer::tracker::{
    ImportTracker, RejectedUpload, StartedImport, TrackerConfig, TrackerError,
};

use common::{
    advance_ms, id, FakeView, Harness, PresenterCall, RecordingPresenter, Reply, UploadRequest,
};

fn csv(name: &str) -> UploadFile {
    UploadFile::new(name, format!("name\n{name}\n"))
}

fn accepted(import_id: &str, file_name: Option<&str>) -> UploadedImport {
    UploadedImport {
        import_id: Some(id(import_id)),
        file_name: file_name.map(str::to_string),
        error: None,
    }
}

fn in_progress(import_id: &str, percent: u8) -> ImportProgress {
    ImportProgress::new(import_id).with_progress(percent)
}

fn finished(import_id: &str, status: ImportStatus) -> ImportProgress {
    ImportProgress::new(import_id)
        .with_status(status)
        .with_progress(100)
}

fn gaps_ms(calls: &[tokio::time::Instant]) -> Vec<u128> {
    calls
        .windows(2)
        .map(|w| w[1].duration_since(w[0]).as_millis())
        .collect()
}

// ---------------------------------------------------------------------------
// Test: a single-file upload is polled to completion, then retired
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn single_file_import_is_polled_to_completion_then_retired() {
    let mut h = Harness::new();
    h.backend.set_upload_reply(vec![accepted("7", None)]);
    h.backend.script(
        "7",
        [
            Reply::Progress(in_progress("7", 10)),
            Reply::Progress(in_progress("7", 50).with_records(50, 100)),
            Reply::Progress(
                finished("7", ImportStatus::Completed)
                    .with_records(100, 100)
                    .with_outcomes(98, 2),
            ),
        ],
    );

    let session = Session::new("alice", false);
    let outcome = h
        .tracker
        .begin_import(&session, vec![csv("people.csv")])
        .await
        .unwrap();

    assert_eq!(
        outcome.started,
        vec![StartedImport {
            import_id: id("7"),
            file_name: "people.csv".into(),
        }]
    );
    assert!(outcome.rejected.is_empty());
    assert_eq!(
        h.backend.upload_requests(),
        vec![UploadRequest::Single("people.csv".into())]
    );
    assert!(h.tracker.has_active_poll(&id("7")).await);

    advance_ms(1_600).await;

    let percents: Vec<u8> = h
        .presenter
        .renders("7")
        .iter()
        .map(|p| p.current_progress)
        .collect();
    assert_eq!(percents, vec![10, 50, 100]);
    assert_eq!(h.backend.progress_calls("7").len(), 3);

    let job = h.tracker.job(&id("7")).await.unwrap();
    assert_eq!(job.status, ImportStatus::Completed);
    assert!(!job.polling);
    assert_eq!(h.view.reloads(), 1);

    // Still visible during the grace period.
    advance_ms(9_000).await;
    assert!(h.tracker.is_tracked(&id("7")).await);

    advance_ms(1_000).await;
    assert!(!h.tracker.is_tracked(&id("7")).await);
    assert_eq!(
        h.presenter.count(|c| *c == PresenterCall::Remove(id("7"))),
        1
    );

    let events = h.drain_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, TrackerEvent::JobRetired { .. }))
            .count(),
        1
    );
    assert!(events.iter().any(|e| matches!(
        e,
        TrackerEvent::PollingStopped { reason: StopReason::Terminal, .. }
    )));
}

// ---------------------------------------------------------------------------
// Test: registration and polling are idempotent
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_register_and_start_polling_are_noops() {
    let h = Harness::new();
    h.track("1", "a.csv").await;

    assert!(!h.tracker.register(&id("1"), "a.csv").await);
    assert!(!h.tracker.start_polling(&id("1")).await);

    advance_ms(2_100).await;

    // One loop at the 500ms interval: 0.5s, 1.0s, 1.5s, 2.0s.
    let calls = h.backend.progress_calls("1");
    assert_eq!(calls.len(), 4);
    assert_eq!(gaps_ms(&calls), vec![500, 500, 500]);
    assert_eq!(
        h.presenter
            .count(|c| matches!(c, PresenterCall::Create(..))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn identical_payloads_render_once() {
    let h = Harness::new();
    h.backend.script("1", [Reply::Progress(in_progress("1", 20))]);
    h.track("1", "a.csv").await;

    advance_ms(3_100).await;

    assert!(h.backend.progress_calls("1").len() >= 6);
    assert_eq!(h.presenter.renders("1").len(), 1);
}

// ---------------------------------------------------------------------------
// Test: upload initiation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn invalid_batches_send_no_request() {
    let h = Harness::new();
    let session = Session::default();

    let too_many: Vec<_> = (0..6).map(|i| csv(&format!("f{i}.csv"))).collect();
    let result = h.tracker.begin_import(&session, too_many).await;
    assert_matches!(result, Err(TrackerError::Core(CoreError::Validation(_))));

    let result = h
        .tracker
        .begin_import(&session, vec![UploadFile::new("notes.txt", "hello")])
        .await;
    assert_matches!(result, Err(TrackerError::Core(CoreError::Validation(_))));

    let result = h.tracker.begin_import(&session, Vec::new()).await;
    assert_matches!(result, Err(TrackerError::Core(CoreError::Validation(_))));

    assert!(h.backend.upload_requests().is_empty());
    assert!(h.tracker.tracked_ids().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn multi_file_upload_tracks_accepted_files_only() {
    let h = Harness::new();
    h.backend.set_upload_reply(vec![
        accepted("11", Some("a.csv")),
        UploadedImport {
            import_id: None,
            file_name: Some("b.json".into()),
            error: Some("Duplicate file".into()),
        },
    ]);

    let outcome = h
        .tracker
        .begin_import(
            &Session::default(),
            vec![csv("a.csv"), UploadFile::new("b.json", "[]")],
        )
        .await
        .unwrap();

    assert_eq!(
        h.backend.upload_requests(),
        vec![UploadRequest::Multiple(vec!["a.csv".into(), "b.json".into()])]
    );
    assert_eq!(outcome.started.len(), 1);
    assert_eq!(
        outcome.rejected,
        vec![RejectedUpload {
            file_name: "b.json".into(),
            error: "Duplicate file".into(),
        }]
    );
    assert_eq!(h.tracker.tracked_ids().await, vec![id("11")]);
    assert!(h.tracker.has_active_poll(&id("11")).await);
}

#[tokio::test(start_paused = true)]
async fn failed_upload_tracks_nothing() {
    let h = Harness::new();

    let result = h
        .tracker
        .begin_import(&Session::default(), vec![csv("a.csv")])
        .await;

    assert_matches!(
        result,
        Err(TrackerError::Api(ImportApiError::ApiError { status: 500, .. }))
    );
    assert!(h.tracker.tracked_ids().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: poll failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn not_found_stops_tracking() {
    let mut h = Harness::new();
    h.backend.script("3", [Reply::NotFound]);
    h.track("3", "gone.csv").await;

    advance_ms(600).await;

    assert!(!h.tracker.is_tracked(&id("3")).await);
    assert_eq!(h.backend.progress_calls("3").len(), 1);
    assert_eq!(
        h.presenter.count(|c| *c == PresenterCall::Remove(id("3"))),
        1
    );

    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        TrackerEvent::PollingStopped { reason: StopReason::NotFound, .. }
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, TrackerEvent::JobUnregistered { .. })));

    // The id is remembered and cannot come back.
    assert!(!h.tracker.register(&id("3"), "gone.csv").await);
}

#[tokio::test(start_paused = true)]
async fn failures_back_off_exponentially_and_reset_on_success() {
    let h = Harness::new();
    h.backend.script(
        "1",
        [
            Reply::Error(500),
            Reply::Error(502),
            Reply::Error(503),
            Reply::Progress(in_progress("1", 40)),
        ],
    );
    h.track("1", "a.csv").await;

    advance_ms(8_100).await;

    // Calls at 0.5s, 1.5s, 3.5s, 7.5s, then back to the 500ms interval.
    let calls = h.backend.progress_calls("1");
    assert_eq!(gaps_ms(&calls), vec![1_000, 2_000, 4_000, 500]);
    assert!(h.tracker.has_active_poll(&id("1")).await);
    assert_eq!(h.presenter.renders("1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_abandon_the_job() {
    let config = TrackerConfig {
        poll: hb_importer::poller::PollConfig {
            max_consecutive_failures: 3,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut h = Harness::with_config(config);
    h.backend.script("1", [Reply::Error(503)]);
    h.track("1", "a.csv").await;

    advance_ms(10_000).await;

    assert_eq!(h.backend.progress_calls("1").len(), 3);
    assert!(!h.tracker.is_tracked(&id("1")).await);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        TrackerEvent::PollingStopped { reason: StopReason::Abandoned, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn polling_gives_up_after_max_duration() {
    let config = TrackerConfig {
        poll: hb_importer::poller::PollConfig {
            max_duration: Duration::from_secs(2),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut h = Harness::with_config(config);
    h.track("1", "slow.csv").await;

    advance_ms(2_500).await;

    assert!(!h.tracker.is_tracked(&id("1")).await);
    assert_eq!(h.backend.progress_calls("1").len(), 3);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        TrackerEvent::PollingStopped { reason: StopReason::Abandoned, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn timed_out_request_counts_as_failure() {
    let h = Harness::new();
    h.backend.script(
        "1",
        [Reply::Hang, Reply::Progress(finished("1", ImportStatus::Completed))],
    );
    h.track("1", "a.csv").await;

    advance_ms(11_600).await;

    // 0.5s: hangs until the 10s timeout, then a 1s backoff.
    let calls = h.backend.progress_calls("1");
    assert_eq!(gaps_ms(&calls), vec![11_000]);
    assert_eq!(
        h.tracker.job(&id("1")).await.unwrap().status,
        ImportStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn poll_response_is_applied_under_the_polled_id() {
    let h = Harness::new();
    h.backend.script("1", [Reply::Progress(in_progress("2", 30))]);
    h.track("1", "a.csv").await;

    advance_ms(600).await;

    let renders = h.presenter.renders("1");
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].current_progress, 30);
    assert!(!h.tracker.is_tracked(&id("2")).await);
}

// ---------------------------------------------------------------------------
// Test: stopping
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stop_polling_discards_in_flight_response() {
    let h = Harness::new();
    h.backend.script(
        "1",
        [Reply::Delayed(
            Duration::from_millis(1_000),
            finished("1", ImportStatus::Completed),
        )],
    );
    h.track("1", "a.csv").await;

    advance_ms(1_000).await;
    assert!(h.tracker.stop_polling(&id("1")).await);
    assert!(!h.tracker.stop_polling(&id("1")).await);

    advance_ms(3_000).await;

    let job = h.tracker.job(&id("1")).await.unwrap();
    assert_eq!(job.status, ImportStatus::Pending);
    assert!(!job.polling);
    assert!(h.presenter.renders("1").is_empty());
    assert_eq!(h.backend.progress_calls("1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unregister_cancels_polling_and_removes_ui() {
    let mut h = Harness::new();
    h.track("1", "a.csv").await;

    assert!(h.tracker.unregister(&id("1")).await);
    assert!(!h.tracker.unregister(&id("1")).await);

    advance_ms(2_000).await;

    assert!(h.backend.progress_calls("1").is_empty());
    assert_eq!(
        h.presenter.count(|c| *c == PresenterCall::Remove(id("1"))),
        1
    );
    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        TrackerEvent::PollingStopped { reason: StopReason::Stopped, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_polls() {
    let h = Harness::new();
    h.track("1", "a.csv").await;
    h.track("2", "b.csv").await;

    advance_ms(600).await;
    h.tracker.shutdown().await;
    let before = h.backend.progress_calls("1").len() + h.backend.progress_calls("2").len();

    advance_ms(5_000).await;

    let after = h.backend.progress_calls("1").len() + h.backend.progress_calls("2").len();
    assert_eq!(before, after);
    assert!(!h.tracker.has_active_poll(&id("1")).await);
    assert!(!h.tracker.start_polling(&id("1")).await);
}

// ---------------------------------------------------------------------------
// Test: push updates
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_terminal_stops_polling_and_retires_once() {
    let mut h = Harness::new();
    h.track("1", "a.csv").await;

    advance_ms(200).await;
    h.tracker
        .handle_update(UpdateEvent::ImportProgress(finished(
            "1",
            ImportStatus::Completed,
        )))
        .await;

    assert!(!h.tracker.has_active_poll(&id("1")).await);
    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        TrackerEvent::JobTerminal { status: ImportStatus::Completed, .. }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        TrackerEvent::ProgressApplied { source: UpdateSource::Push, .. }
    )));

    advance_ms(2_000).await;
    assert!(h.backend.progress_calls("1").is_empty());

    // A late push after the terminal one changes nothing.
    let late = h
        .tracker
        .apply_progress(in_progress("1", 60), UpdateSource::Push)
        .await;
    assert_eq!(late, ApplyOutcome::AfterTerminal);
    assert_eq!(h.presenter.renders("1").len(), 1);

    // Terminal at t=200, so retirement is due at t=10_200.
    advance_ms(7_999).await;
    assert!(h.tracker.is_tracked(&id("1")).await);
    advance_ms(2).await;
    assert!(!h.tracker.is_tracked(&id("1")).await);

    // Retired ids are not adopted again.
    h.tracker
        .handle_update(UpdateEvent::ImportProgress(in_progress("1", 70)))
        .await;
    assert!(!h.tracker.is_tracked(&id("1")).await);
    assert_eq!(
        h.presenter
            .count(|c| matches!(c, PresenterCall::Create(..))),
        1
    );
    assert_eq!(
        h.presenter.count(|c| *c == PresenterCall::Remove(id("1"))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn push_failure_shows_error_banner() {
    let h = Harness::new();
    h.track("4", "bad.csv").await;

    h.tracker
        .handle_update(UpdateEvent::ImportProgress(
            finished("4", ImportStatus::Failed).with_error("Row 3: missing email"),
        ))
        .await;

    assert_eq!(
        h.presenter
            .count(|c| *c == PresenterCall::ShowError(id("4"), "Row 3: missing email".into())),
        1
    );
    assert_eq!(h.view.reloads(), 1);
}

#[tokio::test(start_paused = true)]
async fn push_for_unknown_job_adopts_and_polls_it() {
    let h = Harness::new();

    h.tracker
        .handle_update(UpdateEvent::ImportProgress(
            in_progress("9", 5).with_file_name("late.csv"),
        ))
        .await;

    assert!(h.tracker.is_tracked(&id("9")).await);
    assert!(h.tracker.has_active_poll(&id("9")).await);
    assert_eq!(
        h.presenter
            .count(|c| *c == PresenterCall::Create(id("9"), "late.csv".into())),
        1
    );

    advance_ms(600).await;
    assert_eq!(h.backend.progress_calls("9").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn poll_response_for_untracked_job_is_dropped() {
    let h = Harness::new();

    let outcome = h
        .tracker
        .apply_progress(in_progress("5", 10), UpdateSource::Poll)
        .await;

    assert_eq!(outcome, ApplyOutcome::Untracked);
    assert!(!h.tracker.is_tracked(&id("5")).await);
    assert!(h.presenter.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Test: a poll response racing a push completion
// ---------------------------------------------------------------------------

/// Answers 404 as soon as a push update starts rendering.
struct NotFoundWhileRendering {
    rendering: Arc<AtomicBool>,
}

#[async_trait]
impl ImportBackend for NotFoundWhileRendering {
    async fn upload(
        &self,
        _session: &Session,
        _file: &UploadFile,
    ) -> Result<UploadedImport, ImportApiError> {
        unreachable!("no uploads in this test")
    }

    async fn upload_multiple(
        &self,
        _session: &Session,
        _files: &[UploadFile],
    ) -> Result<Vec<UploadedImport>, ImportApiError> {
        unreachable!("no uploads in this test")
    }

    async fn progress(&self, _import_id: &ImportId) -> Result<ImportProgress, ImportApiError> {
        while !self.rendering.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Err(ImportApiError::NotFound)
    }

    async fn history(&self, _user_name: &str) -> Result<Vec<ImportHistoryEntry>, ImportApiError> {
        Ok(Vec::new())
    }

    async fn clear_history(&self, _user_name: &str) -> Result<(), ImportApiError> {
        Ok(())
    }
}

/// Holds the registry lock for a while on every render.
struct SlowRenderPresenter {
    rendering: Arc<AtomicBool>,
    inner: Arc<RecordingPresenter>,
}

impl ProgressPresenter for SlowRenderPresenter {
    fn create(&self, import_id: &ImportId, file_name: &str) {
        self.inner.create(import_id, file_name);
    }

    fn render(&self, progress: &ImportProgress) {
        self.rendering.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        self.inner.render(progress);
    }

    fn show_error(&self, import_id: &ImportId, message: &str) {
        self.inner.show_error(import_id, message);
    }

    fn remove(&self, import_id: &ImportId) {
        self.inner.remove(import_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn not_found_racing_push_completion_keeps_grace_period() {
    let rendering = Arc::new(AtomicBool::new(false));
    let recorded = RecordingPresenter::new();
    let config = TrackerConfig {
        poll: PollConfig {
            interval: Duration::from_millis(50),
            ..PollConfig::default()
        },
        retire_grace: Duration::from_millis(1_500),
    };
    let tracker = ImportTracker::new(
        Arc::new(NotFoundWhileRendering {
            rendering: rendering.clone(),
        }),
        Arc::new(SlowRenderPresenter {
            rendering,
            inner: recorded.clone(),
        }),
        FakeView::new(false),
        config,
    );
    let mut events = tracker.subscribe();

    assert!(tracker.register(&id("1"), "a.csv").await);
    assert!(tracker.start_polling(&id("1")).await);

    // The progress request is in flight when the push arrives; it answers
    // 404 while the push is still rendering under the registry lock.
    tokio::time::sleep(Duration::from_millis(150)).await;
    tracker
        .handle_update(UpdateEvent::ImportProgress(finished(
            "1",
            ImportStatus::Completed,
        )))
        .await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(tracker.is_tracked(&id("1")).await);
    assert_eq!(
        recorded.count(|c| matches!(c, PresenterCall::Remove(_))),
        0
    );

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!tracker.is_tracked(&id("1")).await);
    assert_eq!(
        recorded.count(|c| *c == PresenterCall::Remove(id("1"))),
        1
    );

    let mut retired = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            TrackerEvent::JobRetired { .. } => retired += 1,
            TrackerEvent::JobUnregistered { .. } => panic!("terminal job was unregistered"),
            TrackerEvent::PollingStopped { reason, .. } => {
                assert_eq!(reason, StopReason::Terminal)
            }
            _ => {}
        }
    }
    assert_eq!(retired, 1);
}

#[tokio::test(start_paused = true)]
async fn record_changes_reload_active_table() {
    let mut h = Harness::new();

    h.tracker
        .handle_update(UpdateEvent::Created(serde_json::json!({"id": 1})))
        .await;
    h.tracker
        .handle_update(UpdateEvent::Deleted(serde_json::json!(1)))
        .await;

    assert_eq!(h.view.reloads(), 2);
    let actions: Vec<_> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            TrackerEvent::RecordsChanged { action } => Some(action),
            _ => None,
        })
        .collect();
    assert_eq!(actions, vec![RecordAction::Created, RecordAction::Deleted]);
}

#[tokio::test(start_paused = true)]
async fn record_changes_skip_inactive_table() {
    let h = Harness::with_inactive_view();

    h.tracker
        .handle_update(UpdateEvent::Updated(serde_json::json!({"id": 1})))
        .await;

    assert_eq!(h.view.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn run_updates_consumes_until_channel_closes() {
    let h = Harness::new();
    let (tx, rx) = tokio::sync::mpsc::channel(4);

    let tracker = h.tracker.clone();
    let consumer = tokio::spawn(async move { tracker.run_updates(rx).await });

    tx.send(UpdateEvent::ImportProgress(in_progress("8", 50)))
        .await
        .unwrap();
    drop(tx);
    consumer.await.unwrap();

    assert!(h.tracker.is_tracked(&id("8")).await);
}

// ---------------------------------------------------------------------------
// Test: history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_is_scoped_by_role() {
    let h = Harness::new();

    h.tracker.history(&Session::new("alice", false)).await.unwrap();
    h.tracker.history(&Session::new("root", true)).await.unwrap();

    assert_eq!(h.backend.history_users(), vec!["alice", "admin"]);
}

#[tokio::test]
async fn only_admin_can_clear_history() {
    let h = Harness::new();

    let result = h.tracker.clear_history(&Session::new("alice", false)).await;
    assert_matches!(result, Err(TrackerError::Core(CoreError::Forbidden(_))));
    assert!(h.backend.cleared_by().is_empty());

    h.tracker
        .clear_history(&Session::new("root", true))
        .await
        .unwrap();
    assert_eq!(h.backend.cleared_by(), vec!["root"]);
}
