//! Reconciliation of status payloads from the poll and push channels.
//!
//! Both channels carry the same [`ImportProgress`] shape and feed a single
//! update path. The rules are:
//!
//! - the last applied payload wins, regardless of channel;
//! - `COMPLETED` and `FAILED` are absorbing, later payloads are ignored;
//! - a payload identical to the last applied one is not re-rendered;
//! - a poll response for an untracked job is dropped, while a push for an
//!   unknown job adopts it (unless the id was retired).

use std::sync::Arc;

use hb_core::import::{ImportProgress, UNKNOWN_FILE_NAME};
use tokio_util::sync::CancellationToken;

use crate::events::{StopReason, TrackerEvent, UpdateSource};
use crate::messages::UpdateEvent;
use crate::registry::{Registration, TrackedJob};
use crate::tracker::Shared;

/// What applying a payload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The payload became the job's visible state.
    Rendered,
    /// Identical to the last applied payload; nothing changed.
    Unchanged,
    /// The payload moved the job into a terminal status.
    Terminal,
    /// The job was already terminal; the payload was ignored.
    AfterTerminal,
    /// The job is not tracked and the payload was dropped.
    Untracked,
    /// A poll response arrived after its loop was stopped and was dropped.
    Stale,
}

/// Fold `progress` into the tracked state of one job.
///
/// Pure bookkeeping: the caller renders and emits events based on the
/// returned outcome.
pub fn reconcile<H>(job: &mut TrackedJob<H>, progress: &ImportProgress) -> ApplyOutcome {
    if job.status.is_terminal() {
        return ApplyOutcome::AfterTerminal;
    }
    if job.last_known.as_ref() == Some(progress) {
        return ApplyOutcome::Unchanged;
    }

    if let Some(file_name) = progress.file_name.as_deref() {
        if job.file_name == UNKNOWN_FILE_NAME && !file_name.trim().is_empty() {
            job.file_name = file_name.to_string();
        }
    }
    job.status = progress.status;
    job.last_known = Some(progress.clone());

    if progress.is_terminal() {
        ApplyOutcome::Terminal
    } else {
        ApplyOutcome::Rendered
    }
}

impl Shared {
    /// Apply a payload from outside a poll loop. A push for an unknown job
    /// adopts it and starts polling it.
    pub(crate) async fn apply_progress(
        self: &Arc<Self>,
        progress: ImportProgress,
        source: UpdateSource,
    ) -> ApplyOutcome {
        let import_id = progress.import_id.clone();
        let (outcome, adopted) = self.apply(progress, source, None).await;
        if adopted && outcome == ApplyOutcome::Rendered {
            self.start_polling(&import_id).await;
        }
        outcome
    }

    /// Apply a response fetched by the poll loop owning `poll`.
    pub(crate) async fn apply_polled(
        self: &Arc<Self>,
        progress: ImportProgress,
        poll: &CancellationToken,
    ) -> ApplyOutcome {
        self.apply(progress, UpdateSource::Poll, Some(poll)).await.0
    }

    /// Returns the outcome and whether the job was adopted.
    async fn apply(
        self: &Arc<Self>,
        progress: ImportProgress,
        source: UpdateSource,
        poll: Option<&CancellationToken>,
    ) -> (ApplyOutcome, bool) {
        let import_id = progress.import_id.clone();
        let mut adopted = false;

        let outcome = {
            let mut registry = self.registry.write().await;

            // Poll handles are cancelled under this lock whenever they are
            // taken, so a live token means the loop still owns the job.
            if poll.is_some_and(CancellationToken::is_cancelled) {
                tracing::debug!(import_id = %import_id, "Dropping response of a stopped poll");
                return (ApplyOutcome::Stale, false);
            }

            if !registry.contains(&import_id) {
                if source == UpdateSource::Poll {
                    tracing::debug!(import_id = %import_id, "Dropping poll response for untracked import");
                    return (ApplyOutcome::Untracked, false);
                }
                let file_name = progress.display_file_name().to_string();
                if registry.register(import_id.clone(), file_name.clone()) != Registration::Registered {
                    tracing::debug!(import_id = %import_id, "Ignoring push update for retired import");
                    return (ApplyOutcome::Untracked, false);
                }
                self.presenter.create(&import_id, &file_name);
                self.emit(TrackerEvent::JobRegistered {
                    import_id: import_id.clone(),
                    file_name,
                });
                tracing::info!(import_id = %import_id, "Adopted import announced by push");
                adopted = true;
            }

            let Some(job) = registry.get_mut(&import_id) else {
                return (ApplyOutcome::Untracked, false);
            };

            let outcome = reconcile(job, &progress);
            if matches!(outcome, ApplyOutcome::Rendered | ApplyOutcome::Terminal) {
                self.presenter.render(&progress);
                self.emit(TrackerEvent::ProgressApplied {
                    progress: progress.clone(),
                    source,
                });
            }

            if outcome == ApplyOutcome::Terminal {
                job.retiring = true;
                if let Some(message) = progress.error_banner() {
                    self.presenter.show_error(&import_id, message);
                }
                if let Some(handle) = job.poll.take() {
                    handle.cancel.cancel();
                    self.emit(TrackerEvent::PollingStopped {
                        import_id: import_id.clone(),
                        reason: StopReason::Terminal,
                    });
                }
                self.emit(TrackerEvent::JobTerminal {
                    import_id: import_id.clone(),
                    status: progress.status,
                });
            }
            outcome
        };

        if outcome == ApplyOutcome::Terminal {
            tracing::info!(
                import_id = %import_id,
                status = %progress.status,
                ?source,
                successful = progress.successful_records,
                failed = progress.failed_records,
                "Import finished",
            );
            if self.view.is_table_active() {
                self.view.request_reload();
            }
            self.schedule_retirement(import_id);
        }

        (outcome, adopted)
    }

    pub(crate) async fn handle_update(self: &Arc<Self>, event: UpdateEvent) {
        if let Some(action) = event.record_action() {
            tracing::debug!(?action, "Record changed");
            if self.view.is_table_active() {
                self.view.request_reload();
            }
            self.emit(TrackerEvent::RecordsChanged { action });
            return;
        }

        if let UpdateEvent::ImportProgress(progress) = event {
            self.apply_progress(progress, UpdateSource::Push).await;
        }
    }
}
