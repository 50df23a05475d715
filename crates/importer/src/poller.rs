//! Per-job status polling.
//!
//! Each in-flight job gets one poll loop. The loop sleeps first, then
//! fetches `GET /api/import/progress/{id}` under a timeout and feeds the
//! response through the same update path as push notifications. Failures
//! back off exponentially; a 404 or too many failures end the loop and
//! stop tracking the job.

use std::sync::Arc;
use std::time::Duration;

use hb_core::types::ImportId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::ImportApiError;
use crate::backoff::{Backoff, BackoffConfig};
use crate::events::StopReason;
use crate::reconciler::ApplyOutcome;
use crate::tracker::Shared;

/// Delay between successful polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll loop tuning.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Timeout of a single progress request.
    pub request_timeout: Duration,
    /// Delays applied after failed requests.
    pub backoff: BackoffConfig,
    /// Give up after this many failures in a row. `0` never gives up.
    pub max_consecutive_failures: u32,
    /// Give up once a job has been polled this long.
    pub max_duration: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            max_consecutive_failures: 40,
            max_duration: Duration::from_secs(60 * 60),
        }
    }
}

/// Poll one job until it is terminal, gone, abandoned or cancelled.
pub(crate) async fn run_poll_loop(
    shared: Arc<Shared>,
    import_id: ImportId,
    cancel: CancellationToken,
) {
    let config = shared.config.poll.clone();
    let started = Instant::now();
    let mut delay = config.interval;
    let mut backoff = Backoff::new(config.backoff.clone());

    tracing::debug!(import_id = %import_id, "Poll loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        if started.elapsed() >= config.max_duration {
            tracing::warn!(
                import_id = %import_id,
                elapsed_secs = started.elapsed().as_secs(),
                "Giving up on import, polling took too long",
            );
            shared
                .unregister_polled(&import_id, StopReason::Abandoned, &cancel)
                .await;
            break;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio::time::timeout(config.request_timeout, shared.backend.progress(&import_id)) => result,
        };

        // Stopped while the request was in flight. Handlers re-check under
        // the registry lock, this only skips taking it.
        if cancel.is_cancelled() {
            break;
        }

        let error = match result {
            Ok(Ok(mut progress)) => {
                if progress.import_id != import_id {
                    tracing::warn!(
                        import_id = %import_id,
                        reported = %progress.import_id,
                        "Progress response names another import",
                    );
                    progress.import_id = import_id.clone();
                }
                backoff.reset();
                delay = config.interval;

                match shared.apply_polled(progress, &cancel).await {
                    ApplyOutcome::Rendered | ApplyOutcome::Unchanged => continue,
                    ApplyOutcome::Terminal
                    | ApplyOutcome::AfterTerminal
                    | ApplyOutcome::Untracked
                    | ApplyOutcome::Stale => break,
                }
            }
            Ok(Err(ImportApiError::NotFound)) => {
                tracing::warn!(import_id = %import_id, "Import not found on server, stopping poll");
                shared
                    .unregister_polled(&import_id, StopReason::NotFound, &cancel)
                    .await;
                break;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "request timed out after {}ms",
                config.request_timeout.as_millis()
            ),
        };

        delay = backoff.fail();
        let failures = backoff.failures();
        if config.max_consecutive_failures > 0 && failures >= config.max_consecutive_failures {
            tracing::warn!(
                import_id = %import_id,
                failures,
                error = %error,
                "Giving up on import after repeated poll failures",
            );
            shared
                .unregister_polled(&import_id, StopReason::Abandoned, &cancel)
                .await;
            break;
        }

        tracing::warn!(
            import_id = %import_id,
            failures,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "Poll request failed",
        );
    }

    tracing::debug!(import_id = %import_id, "Poll loop exited");
}
