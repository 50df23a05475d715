//! Exponential-backoff reconnection for the push channel.
//!
//! When the push connection drops, [`reconnect_loop`] keeps retrying
//! with increasing delays until either the connection is restored or the
//! [`CancellationToken`] is triggered.

use tokio_util::sync::CancellationToken;

use crate::backoff::{Backoff, BackoffConfig};
use crate::client::{PushClient, PushConnection};

/// Connect to the push channel, retrying with exponential backoff.
///
/// The first attempt is made immediately. Returns `Some(connection)` once
/// a connection succeeds, or `None` if `cancel` is triggered first.
pub async fn reconnect_loop(
    client: &PushClient,
    config: &BackoffConfig,
    cancel: &CancellationToken,
) -> Option<PushConnection> {
    let mut backoff = Backoff::new(config.clone());

    loop {
        let attempt = backoff.failures() + 1;
        tracing::info!(
            url = client.ws_url(),
            attempt,
            "Connecting to push channel",
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Push reconnect cancelled");
                return None;
            }
            result = client.connect() => {
                match result {
                    Ok(conn) => {
                        tracing::info!(attempt, "Push channel connected");
                        return Some(conn);
                    }
                    Err(e) => {
                        let delay = backoff.fail();
                        tracing::warn!(
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Push connect attempt {attempt} failed",
                        );
                        // Wait before the next attempt, respecting cancellation.
                        tokio::select! {
                            _ = cancel.cancelled() => return None,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }
}
