//! Lifecycle of the push channel.
//!
//! [`PushChannel::spawn`] runs a background task that connects, forwards
//! notifications to the tracker and reconnects with backoff whenever the
//! connection drops, until cancelled or the update receiver goes away.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffConfig;
use crate::client::{PushClient, PushConnection};
use crate::messages::UpdateEvent;
use crate::processor::{process_frames, SessionEnd};
use crate::reconnect::reconnect_loop;

/// How long [`PushChannel::shutdown`] waits for the task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the running push channel task.
pub struct PushChannel {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PushChannel {
    /// Spawn the connection loop. `cancel` stops it; pass a child of the
    /// application's root token.
    pub fn spawn(
        client: PushClient,
        updates: mpsc::Sender<UpdateEvent>,
        backoff: BackoffConfig,
        cancel: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(run_connection_loop(
            client,
            updates,
            backoff,
            cancel.clone(),
        ));
        Self { cancel, task }
    }

    /// Cancel the connection loop and wait for it to disconnect.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task).await.is_err() {
            tracing::warn!("Push channel did not stop in time");
        }
    }
}

/// Connection loop: connect, process, and reconnect on drop.
async fn run_connection_loop(
    client: PushClient,
    updates: mpsc::Sender<UpdateEvent>,
    backoff: BackoffConfig,
    cancel: CancellationToken,
) {
    let mut pending: Option<PushConnection> = None;

    loop {
        let mut conn = match pending.take() {
            Some(conn) => conn,
            None => match reconnect_loop(&client, &backoff, &cancel).await {
                Some(conn) => conn,
                None => break,
            },
        };

        match process_frames(&mut conn.ws_stream, &updates, &cancel).await {
            SessionEnd::Cancelled | SessionEnd::ReceiverDropped => break,
            SessionEnd::Closed | SessionEnd::ServerError => {}
        }

        if cancel.is_cancelled() {
            break;
        }

        tracing::warn!(url = client.ws_url(), "Push connection lost, reconnecting");
        pending = reconnect_loop(&client, &backoff, &cancel).await;
        if pending.is_none() {
            break;
        }
    }

    tracing::info!("Push channel stopped");
}
