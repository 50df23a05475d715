//! Push channel message processing loop.
//!
//! Reads WebSocket messages from a subscribed connection, decodes the
//! STOMP frames they carry and forwards each `MESSAGE` body as a typed
//! [`UpdateEvent`] to the tracker.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::messages::{parse_update, UpdateEvent};
use crate::stomp::{self, Command, Frame};

/// Why [`process_frames`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connection closed or failed; reconnecting makes sense.
    Closed,
    /// The server sent a STOMP `ERROR` frame, which ends the session.
    ServerError,
    /// The cancellation token fired; `DISCONNECT` was sent.
    Cancelled,
    /// Nobody consumes updates any more.
    ReceiverDropped,
}

/// Process messages from a push connection until it ends.
///
/// Malformed frames and unparseable notification bodies are logged and
/// skipped; they never end the session.
pub async fn process_frames<S>(
    ws_stream: &mut WebSocketStream<S>,
    updates: &mpsc::Sender<UpdateEvent>,
    cancel: &CancellationToken,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                disconnect(ws_stream).await;
                return SessionEnd::Cancelled;
            }
            msg = ws_stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                if let Some(end) = handle_text_message(&text, updates).await {
                    return end;
                }
            }
            Some(Ok(Message::Binary(data))) => {
                tracing::trace!(len = data.len(), "Ignoring binary message");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "Push channel closed by server");
                return SessionEnd::Closed;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "WebSocket receive error");
                return SessionEnd::Closed;
            }
            None => return SessionEnd::Closed,
        }
    }
}

/// Dispatch the frames of one text message.
async fn handle_text_message(
    text: &str,
    updates: &mpsc::Sender<UpdateEvent>,
) -> Option<SessionEnd> {
    let frames = match stomp::decode(text) {
        Ok(frames) => frames,
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to decode STOMP frame");
            return None;
        }
    };

    for frame in frames {
        match frame.command {
            Command::Message => {
                let destination = frame.header("destination").unwrap_or_default();
                match parse_update(&frame.body) {
                    Ok(event) => {
                        if updates.send(event).await.is_err() {
                            tracing::debug!("Update receiver dropped");
                            return Some(SessionEnd::ReceiverDropped);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            destination,
                            error = %e,
                            raw_message = %frame.body,
                            "Failed to parse push notification",
                        );
                    }
                }
            }
            Command::Error => {
                tracing::error!(
                    reason = frame.header("message").unwrap_or_default(),
                    body = %frame.body,
                    "Push channel reported an error",
                );
                return Some(SessionEnd::ServerError);
            }
            Command::Receipt => {
                tracing::debug!(receipt = frame.header("receipt-id").unwrap_or_default(), "Receipt");
            }
            other => {
                tracing::debug!(command = %other, "Ignoring unexpected frame");
            }
        }
    }
    None
}

/// Best-effort `DISCONNECT` followed by a WebSocket close.
async fn disconnect<S>(ws_stream: &mut WebSocketStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = Frame::disconnect("disconnect-0");
    if let Err(e) = ws_stream.send(Message::Text(frame.encode())).await {
        tracing::debug!(error = %e, "Failed to send DISCONNECT");
    }
    let _ = ws_stream.close(None).await;
}
