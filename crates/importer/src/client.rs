//! WebSocket client for the push channel.
//!
//! [`PushClient`] holds the endpoint configuration. Call
//! [`PushClient::connect`] to open the WebSocket, run the STOMP
//! `CONNECT`/`CONNECTED` handshake and subscribe to the update topics,
//! yielding a live [`PushConnection`].

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::messages::{TOPIC_IMPORT_PROGRESS, TOPIC_UPDATES};
use crate::stomp::{self, Command, Frame};

/// How long the server gets to answer `CONNECT`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub type PushStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the push endpoint.
#[derive(Debug, Clone)]
pub struct PushClient {
    ws_url: String,
    topics: Vec<String>,
}

/// A live, subscribed push connection.
pub struct PushConnection {
    /// `server` header of the `CONNECTED` frame, if sent.
    pub server: Option<String>,
    pub ws_stream: PushStream,
}

impl PushClient {
    /// Client for `ws_url`, e.g. `ws://localhost:8080/ws/websocket`,
    /// subscribing to the record and import progress topics.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            topics: vec![TOPIC_UPDATES.to_string(), TOPIC_IMPORT_PROGRESS.to_string()],
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub async fn connect(&self) -> Result<PushConnection, PushClientError> {
        let host = stomp_host(&self.ws_url)?;

        let (mut ws_stream, _response) = connect_async(self.ws_url.as_str()).await.map_err(|e| {
            PushClientError::Connection(format!(
                "Failed to connect to push channel at {}: {e}",
                self.ws_url
            ))
        })?;

        let server = handshake(&mut ws_stream, &host, &self.topics).await?;

        tracing::info!(
            server = server.as_deref().unwrap_or("unknown"),
            topics = self.topics.len(),
            "Connected to push channel at {}",
            self.ws_url,
        );

        Ok(PushConnection { server, ws_stream })
    }
}

/// Run the STOMP handshake on an open WebSocket and subscribe to `topics`.
///
/// Subscriptions are numbered `sub-0`, `sub-1`, ... in topic order.
/// Returns the server's `server` header.
pub async fn handshake<S>(
    ws_stream: &mut WebSocketStream<S>,
    host: &str,
    topics: &[String],
) -> Result<Option<String>, PushClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_frame(ws_stream, &Frame::connect(host)).await?;

    let connected = tokio::time::timeout(HANDSHAKE_TIMEOUT, await_connected(ws_stream))
        .await
        .map_err(|_| PushClientError::Protocol("Timed out waiting for CONNECTED".into()))??;

    for (i, topic) in topics.iter().enumerate() {
        send_frame(ws_stream, &Frame::subscribe(&format!("sub-{i}"), topic)).await?;
        tracing::debug!(topic = %topic, "Subscribed");
    }

    Ok(connected.header("server").map(str::to_string))
}

async fn send_frame<S>(ws_stream: &mut WebSocketStream<S>, frame: &Frame) -> Result<(), PushClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws_stream
        .send(Message::Text(frame.encode()))
        .await
        .map_err(|e| PushClientError::Protocol(format!("Failed to send {}: {e}", frame.command)))
}

async fn await_connected<S>(ws_stream: &mut WebSocketStream<S>) -> Result<Frame, PushClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = ws_stream.next().await {
        let text = match msg.map_err(|e| PushClientError::Protocol(e.to_string()))? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                return Err(PushClientError::Connection(format!(
                    "Closed during handshake: {frame:?}"
                )))
            }
            _ => continue,
        };

        let frames = stomp::decode(&text).map_err(|e| PushClientError::Protocol(e.to_string()))?;
        for frame in frames {
            match frame.command {
                Command::Connected => return Ok(frame),
                Command::Error => {
                    let message = frame.header("message").unwrap_or(frame.body.as_str());
                    return Err(PushClientError::Protocol(format!(
                        "Server rejected CONNECT: {message}"
                    )));
                }
                other => tracing::debug!(command = %other, "Ignoring frame before CONNECTED"),
            }
        }
    }

    Err(PushClientError::Connection(
        "Stream ended during handshake".into(),
    ))
}

/// The STOMP `host` header: the host part of the WebSocket URL.
fn stomp_host(ws_url: &str) -> Result<String, PushClientError> {
    reqwest::Url::parse(ws_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .ok_or_else(|| PushClientError::Connection(format!("Invalid push URL: {ws_url}")))
}

/// Errors that can occur when opening the push channel.
#[derive(Debug, thiserror::Error)]
pub enum PushClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The STOMP handshake failed or the server refused it.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
