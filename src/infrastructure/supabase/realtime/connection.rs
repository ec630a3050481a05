use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use super::constants::{CONNECTION_TIMEOUT, HEARTBEAT_INTERVAL, JOIN_TIMEOUT};
use super::error::{RealtimeError, RealtimeResult};
use super::heartbeat::{HeartbeatManager, Outbound};
use super::payloads::{Frame, PhoenixMessage, decode_frame};
use crate::domain::ports::RealtimeEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;
type WsReader = SplitStream<WsStream>;

/// One websocket connection to the realtime server.
pub struct WebSocketConnection {
    writer: WsWriter,
    reader: WsReader,
}

impl WebSocketConnection {
    pub async fn connect(url: &str) -> RealtimeResult<Self> {
        let (ws_stream, _) = timeout(CONNECTION_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| RealtimeError::timeout("connection"))?
            .map_err(|e| RealtimeError::connection_failed(e.to_string()))?;

        let (writer, reader) = ws_stream.split();
        Ok(Self { writer, reader })
    }

    pub async fn send(&mut self, message: &PhoenixMessage) -> RealtimeResult<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| RealtimeError::serialization(e.to_string()))?;
        self.writer
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|e| RealtimeError::websocket(e.to_string()))
    }

    /// Waits for the next text frame, answering pings along the way.
    pub async fn next_text(&mut self) -> RealtimeResult<String> {
        loop {
            match self.reader.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(WsMessage::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map_err(|e| RealtimeError::protocol(format!("non-UTF-8 frame: {e}")));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame.map_or_else(
                        || (1000, "Normal closure".to_string()),
                        |f| (f.code.into(), f.reason.to_string()),
                    );
                    return Err(RealtimeError::ConnectionClosed { code, reason });
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = self.writer.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(e)) => return Err(RealtimeError::websocket(e.to_string())),
                None => {
                    return Err(RealtimeError::ConnectionClosed {
                        code: 1000,
                        reason: "Stream ended".to_string(),
                    });
                }
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.writer.close().await;
        debug!("WebSocket connection closed");
    }
}

/// How a joined session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// Stopped on request or because nobody listens anymore.
    Stopped,
    /// The session failed after the channel was joined.
    Dropped(RealtimeError),
}

/// Drives a single connection: join, then forward changes until it ends.
pub struct RealtimeSession<'a> {
    pub url: &'a str,
    pub topic: &'a str,
    pub access_token: &'a str,
    pub event_tx: &'a mpsc::UnboundedSender<RealtimeEvent>,
    pub stop: &'a Notify,
}

impl RealtimeSession<'_> {
    /// Connects and joins the channel.
    ///
    /// # Errors
    /// Returns error if the connection or the join fails; nothing was emitted in that case.
    pub async fn run(&self) -> RealtimeResult<SessionEnd> {
        let reference = Arc::new(AtomicU64::new(0));
        let mut connection = WebSocketConnection::connect(self.url).await?;

        let join_ref = reference.fetch_add(1, Ordering::SeqCst) + 1;
        connection
            .send(&PhoenixMessage::join(self.topic, self.access_token, join_ref))
            .await?;
        self.await_join(&mut connection).await?;

        info!(topic = self.topic, "Realtime channel joined");
        if self.event_tx.send(RealtimeEvent::Connected).is_err() {
            connection.close().await;
            return Ok(SessionEnd::Stopped);
        }

        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let heartbeat = HeartbeatManager::new(HEARTBEAT_INTERVAL, reference.clone());
        let _heartbeat_handle = heartbeat.start(outbound_tx);

        let end = loop {
            tokio::select! {
                () = self.stop.notified() => {
                    let leave_ref = reference.fetch_add(1, Ordering::SeqCst) + 1;
                    let _ = connection.send(&PhoenixMessage::leave(self.topic, leave_ref)).await;
                    break SessionEnd::Stopped;
                }
                outbound = outbound_rx.recv() => match outbound {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = connection.send(&frame).await {
                            break SessionEnd::Dropped(e);
                        }
                    }
                    Some(Outbound::AckMissed) => {
                        break SessionEnd::Dropped(RealtimeError::HeartbeatTimeout);
                    }
                    None => break SessionEnd::Dropped(RealtimeError::ChannelClosed),
                },
                text = connection.next_text() => {
                    let text = match text {
                        Ok(text) => text,
                        Err(e) => break SessionEnd::Dropped(e),
                    };
                    match decode_frame(&text, self.topic) {
                        Ok(Frame::Change(event)) => {
                            trace!(?event, "Realtime change");
                            if self.event_tx.send(event).is_err() {
                                debug!("Realtime receiver dropped");
                                break SessionEnd::Stopped;
                            }
                        }
                        Ok(Frame::HeartbeatReply) => heartbeat.acknowledge(),
                        Ok(Frame::ChannelError(message)) => {
                            break SessionEnd::Dropped(RealtimeError::ChannelError { message });
                        }
                        Ok(Frame::ChannelClosed) => {
                            break SessionEnd::Dropped(RealtimeError::ConnectionClosed {
                                code: 1000,
                                reason: "channel closed by server".to_string(),
                            });
                        }
                        Ok(Frame::JoinReply { .. } | Frame::Ignored) => {}
                        Err(e) => warn!(error = %e, "Skipping undecodable realtime frame"),
                    }
                }
            }
        };

        heartbeat.stop();
        connection.close().await;
        Ok(end)
    }

    async fn await_join(&self, connection: &mut WebSocketConnection) -> RealtimeResult<()> {
        let deadline = Instant::now() + JOIN_TIMEOUT;
        loop {
            let text = timeout_at(deadline, connection.next_text())
                .await
                .map_err(|_| RealtimeError::timeout("channel join"))??;

            match decode_frame(&text, self.topic) {
                Ok(Frame::JoinReply { ok: true, .. }) => return Ok(()),
                Ok(Frame::JoinReply { ok: false, message }) => {
                    return Err(RealtimeError::JoinRejected { message });
                }
                Ok(Frame::ChannelError(message)) => {
                    return Err(RealtimeError::ChannelError { message });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping undecodable frame while joining"),
            }
        }
    }
}
