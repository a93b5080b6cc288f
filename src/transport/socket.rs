//! WebSocket channel to the backend.
//!
//! # Event Loop
//!
//! Each [`SocketChannel`] spawns a tokio task that handles:
//!
//! - Incoming envelopes from the backend (`request` events)
//! - Outgoing envelopes queued through [`Channel::send`]
//! - Reporting `disconnect` / `error` to the channel sink
//!
//! A shutdown requested through [`Channel::close`] is not reported as a
//! disconnect.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{from_str, to_string};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Envelope;

use super::channel::{Channel, ChannelEvent, ChannelKind, ChannelSink, Connector};

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Send an envelope.
    Send(Envelope),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// SocketChannel
// ============================================================================

/// WebSocket channel carrying backend envelopes.
pub struct SocketChannel {
    /// Which logical channel this socket serves.
    kind: ChannelKind,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl SocketChannel {
    /// Creates a channel from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn new<S>(ws_stream: WebSocketStream<S>, kind: ChannelKind, sink: ChannelSink) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_event_loop(ws_stream, command_rx, kind, sink));

        Self { kind, command_tx }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
        kind: ChannelKind,
        sink: ChannelSink,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming envelopes from the backend
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, kind, &sink);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(%kind, "WebSocket closed by remote");
                            sink.post(kind, ChannelEvent::Disconnected("closed by remote".into()));
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(%kind, error = %e, "WebSocket error");
                            sink.post(kind, ChannelEvent::Disconnected(e.to_string()));
                            break;
                        }

                        None => {
                            debug!(%kind, "WebSocket stream ended");
                            sink.post(kind, ChannelEvent::Disconnected("stream ended".into()));
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Envelopes queued by the manager
                command = command_rx.recv() => {
                    match command {
                        Some(SocketCommand::Send(envelope)) => {
                            let json = match to_string(&envelope) {
                                Ok(json) => json,
                                Err(e) => {
                                    sink.post(kind, ChannelEvent::Error(e.to_string()));
                                    continue;
                                }
                            };

                            if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                                warn!(%kind, error = %e, "Failed to send envelope");
                                sink.post(kind, ChannelEvent::Error(e.to_string()));
                            } else {
                                trace!(%kind, event = %envelope.event, "Envelope sent");
                            }
                        }

                        Some(SocketCommand::Shutdown) | None => {
                            debug!(%kind, "Socket shutdown");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!(%kind, "Socket event loop terminated");
    }

    /// Handles an incoming text frame from the backend.
    fn handle_incoming_message(text: &str, kind: ChannelKind, sink: &ChannelSink) {
        let envelope = match from_str::<Envelope>(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%kind, error = %e, "Failed to parse incoming envelope");
                return;
            }
        };

        if envelope.is_request() {
            sink.post(kind, ChannelEvent::Request(envelope.data));
        } else {
            debug!(%kind, event = %envelope.event, "Ignoring backend event");
        }
    }
}

impl Channel for SocketChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Send(envelope))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }

    fn is_open(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

// ============================================================================
// SocketConnector
// ============================================================================

/// Opens [`SocketChannel`]s to a fixed URL.
#[derive(Debug, Clone)]
pub struct SocketConnector {
    /// Backend socket URL.
    url: Url,
    /// Kind reported by opened channels.
    kind: ChannelKind,
}

impl SocketConnector {
    /// Creates a connector for `url`.
    #[inline]
    #[must_use]
    pub fn new(url: Url, kind: ChannelKind) -> Self {
        Self { url, kind }
    }

    /// Returns the target URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for SocketConnector {
    async fn connect(&self, sink: ChannelSink) -> Result<Arc<dyn Channel>> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::connection(format!("{}: {e}", self.url)))?;

        info!(kind = %self.kind, url = %self.url, "WebSocket connection established");

        Ok(Arc::new(SocketChannel::new(ws_stream, self.kind, sink)))
    }
}

// ============================================================================
// Tests
// ============================================================================
