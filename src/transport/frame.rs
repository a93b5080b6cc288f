//! In-page fallback frame channel.
//!
//! The frame is a separate task that owns its own socket to the fallback URL
//! and talks to the relay only through [`FrameMessage`]s:
//!
//! ```text
//! relay ──sendResponse──▶ frame ──response──▶ backend
//! relay ◀──connected/error/request── frame ◀──request── backend
//! ```
//!
//! [`FrameConnector::connect`] returns as soon as the frame exists; the
//! frame reports `connected` once its socket is up. After `attempts`
//! consecutive failures the frame gives up and reports a disconnect.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{Envelope, FrameMessage, RESPONSE_EVENT};

use super::channel::{Channel, ChannelEvent, ChannelKind, ChannelNotice, ChannelSink, Connector};
use super::machine::ReconnectPolicy;

// ============================================================================
// FrameChannel
// ============================================================================

/// Relay-side handle of the fallback frame.
pub struct FrameChannel {
    /// Messages posted into the frame.
    outbound: mpsc::UnboundedSender<FrameMessage>,
    /// Frame task.
    abort: AbortHandle,
}

impl Channel for FrameChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Fallback
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        if !envelope.is_response() {
            return Err(Error::protocol(format!(
                "fallback frame cannot carry '{}' events",
                envelope.event
            )));
        }

        self.outbound
            .send(FrameMessage::SendResponse(envelope.data))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        self.abort.abort();
    }

    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

impl Drop for FrameChannel {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

// ============================================================================
// FrameConnector
// ============================================================================

/// Creates the fallback frame.
pub struct FrameConnector {
    /// Opens the frame's own backend socket.
    backend: Arc<dyn Connector>,
    attempts: u32,
    delay: Duration,
    attempt_timeout: Duration,
}

impl FrameConnector {
    /// Creates a frame connector using `backend` for the frame's socket.
    #[must_use]
    pub fn new(backend: Arc<dyn Connector>, policy: &ReconnectPolicy) -> Self {
        Self {
            backend,
            attempts: policy.attempts.max(1),
            delay: policy.delay,
            attempt_timeout: policy.attempt_timeout,
        }
    }
}

#[async_trait]
impl Connector for FrameConnector {
    async fn connect(&self, sink: ChannelSink) -> Result<Arc<dyn Channel>> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let frame = Frame {
            backend: Arc::clone(&self.backend),
            attempts: self.attempts,
            delay: self.delay,
            attempt_timeout: self.attempt_timeout,
            sink,
            outbound_rx,
            queued: VecDeque::new(),
        };

        let handle = tokio::spawn(frame.run());
        debug!("Fallback frame created");

        Ok(Arc::new(FrameChannel {
            outbound,
            abort: handle.abort_handle(),
        }))
    }
}

// ============================================================================
// Frame
// ============================================================================

/// Frame-side state, owned by the frame task.
struct Frame {
    backend: Arc<dyn Connector>,
    attempts: u32,
    delay: Duration,
    attempt_timeout: Duration,
    /// Relay sink.
    sink: ChannelSink,
    outbound_rx: mpsc::UnboundedReceiver<FrameMessage>,
    /// Responses posted while the frame had no socket.
    queued: VecDeque<Value>,
}

/// Why the serve loop ended.
enum ServeEnd {
    /// Socket dropped; reconnect.
    Dropped,
    /// Relay handle gone; stop.
    Detached,
}

impl Frame {
    async fn run(mut self) {
        let mut failures = 0u32;

        loop {
            let (socket_sink, socket_rx) = ChannelSink::channel();
            let attempt = tokio::time::timeout(self.attempt_timeout, self.backend.connect(socket_sink));

            match attempt.await {
                Ok(Ok(socket)) => {
                    failures = 0;
                    info!("Fallback frame connected");
                    self.post(FrameMessage::Connected);

                    let end = self.serve(&*socket, socket_rx).await;
                    socket.close();
                    if matches!(end, ServeEnd::Detached) {
                        return;
                    }
                }
                Ok(Err(e)) => {
                    failures += 1;
                    self.post(FrameMessage::Error(e.to_string()));
                }
                Err(_) => {
                    failures += 1;
                    let e = Error::connection_timeout(self.attempt_timeout.as_millis() as u64);
                    self.post(FrameMessage::Error(e.to_string()));
                }
            }

            if failures >= self.attempts {
                warn!(attempts = failures, "Fallback frame gave up");
                self.sink.post(
                    ChannelKind::Fallback,
                    ChannelEvent::Disconnected(format!("gave up after {failures} attempts")),
                );
                return;
            }

            if !self.wait(self.delay).await {
                return;
            }
        }
    }

    /// Relays traffic between the relay and a connected socket.
    async fn serve(
        &mut self,
        socket: &dyn Channel,
        mut socket_rx: mpsc::UnboundedReceiver<ChannelNotice>,
    ) -> ServeEnd {
        while let Some(data) = self.queued.pop_front() {
            if let Err(e) = socket.send(Envelope::new(RESPONSE_EVENT, data.clone())) {
                self.queued.push_front(data);
                self.post(FrameMessage::Error(e.to_string()));
                return ServeEnd::Dropped;
            }
        }

        loop {
            tokio::select! {
                notice = socket_rx.recv() => match notice.map(|n| n.event) {
                    Some(ChannelEvent::Request(data)) => self.post(FrameMessage::Request(data)),
                    Some(ChannelEvent::Error(reason)) => self.post(FrameMessage::Error(reason)),
                    Some(ChannelEvent::Connected) => {}
                    Some(ChannelEvent::Disconnected(reason)) => {
                        self.post(FrameMessage::Error(reason));
                        return ServeEnd::Dropped;
                    }
                    None => return ServeEnd::Dropped,
                },

                message = self.outbound_rx.recv() => match message {
                    Some(FrameMessage::SendResponse(data)) => {
                        if let Err(e) = socket.send(Envelope::new(RESPONSE_EVENT, data.clone())) {
                            self.queued.push_back(data);
                            self.post(FrameMessage::Error(e.to_string()));
                            return ServeEnd::Dropped;
                        }
                    }
                    Some(other) => debug!(?other, "Frame ignoring relay message"),
                    None => return ServeEnd::Detached,
                },
            }
        }
    }

    /// Sleeps while still accepting responses. Returns `false` if detached.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return true,
                message = self.outbound_rx.recv() => match message {
                    Some(FrameMessage::SendResponse(data)) => self.queued.push_back(data),
                    Some(_) => {}
                    None => return false,
                },
            }
        }
    }

    /// Posts a frame → relay message.
    fn post(&self, message: FrameMessage) {
        if let Some(event) = message.into_event() {
            self.sink.post(ChannelKind::Fallback, event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
