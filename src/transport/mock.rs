//! In-memory channels for transport tests.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::protocol::Envelope;

use super::channel::{Channel, ChannelEvent, ChannelKind, ChannelSink, Connector};

// ============================================================================
// MockChannel
// ============================================================================

/// Channel that records what was sent.
pub(crate) struct MockChannel {
    kind: ChannelKind,
    sink: ChannelSink,
    sent: Mutex<Vec<Envelope>>,
    closed: AtomicBool,
}

impl MockChannel {
    pub(crate) fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reports an event as if it came from the backend.
    pub(crate) fn emit(&self, event: ChannelEvent) {
        self.sink.post(self.kind, event);
    }
}

impl Channel for MockChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.sent.lock().push(envelope);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

// ============================================================================
// ScriptedConnector
// ============================================================================

/// Outcome of one scripted connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Return a [`MockChannel`].
    Accept,
    /// Fail with a connection error.
    Refuse,
    /// Never complete.
    Hang,
}

/// Connector that follows a script, then repeats a default outcome.
pub(crate) struct ScriptedConnector {
    kind: ChannelKind,
    script: Mutex<VecDeque<Outcome>>,
    default: Outcome,
    connects: AtomicUsize,
    channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl ScriptedConnector {
    pub(crate) fn new(kind: ChannelKind, script: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Self::with_default(kind, script, Outcome::Accept)
    }

    pub(crate) fn with_default(
        kind: ChannelKind,
        script: impl IntoIterator<Item = Outcome>,
        default: Outcome,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script.into_iter().collect()),
            default,
            connects: AtomicUsize::new(0),
            channels: Mutex::new(Vec::new()),
        })
    }

    /// Number of `connect` calls so far.
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Channels handed out so far, oldest first.
    pub(crate) fn channels(&self) -> Vec<Arc<MockChannel>> {
        self.channels.lock().clone()
    }

    /// Most recent channel.
    pub(crate) fn last_channel(&self) -> Option<Arc<MockChannel>> {
        self.channels.lock().last().cloned()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, sink: ChannelSink) -> Result<Arc<dyn Channel>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front().unwrap_or(self.default);

        match outcome {
            Outcome::Accept => {
                let channel = Arc::new(MockChannel {
                    kind: self.kind,
                    sink,
                    sent: Mutex::new(Vec::new()),
                    closed: AtomicBool::new(false),
                });
                self.channels.lock().push(Arc::clone(&channel));

                // A fallback frame announces itself once it is up.
                if self.kind == ChannelKind::Fallback {
                    let announcer = Arc::clone(&channel);
                    tokio::spawn(async move { announcer.emit(ChannelEvent::Connected) });
                }
                Ok(channel)
            }
            Outcome::Refuse => Err(Error::connection("refused")),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
