//! Channel abstraction shared by the primary socket and the fallback frame.
//!
//! TransportManager only sees [`Channel`] and [`Connector`]; the concrete
//! implementations live in `socket` and `frame`. Inbound events reach the
//! manager through the [`ChannelSink`] handed to [`Connector::connect`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::Envelope;

// ============================================================================
// ChannelKind
// ============================================================================

/// Which logical channel an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Persistent socket to the backend.
    Primary,
    /// In-page fallback frame.
    Fallback,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

// ============================================================================
// ChannelEvent
// ============================================================================

/// Lifecycle or inbound event reported by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Channel reached the backend.
    Connected,
    /// Established channel went away.
    Disconnected(String),
    /// Non-fatal channel error.
    Error(String),
    /// Backend request payload.
    Request(Value),
}

/// A [`ChannelEvent`] tagged with its channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelNotice {
    /// Originating channel.
    pub kind: ChannelKind,
    /// The event.
    pub event: ChannelEvent,
}

// ============================================================================
// ChannelSink
// ============================================================================

/// Callback through which channels report events.
#[derive(Clone)]
pub struct ChannelSink {
    post: Arc<dyn Fn(ChannelNotice) + Send + Sync>,
}

impl ChannelSink {
    /// Creates a sink from a callback.
    pub fn new<F>(post: F) -> Self
    where
        F: Fn(ChannelNotice) + Send + Sync + 'static,
    {
        Self {
            post: Arc::new(post),
        }
    }

    /// Creates a sink that forwards into an unbounded channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChannelNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self::new(move |notice| {
            let _ = tx.send(notice);
        });
        (sink, rx)
    }

    /// Reports one event.
    #[inline]
    pub fn post(&self, kind: ChannelKind, event: ChannelEvent) {
        (self.post)(ChannelNotice { kind, event });
    }
}

impl fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink").finish_non_exhaustive()
    }
}

// ============================================================================
// Channel
// ============================================================================

/// An open logical channel to the backend.
///
/// `send` only queues; delivery happens on the channel's own task.
pub trait Channel: Send + Sync {
    /// Which channel this is.
    fn kind(&self) -> ChannelKind;

    /// Queues an envelope for the backend.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if the channel task is gone
    /// - [`Error::Protocol`](crate::Error::Protocol) if the channel cannot carry the event
    fn send(&self, envelope: Envelope) -> Result<()>;

    /// Closes the channel. Idempotent.
    fn close(&self);

    /// Returns `true` while the channel task is alive.
    fn is_open(&self) -> bool;
}

// ============================================================================
// Connector
// ============================================================================

/// Opens channels of one kind.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a channel that reports its events to `sink`.
    ///
    /// # Errors
    ///
    /// Returns a connection error when the channel cannot be opened.
    async fn connect(&self, sink: ChannelSink) -> Result<Arc<dyn Channel>>;
}

// ============================================================================
// Tests
// ============================================================================
