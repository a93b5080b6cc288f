//! Bridge runtime.
//!
//! The [`Bridge`] owns every relay component and, once spawned, runs the
//! single event loop that connects them:
//!
//! | Source | Handling |
//! |--------|----------|
//! | transport input | `TransportManager::handle_input` |
//! | backend request | `RequestRelay::on_request`, error responses dispatched |
//! | page reply | `RequestRelay::on_page_reply`, responses dispatched |
//! | handle command | connect, fallback setup, shutdown |
//!
//! The loop owns the [`RelayContext`]; nothing else touches it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use grok_bridge::{Bridge, GrokExecutor, TransportState};
//!
//! # async fn example() -> grok_bridge::Result<()> {
//! let bridge = Bridge::builder().port(5001).build()?;
//! bridge
//!     .pages()
//!     .register("https://grok.com/", Arc::new(GrokExecutor::new("sso=...")?));
//!
//! let handle = bridge.spawn();
//! handle.wait_for_state(TransportState::Connected).await?;
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::page::{OriginFilter, PageSessions, ReplyReceiver};
use crate::relay::{Admission, RelayContext, RelayRequest, RequestRelay, ResponseDispatcher};
use crate::transport::{Connector, InputReceiver, ReconnectPolicy, TransportManager, TransportState};

use super::builder::BridgeBuilder;
use super::options::BridgeOptions;

// ============================================================================
// Types
// ============================================================================

/// Commands from a [`BridgeHandle`] (and the request handler) to the loop.
#[derive(Debug)]
pub enum BridgeCommand {
    /// Backend request received by a channel.
    Request(RelayRequest),
    /// Start a primary connect cycle.
    Connect,
    /// Create the fallback channel.
    SetupFallback,
    /// Stop the loop.
    Shutdown,
}

// ============================================================================
// Bridge
// ============================================================================

/// Relay between a backend and page sessions.
///
/// Built with [`Bridge::builder()`]; register page sessions with
/// [`Bridge::pages`], then start it with [`Bridge::spawn`].
pub struct Bridge {
    options: BridgeOptions,
    pages: PageSessions,
    replies: ReplyReceiver,
    manager: TransportManager,
    inputs: InputReceiver,
    relay: RequestRelay,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("options", &self.options)
            .field("page_sessions", &self.pages.len())
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    pub(crate) fn new(
        options: BridgeOptions,
        policy: ReconnectPolicy,
        filter: OriginFilter,
        primary: Arc<dyn Connector>,
        fallback: Option<Arc<dyn Connector>>,
    ) -> Self {
        let (pages, replies) = PageSessions::new();
        let (manager, inputs) = TransportManager::new(policy, primary, fallback);
        let relay = RequestRelay::new(pages.clone(), filter);

        Self {
            options,
            pages,
            replies,
            manager,
            inputs,
            relay,
        }
    }

    /// Returns the options the bridge was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Returns the page session registry.
    #[inline]
    #[must_use]
    pub fn pages(&self) -> &PageSessions {
        &self.pages
    }

    /// Starts the event loop.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> BridgeHandle {
        let Self {
            options,
            pages,
            replies,
            mut manager,
            inputs,
            relay,
        } = self;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(TransportState::Disconnected);

        let request_tx = commands.clone();
        manager.on_inbound_request(move |request| {
            let _ = request_tx.send(BridgeCommand::Request(request));
        });

        let event_loop = EventLoop {
            ctx: RelayContext::new(),
            manager,
            inputs,
            relay,
            replies,
            dispatcher: ResponseDispatcher::new(),
            pages: pages.clone(),
            state_tx,
        };

        info!(host = %options.host, port = options.port, "Bridge started");
        let task = tokio::spawn(event_loop.run(command_rx, options.auto_connect));

        BridgeHandle {
            commands,
            state_rx,
            pages,
            task: Some(task),
        }
    }
}

// ============================================================================
// BridgeHandle
// ============================================================================

/// Handle to a running bridge. Dropping it stops the bridge.
pub struct BridgeHandle {
    commands: mpsc::UnboundedSender<BridgeCommand>,
    state_rx: watch::Receiver<TransportState>,
    pages: PageSessions,
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl BridgeHandle {
    /// Returns the current transport state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.state_rx.borrow()
    }

    /// Returns a receiver notified on every state change.
    #[inline]
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.state_rx.clone()
    }

    /// Waits until the transport reaches `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the bridge stopped first.
    pub async fn wait_for_state(&self, state: TransportState) -> Result<()> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(())
    }

    /// Returns the page session registry.
    #[inline]
    #[must_use]
    pub fn pages(&self) -> &PageSessions {
        &self.pages
    }

    /// Starts a primary connect cycle (no-op unless disconnected).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the bridge stopped.
    pub fn connect(&self) -> Result<()> {
        self.send(BridgeCommand::Connect)
    }

    /// Creates the fallback channel (at most once per bridge).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the bridge stopped.
    pub fn setup_fallback(&self) -> Result<()> {
        self.send(BridgeCommand::SetupFallback)
    }

    /// Stops the bridge and waits for its loop to finish.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(BridgeCommand::Shutdown);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            debug!(error = %e, "Bridge loop ended abnormally");
        }
    }

    fn send(&self, command: BridgeCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::ConnectionClosed)
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(BridgeCommand::Shutdown);
        }
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// State owned by the running loop.
struct EventLoop {
    ctx: RelayContext,
    manager: TransportManager,
    inputs: InputReceiver,
    relay: RequestRelay,
    replies: ReplyReceiver,
    dispatcher: ResponseDispatcher,
    pages: PageSessions,
    state_tx: watch::Sender<TransportState>,
}

impl EventLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<BridgeCommand>, auto_connect: bool) {
        if auto_connect {
            self.manager.connect(&mut self.ctx);
            self.publish_state();
        }

        loop {
            tokio::select! {
                Some(input) = self.inputs.recv() => {
                    self.manager.handle_input(&mut self.ctx, input);
                }

                Some(reply) = self.replies.recv() => {
                    if let Some(response) = self.relay.on_page_reply(&mut self.ctx, reply) {
                        self.dispatcher.dispatch(&mut self.ctx, &mut self.manager, response);
                    }
                }

                command = commands.recv() => match command {
                    Some(BridgeCommand::Request(request)) => {
                        if let Admission::Failed(response) = self.relay.on_request(&mut self.ctx, request) {
                            self.dispatcher.dispatch(&mut self.ctx, &mut self.manager, response);
                        }
                    }
                    Some(BridgeCommand::Connect) => {
                        self.manager.connect(&mut self.ctx);
                    }
                    Some(BridgeCommand::SetupFallback) => {
                        self.manager.setup_fallback(&mut self.ctx);
                    }
                    Some(BridgeCommand::Shutdown) | None => break,
                },
            }

            self.publish_state();
        }

        self.manager.shutdown();
        self.pages.close_all();
        info!("Bridge stopped");
    }

    fn publish_state(&self) {
        let state = self.ctx.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use serde_json::json;

    use crate::page::{ChunkStream, PageExecutor};
    use crate::protocol::Envelope;
    use crate::transport::mock::{Outcome, ScriptedConnector};
    use crate::transport::{ChannelEvent, ChannelKind};

    struct TokenExecutor;

    #[async_trait]
    impl PageExecutor for TokenExecutor {
        async fn execute(&self, _request: &RelayRequest) -> Result<ChunkStream> {
            let chunks: Vec<Result<Bytes>> = ["Hel", "lo"]
                .iter()
                .map(|token| {
                    let line = format!("{}\n", json!({"result": {"response": {"token": token}}}));
                    Ok(Bytes::from(line))
                })
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }

    struct PendingExecutor;

    #[async_trait]
    impl PageExecutor for PendingExecutor {
        async fn execute(&self, _request: &RelayRequest) -> Result<ChunkStream> {
            Ok(stream::pending().boxed())
        }
    }

    async fn wait_for_sent(primary: &ScriptedConnector) -> Vec<Envelope> {
        wait_for_sent_count(primary, 1).await
    }

    async fn wait_for_sent_count(primary: &ScriptedConnector, count: usize) -> Vec<Envelope> {
        for _ in 0..100 {
            if let Some(channel) = primary.last_channel() {
                let sent = channel.sent();
                if sent.len() >= count {
                    return sent;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("expected {count} sent envelopes");
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_round_trip() {
        let primary = ScriptedConnector::new(ChannelKind::Primary, []);
        let bridge = Bridge::builder()
            .primary_connector(primary.clone())
            .build()
            .expect("bridge");
        bridge.pages().register("https://grok.com/", Arc::new(TokenExecutor));

        let handle = bridge.spawn();
        handle
            .wait_for_state(TransportState::Connected)
            .await
            .expect("connected");

        primary
            .last_channel()
            .expect("socket")
            .emit(ChannelEvent::Request(json!("Say hello")));

        let sent = wait_for_sent(&primary).await;
        assert_eq!(
            sent,
            vec![Envelope::new("response", json!({"text": "Hello", "isError": false}))]
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_page_session_answers_with_error() {
        let primary = ScriptedConnector::new(ChannelKind::Primary, []);
        let bridge = Bridge::builder()
            .primary_connector(primary.clone())
            .build()
            .expect("bridge");

        let handle = bridge.spawn();
        handle
            .wait_for_state(TransportState::Connected)
            .await
            .expect("connected");

        primary
            .last_channel()
            .expect("socket")
            .emit(ChannelEvent::Request(json!("hi")));

        let sent = wait_for_sent(&primary).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data["isError"], true);
        assert!(
            sent[0].data["text"]
                .as_str()
                .is_some_and(|text| text.contains("Please open grok.com and log in"))
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_busy_session_answers_and_reopens_gate() {
        let primary = ScriptedConnector::new(ChannelKind::Primary, []);
        let bridge = Bridge::builder()
            .primary_connector(primary.clone())
            .build()
            .expect("bridge");
        let busy = bridge.pages().register("https://grok.com/", Arc::new(PendingExecutor));

        let handle = bridge.spawn();
        handle
            .wait_for_state(TransportState::Connected)
            .await
            .expect("connected");
        let socket = primary.last_channel().expect("socket");

        socket.emit(ChannelEvent::Request(json!("one")));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(handle.pages().unregister(busy));

        let sent = wait_for_sent_count(&primary, 1).await;
        assert_eq!(sent[0].data["isError"], true);
        assert_eq!(
            sent[0].data["text"],
            "Error communicating with Grok: Page session closed"
        );

        handle.pages().register("https://grok.com/", Arc::new(TokenExecutor));
        socket.emit(ChannelEvent::Request(json!("two")));

        let sent = wait_for_sent_count(&primary, 2).await;
        assert_eq!(
            sent[1],
            Envelope::new("response", json!({"text": "Hello", "isError": false}))
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_connect_disabled_waits_for_connect() {
        let primary = ScriptedConnector::new(ChannelKind::Primary, []);
        let bridge = Bridge::builder()
            .auto_connect(false)
            .primary_connector(primary.clone())
            .build()
            .expect("bridge");

        let handle = bridge.spawn();
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        assert_eq!(handle.state(), TransportState::Disconnected);
        assert_eq!(primary.connects(), 0);

        handle.connect().expect("connect");
        handle
            .wait_for_state(TransportState::Connected)
            .await
            .expect("connected");

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_becomes_active_after_threshold() {
        let primary = ScriptedConnector::with_default(ChannelKind::Primary, [], Outcome::Refuse);
        let fallback = ScriptedConnector::new(ChannelKind::Fallback, []);
        let bridge = Bridge::builder()
            .fallback_threshold(2)
            .primary_connector(primary.clone())
            .fallback_connector(fallback.clone())
            .build()
            .expect("bridge");

        let handle = bridge.spawn();
        handle
            .wait_for_state(TransportState::FallbackActive)
            .await
            .expect("fallback");

        assert_eq!(fallback.connects(), 1);
        assert_eq!(primary.connects(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_primary() {
        let primary = ScriptedConnector::new(ChannelKind::Primary, []);
        let bridge = Bridge::builder()
            .primary_connector(primary.clone())
            .build()
            .expect("bridge");

        let handle = bridge.spawn();
        handle
            .wait_for_state(TransportState::Connected)
            .await
            .expect("connected");
        handle.shutdown().await;

        assert!(primary.last_channel().expect("socket").is_closed());
    }
}
