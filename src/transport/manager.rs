//! Transport manager.
//!
//! Owns the primary and fallback channels, the retry and reconnect timers and
//! the sends deferred while disconnected. Every decision is delegated to
//! [`TransportMachine`]; the manager only performs the resulting
//! [`Action`]s.
//!
//! Everything asynchronous (connect attempts, timers, channel events) comes
//! back as a [`ManagerInput`] on the receiver returned by
//! [`TransportManager::new`], which the owning loop feeds to
//! [`TransportManager::handle_input`].

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::protocol::Envelope;
use crate::relay::{RelayContext, RelayRequest};

use super::channel::{Channel, ChannelEvent, ChannelKind, ChannelNotice, ChannelSink, Connector};
use super::machine::{Action, ReconnectPolicy, Transition, TransportEvent, TransportMachine};
use super::scheduler::{ScheduledTask, Scheduler, TimerKind};
use super::state::TransportState;

// ============================================================================
// Types
// ============================================================================

/// Asynchronous input for [`TransportManager::handle_input`].
pub enum ManagerInput {
    /// A primary connect attempt finished.
    Attempt(Result<Arc<dyn Channel>>),
    /// The fallback channel was created (or could not be).
    FallbackOpened(Result<Arc<dyn Channel>>),
    /// A channel reported an event.
    Notice(ChannelNotice),
    /// A timer fired.
    Timer(TimerKind),
}

/// Receiver of [`ManagerInput`]s.
pub type InputReceiver = mpsc::UnboundedReceiver<ManagerInput>;

/// Callback for backend requests.
pub type RequestHandler = Box<dyn Fn(RelayRequest) + Send + Sync>;

/// Result of [`TransportManager::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the active channel.
    Sent,
    /// Queued until the next successful connect.
    Deferred,
}

// ============================================================================
// TransportManager
// ============================================================================

/// Maintains exactly one authoritative channel to the backend.
pub struct TransportManager {
    machine: TransportMachine,
    primary_connector: Arc<dyn Connector>,
    fallback_connector: Option<Arc<dyn Connector>>,

    primary: Option<Arc<dyn Channel>>,
    fallback: Option<Arc<dyn Channel>>,

    /// Sends waiting for the next connect.
    deferred: VecDeque<Envelope>,

    retry_timer: Option<ScheduledTask>,
    reconnect_timer: Option<ScheduledTask>,
    scheduler: Scheduler<ManagerInput>,

    input_tx: mpsc::UnboundedSender<ManagerInput>,
    request_handler: Option<RequestHandler>,
}

impl TransportManager {
    /// Creates a manager and the receiver its inputs arrive on.
    ///
    /// Without a fallback connector the fallback is never opened.
    #[must_use]
    pub fn new(
        mut policy: ReconnectPolicy,
        primary_connector: Arc<dyn Connector>,
        fallback_connector: Option<Arc<dyn Connector>>,
    ) -> (Self, InputReceiver) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        policy.fallback_enabled &= fallback_connector.is_some();

        let manager = Self {
            machine: TransportMachine::new(policy),
            primary_connector,
            fallback_connector,
            primary: None,
            fallback: None,
            deferred: VecDeque::new(),
            retry_timer: None,
            reconnect_timer: None,
            scheduler: Scheduler::new(input_tx.clone()),
            input_tx,
            request_handler: None,
        };

        (manager, input_rx)
    }

    // ========================================================================
    // Public API
    // ========================================================================

    /// Returns the current transport state.
    #[inline]
    #[must_use]
    pub fn current_state(&self, ctx: &RelayContext) -> TransportState {
        ctx.state()
    }

    /// Registers the callback receiving backend requests.
    pub fn on_inbound_request<F>(&mut self, handler: F)
    where
        F: Fn(RelayRequest) + Send + Sync + 'static,
    {
        self.request_handler = Some(Box::new(handler));
    }

    /// Starts a primary connect cycle if disconnected.
    pub fn connect(&mut self, ctx: &mut RelayContext) -> Transition {
        self.apply(ctx, TransportEvent::ConnectRequested)
    }

    /// Creates the fallback channel. Idempotent for the process lifetime.
    pub fn setup_fallback(&mut self, ctx: &mut RelayContext) -> Transition {
        self.apply(ctx, TransportEvent::FallbackRequested)
    }

    /// Sends an envelope over the authoritative channel.
    ///
    /// While no channel is usable the envelope is deferred until the next
    /// successful connect and a reconnect is triggered, unless a fallback
    /// is pending.
    ///
    /// # Errors
    ///
    /// Returns the channel error when the active channel rejects the send.
    pub fn send(&mut self, ctx: &mut RelayContext, envelope: Envelope) -> Result<SendOutcome> {
        if let Some(channel) = self.active_channel(ctx) {
            channel.send(envelope)?;
            return Ok(SendOutcome::Sent);
        }

        if ctx.state().is_usable() {
            debug!(state = %ctx.state(), event = %envelope.event, "Channel not bound yet; deferring send");
            self.deferred.push_back(envelope);
            return Ok(SendOutcome::Deferred);
        }

        warn!(state = %ctx.state(), event = %envelope.event, "Not connected; deferring send");
        self.deferred.push_back(envelope);
        self.apply(ctx, TransportEvent::ConnectRequested);
        Ok(SendOutcome::Deferred)
    }

    /// Handles one asynchronous input.
    ///
    /// Returns the transition when the input reached the state machine.
    pub fn handle_input(&mut self, ctx: &mut RelayContext, input: ManagerInput) -> Option<Transition> {
        match input {
            ManagerInput::Attempt(Ok(channel)) => {
                if ctx.state() != TransportState::Connecting {
                    debug!(state = %ctx.state(), "Discarding late primary connection");
                    channel.close();
                    return None;
                }
                info!("Connected to backend");
                self.primary = Some(channel);
                Some(self.apply(ctx, TransportEvent::AttemptSucceeded))
            }

            ManagerInput::Attempt(Err(e)) => Some(self.apply(
                ctx,
                TransportEvent::AttemptFailed {
                    reason: e.to_string(),
                },
            )),

            ManagerInput::FallbackOpened(Ok(channel)) => {
                if self.machine.is_fallback_bound(ctx) {
                    self.fallback = Some(channel);
                    if ctx.state() == TransportState::FallbackActive {
                        self.flush_deferred(ctx);
                    }
                } else {
                    channel.close();
                }
                None
            }

            ManagerInput::FallbackOpened(Err(e)) => Some(self.apply(
                ctx,
                TransportEvent::FallbackFailed {
                    reason: e.to_string(),
                },
            )),

            ManagerInput::Notice(notice) => self.handle_notice(ctx, notice),

            ManagerInput::Timer(TimerKind::Retry) => {
                self.retry_timer = None;
                Some(self.apply(ctx, TransportEvent::RetryDue))
            }

            ManagerInput::Timer(TimerKind::Reconnect) => {
                self.reconnect_timer = None;
                Some(self.apply(ctx, TransportEvent::ReconnectDue))
            }
        }
    }

    /// Closes every channel and cancels timers.
    pub fn shutdown(&mut self) {
        self.cancel_timers();
        if let Some(primary) = self.primary.take() {
            primary.close();
        }
        if let Some(fallback) = self.fallback.take() {
            fallback.close();
        }
        if !self.deferred.is_empty() {
            warn!(count = self.deferred.len(), "Dropping deferred sends on shutdown");
            self.deferred.clear();
        }
    }

    /// Returns `true` once a fallback channel exists.
    #[inline]
    #[must_use]
    pub fn has_fallback_channel(&self) -> bool {
        self.fallback.is_some()
    }

    /// Returns the number of deferred sends.
    #[inline]
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn handle_notice(&mut self, ctx: &mut RelayContext, notice: ChannelNotice) -> Option<Transition> {
        match (notice.kind, notice.event) {
            (kind, ChannelEvent::Request(payload)) => {
                let request = RelayRequest::new(payload);
                debug!(%kind, request_id = %request.id, "Received request from backend");
                match &self.request_handler {
                    Some(handler) => handler(request),
                    None => warn!(request_id = %request.id, "No request handler; dropping request"),
                }
                None
            }

            (kind, ChannelEvent::Error(reason)) => {
                error!(%kind, %reason, "Channel error");
                None
            }

            (ChannelKind::Primary, ChannelEvent::Connected) => None,

            (ChannelKind::Primary, ChannelEvent::Disconnected(reason)) => {
                Some(self.apply(ctx, TransportEvent::Disconnected { reason }))
            }

            (ChannelKind::Fallback, ChannelEvent::Connected) => {
                info!("Connected via fallback channel");
                Some(self.apply(ctx, TransportEvent::FallbackConnected))
            }

            (ChannelKind::Fallback, ChannelEvent::Disconnected(reason)) => {
                if ctx.state() != TransportState::FallbackActive {
                    self.fallback = None;
                }
                Some(self.apply(ctx, TransportEvent::FallbackFailed { reason }))
            }
        }
    }

    /// Runs the machine and performs the resulting actions.
    fn apply(&mut self, ctx: &mut RelayContext, event: TransportEvent) -> Transition {
        let transition = self.machine.handle_event(ctx, event);

        if transition.changed() {
            info!(from = %transition.from, to = %transition.to, "Transport state changed");
        }

        for action in &transition.actions {
            self.perform(ctx, *action);
        }

        transition
    }

    fn perform(&mut self, ctx: &RelayContext, action: Action) {
        match action {
            Action::OpenPrimary => self.open_primary(),

            Action::ClosePrimary => {
                if let Some(primary) = self.primary.take() {
                    primary.close();
                }
            }

            Action::CloseFallback => {
                if let Some(fallback) = self.fallback.take() {
                    fallback.close();
                }
            }

            Action::ScheduleRetry(delay) => {
                self.retry_timer = Some(
                    self.scheduler
                        .schedule(delay, ManagerInput::Timer(TimerKind::Retry)),
                );
            }

            Action::ScheduleReconnect(delay) => {
                self.reconnect_timer = Some(
                    self.scheduler
                        .schedule(delay, ManagerInput::Timer(TimerKind::Reconnect)),
                );
            }

            Action::CancelTimers => self.cancel_timers(),

            Action::OpenFallback => self.open_fallback(),

            Action::FlushDeferred => self.flush_deferred(ctx),
        }
    }

    fn open_primary(&mut self) {
        if let Some(stale) = self.primary.take() {
            stale.close();
        }

        let connector = Arc::clone(&self.primary_connector);
        let sink = self.sink();
        let input_tx = self.input_tx.clone();
        let timeout = self.machine.policy().attempt_timeout;
        let attempt = self.machine.failures() + 1;

        debug!(attempt, "Opening primary connection");

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, connector.connect(sink)).await {
                Ok(result) => result,
                Err(_) => Err(Error::connection_timeout(timeout.as_millis() as u64)),
            };
            let _ = input_tx.send(ManagerInput::Attempt(result));
        });
    }

    fn open_fallback(&mut self) {
        let input_tx = self.input_tx.clone();

        let Some(connector) = self.fallback_connector.clone() else {
            let _ = input_tx.send(ManagerInput::FallbackOpened(Err(Error::config(
                "no fallback connector configured",
            ))));
            return;
        };

        let sink = self.sink();
        tokio::spawn(async move {
            let result = connector.connect(sink).await;
            let _ = input_tx.send(ManagerInput::FallbackOpened(result));
        });
    }

    fn flush_deferred(&mut self, ctx: &RelayContext) {
        if self.deferred.is_empty() {
            return;
        }

        // The fallback may report `connected` before its handle is stored.
        let Some(channel) = self.active_channel(ctx) else {
            debug!(count = self.deferred.len(), "Channel not bound yet; keeping deferred sends");
            return;
        };

        for envelope in self.deferred.drain(..) {
            let event = envelope.event.clone();
            match channel.send(envelope) {
                Ok(()) => info!(%event, "Deferred send delivered"),
                Err(e) => error!(%event, error = %e, "Deferred send failed"),
            }
        }
    }

    fn active_channel(&self, ctx: &RelayContext) -> Option<Arc<dyn Channel>> {
        match ctx.state() {
            TransportState::Connected => self.primary.clone(),
            TransportState::FallbackActive => self.fallback.clone(),
            TransportState::Disconnected | TransportState::Connecting => None,
        }
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
        }
    }

    fn sink(&self) -> ChannelSink {
        let input_tx = self.input_tx.clone();
        ChannelSink::new(move |notice| {
            let _ = input_tx.send(ManagerInput::Notice(notice));
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
