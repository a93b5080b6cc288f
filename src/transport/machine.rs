//! Transport state machine.
//!
//! [`TransportMachine`] owns no channel and spawns nothing. It maps a
//! [`TransportEvent`] plus the current [`RelayContext`] to a [`Transition`]
//! listing the [`Action`]s the manager must perform.
//!
//! # Transitions
//!
//! | From | Event | To |
//! |------|-------|----|
//! | Disconnected | connect requested / retry due / reconnect due | Connecting |
//! | Connecting | attempt succeeded | Connected |
//! | Connecting | attempt failed | Disconnected |
//! | Connected | disconnected | Disconnected |
//! | Disconnected, Connecting | fallback connected | FallbackActive |
//!
//! There is no transition out of `FallbackActive`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::relay::RelayContext;

use super::state::TransportState;

// ============================================================================
// Constants
// ============================================================================

/// Default number of primary attempts per connect cycle.
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 10;

/// Default delay between primary attempts.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_millis(1000);

/// Default per-attempt connect timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default delay before reconnecting after an established socket drops.
pub const DEFAULT_DISCONNECT_DELAY: Duration = Duration::from_millis(2000);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Timing and failover knobs of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Primary attempts per connect cycle.
    pub attempts: u32,
    /// Delay between failed attempts.
    pub delay: Duration,
    /// Timeout of one connect attempt.
    pub attempt_timeout: Duration,
    /// Delay before the single reconnect after a drop.
    pub disconnect_delay: Duration,
    /// Consecutive failures that open the fallback channel.
    pub fallback_threshold: u32,
    /// Whether a fallback channel may be opened at all.
    pub fallback_enabled: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            delay: DEFAULT_RECONNECTION_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            disconnect_delay: DEFAULT_DISCONNECT_DELAY,
            fallback_threshold: DEFAULT_RECONNECTION_ATTEMPTS,
            fallback_enabled: true,
        }
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Someone needs the primary socket (start, send while disconnected).
    ConnectRequested,
    /// The in-flight primary attempt connected.
    AttemptSucceeded,
    /// The in-flight primary attempt failed or timed out.
    AttemptFailed {
        /// Failure description.
        reason: String,
    },
    /// The delay after a failed attempt elapsed.
    RetryDue,
    /// The established primary socket went away.
    Disconnected {
        /// Disconnect description.
        reason: String,
    },
    /// The delay after a drop elapsed.
    ReconnectDue,
    /// Explicit request to set up the fallback channel.
    FallbackRequested,
    /// The fallback frame reached the backend.
    FallbackConnected,
    /// The fallback frame gave up.
    FallbackFailed {
        /// Failure description.
        reason: String,
    },
}

// ============================================================================
// Action
// ============================================================================

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start one primary connect attempt.
    OpenPrimary,
    /// Close and forget the primary socket.
    ClosePrimary,
    /// Close the fallback channel.
    CloseFallback,
    /// Fire [`TransportEvent::RetryDue`] after the delay.
    ScheduleRetry(Duration),
    /// Fire [`TransportEvent::ReconnectDue`] after the delay.
    ScheduleReconnect(Duration),
    /// Cancel pending retry and reconnect timers.
    CancelTimers,
    /// Create the fallback channel.
    OpenFallback,
    /// Deliver sends deferred while disconnected.
    FlushDeferred,
}

// ============================================================================
// Transition
// ============================================================================

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State before the event.
    pub from: TransportState,
    /// State after the event.
    pub to: TransportState,
    /// Side effects, in order.
    pub actions: Vec<Action>,
}

impl Transition {
    fn stay(state: TransportState) -> Self {
        Self {
            from: state,
            to: state,
            actions: Vec::new(),
        }
    }

    /// Returns `true` if the state changed.
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

// ============================================================================
// TransportMachine
// ============================================================================

/// Connect, reconnect and failover rules.
#[derive(Debug, Clone)]
pub struct TransportMachine {
    policy: ReconnectPolicy,
    /// Consecutive failures in the current connect cycle.
    failures: u32,
    /// Fallback channel opened but not yet connected.
    fallback_pending: bool,
}

impl TransportMachine {
    /// Creates a machine with the given policy.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            fallback_pending: false,
        }
    }

    /// Returns the policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Returns consecutive failures in the current cycle.
    #[inline]
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Returns `true` while the fallback is opened but not connected.
    #[inline]
    #[must_use]
    pub fn is_fallback_pending(&self) -> bool {
        self.fallback_pending
    }

    /// Returns `true` if the fallback channel owns (or is about to own) the
    /// transport, so the primary must not be reconnected.
    #[must_use]
    pub fn is_fallback_bound(&self, ctx: &RelayContext) -> bool {
        self.fallback_pending || ctx.state() == TransportState::FallbackActive
    }

    /// Applies one event.
    pub fn handle_event(&mut self, ctx: &mut RelayContext, event: TransportEvent) -> Transition {
        let from = ctx.state();
        let mut transition = Transition::stay(from);

        match event {
            TransportEvent::ConnectRequested => {
                if from == TransportState::Disconnected && !self.is_fallback_bound(ctx) {
                    self.failures = 0;
                    transition.to = TransportState::Connecting;
                    transition.actions = vec![Action::CancelTimers, Action::OpenPrimary];
                }
            }

            TransportEvent::AttemptSucceeded => match from {
                TransportState::Connecting => {
                    self.failures = 0;
                    transition.to = TransportState::Connected;
                    transition.actions.push(Action::CancelTimers);
                    if self.fallback_pending {
                        self.fallback_pending = false;
                        transition.actions.push(Action::CloseFallback);
                    }
                    transition.actions.push(Action::FlushDeferred);
                }
                _ => transition.actions.push(Action::ClosePrimary),
            },

            TransportEvent::AttemptFailed { reason } => {
                if from == TransportState::Connecting {
                    self.failures += 1;
                    transition.to = TransportState::Disconnected;
                    warn!(
                        attempt = self.failures,
                        max = self.policy.attempts,
                        %reason,
                        "Primary connect attempt failed"
                    );

                    if self.failures >= self.policy.fallback_threshold {
                        self.open_fallback(ctx, &mut transition.actions);
                    }

                    if self.failures < self.policy.attempts {
                        transition
                            .actions
                            .push(Action::ScheduleRetry(self.policy.delay));
                    } else {
                        warn!(attempts = self.failures, "Primary reconnection attempts exhausted");
                    }
                }
            }

            TransportEvent::RetryDue => {
                if from == TransportState::Disconnected {
                    transition.to = TransportState::Connecting;
                    transition.actions.push(Action::OpenPrimary);
                }
            }

            TransportEvent::Disconnected { reason } => match from {
                TransportState::Connected => {
                    warn!(%reason, "Disconnected from backend");
                    transition.to = TransportState::Disconnected;
                    transition.actions.push(Action::ClosePrimary);
                    if !self.is_fallback_bound(ctx) {
                        transition
                            .actions
                            .push(Action::ScheduleReconnect(self.policy.disconnect_delay));
                    }
                }
                _ => transition.actions.push(Action::ClosePrimary),
            },

            TransportEvent::ReconnectDue => {
                if from == TransportState::Disconnected && !self.is_fallback_bound(ctx) {
                    info!("Attempting to reconnect");
                    self.failures = 0;
                    transition.to = TransportState::Connecting;
                    transition.actions.push(Action::OpenPrimary);
                }
            }

            TransportEvent::FallbackRequested => {
                self.open_fallback(ctx, &mut transition.actions);
            }

            TransportEvent::FallbackConnected => {
                self.fallback_pending = false;
                match from {
                    TransportState::Connected => {
                        debug!("Fallback connected after primary; closing fallback");
                        transition.actions.push(Action::CloseFallback);
                    }
                    TransportState::FallbackActive => {}
                    TransportState::Disconnected | TransportState::Connecting => {
                        transition.to = TransportState::FallbackActive;
                        transition.actions = vec![
                            Action::CancelTimers,
                            Action::ClosePrimary,
                            Action::FlushDeferred,
                        ];
                    }
                }
            }

            TransportEvent::FallbackFailed { reason } => {
                warn!(%reason, "Fallback channel failed");
                if from != TransportState::FallbackActive {
                    self.fallback_pending = false;
                }
            }
        }

        ctx.set_state(transition.to);
        transition
    }

    /// Opens the fallback unless it is disabled or already attempted.
    fn open_fallback(&mut self, ctx: &mut RelayContext, actions: &mut Vec<Action>) {
        if !self.policy.fallback_enabled || ctx.fallback_attempted() {
            return;
        }

        info!("Trying fallback channel");
        ctx.mark_fallback_attempted();
        self.fallback_pending = true;
        actions.push(Action::OpenFallback);
    }
}

// ============================================================================
// Tests
// ============================================================================
