//! Relay-wide mutable state.

use crate::transport::TransportState;

use super::gate::PendingRequestGate;

// ============================================================================
// RelayContext
// ============================================================================

/// State shared by every relay component.
///
/// Owned by the bridge loop and lent out as `&mut` to each handler, so no
/// component keeps connection or gate state of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayContext {
    state: TransportState,
    gate: PendingRequestGate,
    /// A fallback channel was created at some point. Never reset.
    fallback_attempted: bool,
}

impl RelayContext {
    /// Creates a disconnected context with an open gate.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the transport state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[inline]
    pub(crate) fn set_state(&mut self, state: TransportState) {
        self.state = state;
    }

    /// Returns the admission gate.
    #[inline]
    #[must_use]
    pub fn gate(&self) -> &PendingRequestGate {
        &self.gate
    }

    /// Returns the admission gate mutably.
    #[inline]
    pub fn gate_mut(&mut self) -> &mut PendingRequestGate {
        &mut self.gate
    }

    /// Returns `true` once a fallback channel was created.
    #[inline]
    #[must_use]
    pub fn fallback_attempted(&self) -> bool {
        self.fallback_attempted
    }

    #[inline]
    pub(crate) fn mark_fallback_attempted(&mut self) {
        self.fallback_attempted = true;
    }
}
