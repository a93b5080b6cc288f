//! Single-slot admission gate.

use crate::identifiers::RequestId;

// ============================================================================
// PendingRequestGate
// ============================================================================

/// Admits at most one outstanding request.
///
/// A request arriving while the gate is held is rejected, never queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingRequestGate {
    held: Option<RequestId>,
}

impl PendingRequestGate {
    /// Creates an open gate.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { held: None }
    }

    /// Takes the gate for `request_id`. Returns `false` if already held.
    pub fn try_acquire(&mut self, request_id: RequestId) -> bool {
        if self.held.is_some() {
            return false;
        }
        self.held = Some(request_id);
        true
    }

    /// Opens the gate, returning the request that held it.
    pub fn release(&mut self) -> Option<RequestId> {
        self.held.take()
    }

    /// Returns `true` while a request is in flight.
    #[inline]
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Returns the in-flight request.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> Option<RequestId> {
        self.held
    }
}
