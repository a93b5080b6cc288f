//! Publishes responses to the backend.

// ============================================================================
// Imports
// ============================================================================

use tracing::{error, info, warn};

use crate::protocol::Envelope;
use crate::stream::{PREVIEW_CHARS, preview};
use crate::transport::{SendOutcome, TransportManager};

use super::context::RelayContext;
use super::message::Response;

// ============================================================================
// DispatchOutcome
// ============================================================================

/// Result of [`ResponseDispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the active channel.
    Sent,
    /// Will be sent once after the next successful connect.
    Deferred,
    /// Could not be sent; logged and dropped.
    Failed,
}

// ============================================================================
// ResponseDispatcher
// ============================================================================

/// Sends each [`Response`] as a `response` event over the active transport.
///
/// While disconnected the send is deferred to the next successful connect,
/// exactly once; it is never retried in a loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDispatcher;

impl ResponseDispatcher {
    /// Creates a dispatcher.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Sends `response` through `transport`.
    ///
    /// The admission gate is released if it still holds this request.
    pub fn dispatch(
        &self,
        ctx: &mut RelayContext,
        transport: &mut TransportManager,
        response: Response,
    ) -> DispatchOutcome {
        if ctx.gate().current() == Some(response.request_id) {
            ctx.gate_mut().release();
        }

        info!(
            request_id = %response.request_id,
            is_error = response.is_error,
            length = response.text.chars().count(),
            preview = %preview(&response.text, PREVIEW_CHARS),
            "Sending response to backend"
        );

        let envelope = match Envelope::response(&response.to_payload()) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(request_id = %response.request_id, error = %e, "Failed to encode response");
                return DispatchOutcome::Failed;
            }
        };

        match transport.send(ctx, envelope) {
            Ok(SendOutcome::Sent) => DispatchOutcome::Sent,
            Ok(SendOutcome::Deferred) => {
                warn!(
                    request_id = %response.request_id,
                    "Not connected to backend; response deferred until reconnect"
                );
                DispatchOutcome::Deferred
            }
            Err(e) => {
                error!(request_id = %response.request_id, error = %e, "Failed to send response");
                DispatchOutcome::Failed
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
