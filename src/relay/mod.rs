//! Request relay.
//!
//! Everything between a backend request arriving and its response leaving:
//!
//! ```text
//! request ──▶ RequestRelay ──▶ page session ──▶ StreamAggregator
//!                                                     │
//! response ◀── ResponseDispatcher ◀── RequestRelay ◀──┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `context` | `RelayContext` shared state |
//! | `dispatcher` | `ResponseDispatcher` |
//! | `gate` | `PendingRequestGate` |
//! | `message` | `RelayRequest` and `Response` |
//! | `request` | `RequestRelay` |

// ============================================================================
// Submodules
// ============================================================================

/// Relay-wide state.
pub mod context;

/// Response publishing.
pub mod dispatcher;

/// Admission gate.
pub mod gate;

/// Request and response values.
pub mod message;

/// Request admission and forwarding.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::RelayContext;
pub use dispatcher::{DispatchOutcome, ResponseDispatcher};
pub use gate::PendingRequestGate;
pub use message::{ERROR_PREFIX, RelayRequest, Response, format_messages, prompt_of};
pub use request::{Admission, RequestRelay};
