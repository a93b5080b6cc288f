//! Wire message types.
//!
//! This module defines every message shape the bridge exchanges.
//!
//! # Protocol Overview
//!
//! | Message Type | Boundary | Purpose |
//! |--------------|----------|---------|
//! | `Envelope` | backend socket | `request` / `response` events |
//! | `FrameMessage` | fallback frame | `connected` / `error` / `request` / `sendResponse` |
//! | `PageMessage` | page session | `request` / `response` / `debug` |
//! | `StreamRecord` | page response stream | token and completion records |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Backend event envelope |
//! | `frame` | Fallback frame messages |
//! | `page` | Page session messages |
//! | `record` | Response stream records |

// ============================================================================
// Submodules
// ============================================================================

/// Backend event envelope.
pub mod envelope;

/// Fallback frame messages.
pub mod frame;

/// Page session messages.
pub mod page;

/// Response stream records.
pub mod record;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, REQUEST_EVENT, RESPONSE_EVENT, ResponsePayload};
pub use frame::FrameMessage;
pub use page::PageMessage;
pub use record::{RecordKind, StreamRecord};
