//! Bridge entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Bridge`] | Owns the relay components before start |
//! | [`BridgeBuilder`] | Fluent configuration builder |
//! | [`BridgeOptions`] | Serializable options |
//! | [`BridgeHandle`] | Handle to the running event loop |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for bridge configuration.
pub mod builder;

/// Bridge runtime and event loop.
pub mod core;

/// Bridge options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::BridgeBuilder;
pub use core::{Bridge, BridgeCommand, BridgeHandle};
pub use options::{BridgeOptions, TransportKind};
