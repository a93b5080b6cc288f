//! Grok Bridge - relay chat requests from a backend to a Grok page session.
//!
//! The bridge keeps one logical channel to a backend process and answers
//! each backend `request` with exactly one `response`, produced by running
//! the request in a logged-in Grok page and aggregating the page's streamed
//! answer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────┐  request   ┌──────────────────────────────────────┐
//! │         │ ─────────► │ TransportManager → RequestRelay      │
//! │ Backend │            │                         │            │
//! │         │ ◄───────── │ ResponseDispatcher      ▼            │
//! └─────────┘  response  │        ▲          page session       │
//!                        │        └───── StreamAggregator ◄──────│── Grok API
//!                        └──────────────────────────────────────┘
//! ```
//!
//! Key design principles:
//!
//! - One event loop owns all mutable relay state ([`RelayContext`])
//! - At most one request in flight; extra requests are dropped, not queued
//! - Primary WebSocket with bounded retries; an in-page fallback frame
//!   takes over when the primary cannot connect
//! - Every admitted request yields one response, errors included
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use grok_bridge::{Bridge, GrokExecutor, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let bridge = Bridge::builder().host("localhost").port(5001).build()?;
//!
//!     let executor = GrokExecutor::new("sso=...; sso-rw=...")?;
//!     bridge.pages().register("https://grok.com/", Arc::new(executor));
//!
//!     let handle = bridge.spawn();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Builder, options and event loop |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`page`] | Page sessions, origin filter, executors |
//! | [`protocol`] | Wire message types |
//! | [`relay`] | Admission, responses, dispatch |
//! | [`stream`] | Streamed answer aggregation |
//! | [`transport`] | Primary socket, fallback frame, state machine |

// ============================================================================
// Modules
// ============================================================================

/// Bridge builder, options and runtime.
///
/// Use [`Bridge::builder()`] to create a configured bridge.
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for relay entities.
pub mod identifiers;

/// Page sessions and executors.
pub mod page;

/// Wire message types.
pub mod protocol;

/// Request admission and response dispatch.
pub mod relay;

/// Streamed answer aggregation.
pub mod stream;

/// Dual-transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{Bridge, BridgeBuilder, BridgeHandle, BridgeOptions, TransportKind};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{PageSessionId, RequestId};

// Page types
pub use page::{ChunkStream, GrokExecutor, OriginFilter, PageExecutor, PageSessions};

// Relay types
pub use relay::{RelayContext, RelayRequest, Response};

// Stream types
pub use stream::StreamAggregator;

// Transport types
pub use transport::{ReconnectPolicy, TransportState};
