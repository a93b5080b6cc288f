//! Dual-transport layer.
//!
//! Keeps exactly one logical channel to the backend: the primary WebSocket,
//! or the in-page fallback frame when the primary cannot connect.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        WebSocket         ┌─────────────────┐
//! │ TransportManager │ ── SocketChannel ──────► │                 │
//! │  TransportMachine│                          │     Backend     │
//! │  Scheduler       │ ── FrameChannel ─┐       │                 │
//! └──────────────────┘                  │ own   │                 │
//!                                       └─────► │  (fallbackUrl)  │
//!                                        socket └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `TransportManager::connect` - Disconnected → Connecting
//! 2. Attempt succeeds → Connected, or fails → Disconnected and a retry is scheduled
//! 3. After `fallback_threshold` failures the fallback frame is created once
//! 4. Frame reports `connected` → FallbackActive (terminal)
//! 5. Primary drop → one reconnect after `disconnect_delay`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | `Channel` / `Connector` traits and channel events |
//! | `frame` | Fallback frame channel |
//! | `machine` | Pure state machine |
//! | `manager` | Channel ownership and action execution |
//! | `scheduler` | Cancellable timers |
//! | `socket` | Primary WebSocket channel |
//! | `state` | `TransportState` |

// ============================================================================
// Submodules
// ============================================================================

/// Channel abstraction.
pub mod channel;

/// Fallback frame channel.
pub mod frame;

/// Transport state machine.
pub mod machine;

/// Transport manager.
pub mod manager;

/// Cancellable timers.
pub mod scheduler;

/// Primary WebSocket channel.
pub mod socket;

/// Transport state.
pub mod state;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{Channel, ChannelEvent, ChannelKind, ChannelNotice, ChannelSink, Connector};
pub use frame::{FrameChannel, FrameConnector};
pub use machine::{Action, ReconnectPolicy, Transition, TransportEvent, TransportMachine};
pub use manager::{InputReceiver, ManagerInput, RequestHandler, SendOutcome, TransportManager};
pub use scheduler::{ScheduledTask, Scheduler, TimerKind};
pub use socket::{SocketChannel, SocketConnector};
pub use state::TransportState;
