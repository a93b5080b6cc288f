//! Page sessions and executors.
//!
//! A page session is the execution context a request runs in: an open
//! grok.com page with a logged-in user. The relay picks the session whose URL
//! matches its [`OriginFilter`] and forwards the request to it.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `executor` | `PageExecutor` trait and `ChunkStream` |
//! | `filter` | Origin match patterns |
//! | `grok` | HTTPS executor for the Grok conversation API |
//! | `session` | Session registry and workers |

// ============================================================================
// Submodules
// ============================================================================

/// Page executor interface.
pub mod executor;

/// Origin match patterns.
pub mod filter;

/// Grok conversation executor.
pub mod grok;

/// Page session registry.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use executor::{ChunkStream, PageExecutor};
pub use filter::{DEFAULT_ORIGIN_FILTER, OriginFilter};
pub use grok::{ConversationPayload, GROK_CONVERSATION_URL, GROK_MODEL, GrokExecutor};
pub use session::{PageReply, PageSessions, ReplyReceiver, log_page_debug};
