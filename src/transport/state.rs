//! Logical transport state.

use std::fmt;

// ============================================================================
// TransportState
// ============================================================================

/// State of the logical channel to the backend.
///
/// `Connected` and `FallbackActive` are mutually exclusive: exactly one
/// underlying channel is authoritative at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportState {
    /// No channel is usable.
    #[default]
    Disconnected,
    /// A primary connect attempt is in flight.
    Connecting,
    /// The primary socket is authoritative.
    Connected,
    /// The fallback frame is authoritative.
    FallbackActive,
}

impl TransportState {
    /// Returns `true` if sends can be delivered right away.
    #[inline]
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Connected | Self::FallbackActive)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::FallbackActive => "fallback-active",
        };
        f.write_str(name)
    }
}
