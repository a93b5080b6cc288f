//! Page executor interface.
//!
//! A [`PageExecutor`] performs the page-side API call for one request and
//! hands back the raw response body as a chunk stream. Aggregation happens
//! in the page session, not in the executor.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::Result;
use crate::relay::RelayRequest;

// ============================================================================
// Types
// ============================================================================

/// Raw response body, chunked at arbitrary byte boundaries.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

// ============================================================================
// PageExecutor
// ============================================================================

/// Runs a request inside a page session.
#[async_trait]
pub trait PageExecutor: Send + Sync {
    /// Starts the call and returns its body stream.
    ///
    /// # Errors
    ///
    /// Returns a request error (for example
    /// [`Error::ExternalCall`](crate::Error::ExternalCall)) when the call
    /// cannot start or is answered with a failure status.
    async fn execute(&self, request: &RelayRequest) -> Result<ChunkStream>;
}
