//! Request admission and forwarding.
//!
//! [`RequestRelay`] turns backend requests into page messages and page
//! replies into [`Response`]s, holding the admission gate in between.
//!
//! | Situation | Result |
//! |-----------|--------|
//! | gate held | request dropped ([`Admission::Rejected`]) |
//! | no matching page session | gate cleared, error response ([`Admission::Failed`]) |
//! | session found | `request` page message sent ([`Admission::Forwarded`]) |

// ============================================================================
// Imports
// ============================================================================

use tracing::{error, info, warn};

use crate::error::Error;
use crate::identifiers::PageSessionId;
use crate::page::{OriginFilter, PageReply, PageSessions, log_page_debug};
use crate::protocol::PageMessage;
use crate::stream::{PREVIEW_CHARS, preview};

use super::context::RelayContext;
use super::message::{RelayRequest, Response};

// ============================================================================
// Admission
// ============================================================================

/// Outcome of [`RequestRelay::on_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Another request is in flight; this one was dropped.
    Rejected,
    /// Forwarded to the page session.
    Forwarded(PageSessionId),
    /// Could not be forwarded; dispatch this error response.
    Failed(Response),
}

// ============================================================================
// RequestRelay
// ============================================================================

/// Admits at most one request and forwards it to a page session.
#[derive(Clone)]
pub struct RequestRelay {
    pages: PageSessions,
    filter: OriginFilter,
}

impl RequestRelay {
    /// Creates a relay resolving sessions in `pages` with `filter`.
    #[must_use]
    pub fn new(pages: PageSessions, filter: OriginFilter) -> Self {
        Self { pages, filter }
    }

    /// Returns the origin filter.
    #[inline]
    #[must_use]
    pub fn filter(&self) -> &OriginFilter {
        &self.filter
    }

    /// Admits and forwards a backend request.
    pub fn on_request(&self, ctx: &mut RelayContext, request: RelayRequest) -> Admission {
        if !ctx.gate_mut().try_acquire(request.id) {
            warn!(
                request_id = %request.id,
                in_flight = ?ctx.gate().current(),
                "Ignoring request, still waiting for previous response"
            );
            return Admission::Rejected;
        }

        info!(
            request_id = %request.id,
            preview = %preview(&request.prompt(), PREVIEW_CHARS),
            "Request admitted"
        );

        let Some(session_id) = self.pages.resolve(&self.filter) else {
            let e = Error::no_execution_context(self.filter.pattern());
            error!(request_id = %request.id, "{e}");
            ctx.gate_mut().release();
            return Admission::Failed(Response::failure(request.id, &e));
        };

        let message = PageMessage::Request {
            data: request.payload,
            request_id: Some(request.id),
        };

        match self.pages.deliver(session_id, message) {
            Ok(()) => {
                info!(request_id = %request.id, %session_id, "Forwarding request to page session");
                Admission::Forwarded(session_id)
            }
            Err(e) => {
                error!(request_id = %request.id, %session_id, error = %e, "Page session unavailable");
                ctx.gate_mut().release();
                Admission::Failed(Response::failure(request.id, &e))
            }
        }
    }

    /// Handles a page reply.
    ///
    /// Returns the response to dispatch when the reply answers the in-flight
    /// request; `debug` messages are logged.
    pub fn on_page_reply(&self, ctx: &mut RelayContext, reply: PageReply) -> Option<Response> {
        let session_id = reply.session_id;

        match reply.message {
            PageMessage::Response { data, is_error } => {
                let Some(request_id) = ctx.gate_mut().release() else {
                    warn!(%session_id, "Page response with no request in flight; dropping");
                    return None;
                };

                info!(
                    %request_id,
                    %session_id,
                    length = data.chars().count(),
                    preview = %preview(&data, PREVIEW_CHARS),
                    "Received response from page session"
                );

                Some(Response {
                    request_id,
                    text: data,
                    is_error,
                })
            }

            PageMessage::Debug {
                level,
                message,
                data,
            } => {
                log_page_debug(session_id, &level, &message, data.as_ref());
                None
            }

            PageMessage::Request { .. } => {
                warn!(%session_id, "Page sent a request; ignoring");
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use futures_util::{StreamExt, stream};
    use serde_json::json;

    use crate::error::Result;
    use crate::page::{ChunkStream, DEFAULT_ORIGIN_FILTER, PageExecutor, ReplyReceiver};

    struct SilentExecutor;

    #[async_trait]
    impl PageExecutor for SilentExecutor {
        async fn execute(&self, _request: &RelayRequest) -> Result<ChunkStream> {
            Ok(stream::pending().boxed())
        }
    }

    fn relay() -> (RequestRelay, PageSessions, ReplyReceiver) {
        let (pages, replies) = PageSessions::new();
        let filter = OriginFilter::parse(DEFAULT_ORIGIN_FILTER).expect("filter");
        (RequestRelay::new(pages.clone(), filter), pages, replies)
    }

    #[tokio::test]
    async fn test_missing_session_fails_fast_and_clears_gate() {
        let (relay, _pages, _replies) = relay();
        let mut ctx = RelayContext::new();
        let request = RelayRequest::new(json!("hi"));
        let id = request.id;

        let Admission::Failed(response) = relay.on_request(&mut ctx, request) else {
            panic!("expected failure");
        };

        assert_eq!(response.request_id, id);
        assert!(response.is_error);
        assert!(response.text.starts_with("Error communicating with Grok: No page session"));
        assert!(!ctx.gate().is_held());
    }

    #[tokio::test]
    async fn test_second_request_rejected_while_in_flight() {
        let (relay, pages, _replies) = relay();
        let session = pages.register("https://grok.com/", Arc::new(SilentExecutor));
        let mut ctx = RelayContext::new();

        let first = RelayRequest::new(json!("one"));
        let first_id = first.id;
        assert_eq!(relay.on_request(&mut ctx, first), Admission::Forwarded(session));

        let second = RelayRequest::new(json!("two"));
        assert_eq!(relay.on_request(&mut ctx, second), Admission::Rejected);
        assert_eq!(ctx.gate().current(), Some(first_id));
    }

    #[tokio::test]
    async fn test_page_response_releases_gate() {
        let (relay, pages, _replies) = relay();
        let session = pages.register("https://grok.com/", Arc::new(SilentExecutor));
        let mut ctx = RelayContext::new();

        let request = RelayRequest::new(json!("hi"));
        let id = request.id;
        relay.on_request(&mut ctx, request);

        let reply = PageReply {
            session_id: session,
            message: PageMessage::Response {
                data: "Hello".into(),
                is_error: false,
            },
        };
        let response = relay.on_page_reply(&mut ctx, reply).expect("response");

        assert_eq!(response, Response::success(id, "Hello"));
        assert!(!ctx.gate().is_held());
    }

    #[tokio::test]
    async fn test_stray_page_response_dropped() {
        let (relay, pages, _replies) = relay();
        let session = pages.register("https://grok.com/", Arc::new(SilentExecutor));
        let mut ctx = RelayContext::new();

        let reply = PageReply {
            session_id: session,
            message: PageMessage::Response {
                data: "late".into(),
                is_error: false,
            },
        };

        assert!(relay.on_page_reply(&mut ctx, reply).is_none());
    }

    #[tokio::test]
    async fn test_debug_reply_produces_nothing() {
        let (relay, pages, _replies) = relay();
        let session = pages.register("https://grok.com/", Arc::new(SilentExecutor));
        let mut ctx = RelayContext::new();

        let reply = PageReply {
            session_id: session,
            message: PageMessage::Debug {
                level: "info".into(),
                message: "Processing chunk #1".into(),
                data: Some(json!({"chunkSize": 10})),
            },
        };

        assert!(relay.on_page_reply(&mut ctx, reply).is_none());
    }
}
