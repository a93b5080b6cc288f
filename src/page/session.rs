//! Page session registry.
//!
//! Each registered session stands for one open page (tab) and runs a worker
//! task that behaves like the page's content script:
//!
//! 1. Receives a `request` page message
//! 2. Runs its [`PageExecutor`] and aggregates the body stream
//! 3. Replies with a `response` page message
//!
//! A session handles one request at a time; a request arriving while it is
//! busy is ignored with a `debug` warning. Replies from every session arrive
//! on the single [`ReplyReceiver`] returned by [`PageSessions::new`].
//!
//! Unregistering a session closes its inbox. A request still running at that
//! point is aborted and answered with [`Error::PageClosed`], so the relay
//! always gets its `response`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              PageSessions               │
//! │  ┌───────────────────────────────────┐  │
//! │  │ PageSessionId=1 → worker (grok)   │  │
//! │  │ PageSessionId=2 → worker (other)  │  │
//! │  └───────────────────────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ PageReply
//!                      ▼
//!                 bridge loop
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::future::OptionFuture;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{PageSessionId, RequestId};
use crate::protocol::PageMessage;
use crate::relay::{RelayRequest, Response};
use crate::stream::{PREVIEW_CHARS, StreamAggregator, preview};

use super::executor::PageExecutor;
use super::filter::OriginFilter;

// ============================================================================
// Types
// ============================================================================

/// A page message sent by a session worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PageReply {
    /// Sending session.
    pub session_id: PageSessionId,
    /// The message.
    pub message: PageMessage,
}

/// Receiver of replies from all sessions.
pub type ReplyReceiver = mpsc::UnboundedReceiver<PageReply>;

// ============================================================================
// PageSession
// ============================================================================

/// One registered page. Dropping it closes the inbox and ends the worker.
struct PageSession {
    url: String,
    inbox: mpsc::UnboundedSender<PageMessage>,
}

// ============================================================================
// PageSessions
// ============================================================================

/// Registry of open page sessions.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct PageSessions {
    inner: Arc<Registry>,
}

struct Registry {
    sessions: RwLock<FxHashMap<PageSessionId, PageSession>>,
    replies: mpsc::UnboundedSender<PageReply>,
}

impl PageSessions {
    /// Creates an empty registry and the receiver for its replies.
    #[must_use]
    pub fn new() -> (Self, ReplyReceiver) {
        let (replies, reply_rx) = mpsc::unbounded_channel();

        let sessions = Self {
            inner: Arc::new(Registry {
                sessions: RwLock::new(FxHashMap::default()),
                replies,
            }),
        };

        (sessions, reply_rx)
    }

    /// Registers a page at `url` served by `executor`.
    ///
    /// Must be called inside a tokio runtime; spawns the session worker.
    pub fn register(&self, url: impl Into<String>, executor: Arc<dyn PageExecutor>) -> PageSessionId {
        let session_id = PageSessionId::next();
        let url = url.into();
        let (inbox, inbox_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            session_id,
            executor,
            replies: self.inner.replies.clone(),
        };
        tokio::spawn(worker.run(inbox_rx));

        info!(%session_id, %url, "Page session registered");
        let _ = self.inner.replies.send(PageReply {
            session_id,
            message: debug_message("info", "Page session initialized", Some(json!({ "url": url }))),
        });

        self.inner.sessions.write().insert(
            session_id,
            PageSession { url, inbox },
        );

        session_id
    }

    /// Removes a session and stops its worker.
    ///
    /// A request still running in the session is answered with
    /// [`Error::PageClosed`].
    ///
    /// Returns `false` if the session was not registered.
    pub fn unregister(&self, session_id: PageSessionId) -> bool {
        let removed = self.inner.sessions.write().remove(&session_id);
        if removed.is_some() {
            info!(%session_id, "Page session unregistered");
        }
        removed.is_some()
    }

    /// Returns the first session whose URL matches `filter`.
    #[must_use]
    pub fn resolve(&self, filter: &OriginFilter) -> Option<PageSessionId> {
        self.inner
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| filter.matches(&session.url))
            .map(|(id, _)| *id)
            .min()
    }

    /// Posts a message to a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the session is gone.
    pub fn deliver(&self, session_id: PageSessionId, message: PageMessage) -> Result<()> {
        let sessions = self.inner.sessions.read();
        let session = sessions.get(&session_id).ok_or(Error::ConnectionClosed)?;
        session
            .inbox
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Returns the URL of a session.
    #[must_use]
    pub fn url(&self, session_id: PageSessionId) -> Option<String> {
        self.inner
            .sessions
            .read()
            .get(&session_id)
            .map(|session| session.url.clone())
    }

    /// Returns the number of registered sessions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Returns `true` if no session is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.read().is_empty()
    }

    /// Unregisters every session.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.inner.sessions.write().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Closed all page sessions");
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Session worker state.
struct Worker {
    session_id: PageSessionId,
    executor: Arc<dyn PageExecutor>,
    replies: mpsc::UnboundedSender<PageReply>,
}

impl Worker {
    async fn run(self, mut inbox: mpsc::UnboundedReceiver<PageMessage>) {
        let mut running: Option<(RequestId, JoinHandle<Response>)> = None;

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(PageMessage::Request { data, request_id }) => {
                        if running.is_some() {
                            self.debug("warning", "Ignoring request, still waiting for previous response", None);
                            continue;
                        }

                        let request = RelayRequest {
                            id: request_id.unwrap_or_else(RequestId::generate),
                            payload: data,
                        };
                        self.debug("request", "Processing request", Some(request.payload.clone()));

                        let request_id = request.id;
                        let executor = Arc::clone(&self.executor);
                        running = Some((request_id, tokio::spawn(execute(executor, request))));
                    }

                    Some(other) => {
                        debug!(session_id = %self.session_id, ?other, "Page ignoring message");
                    }

                    None => break,
                },

                Some(joined) = OptionFuture::from(running.as_mut().map(|(_, task)| task)), if running.is_some() => {
                    let Some((request_id, _)) = running.take() else {
                        continue;
                    };

                    let response = joined.unwrap_or_else(|e| {
                        error!(session_id = %self.session_id, %request_id, error = %e, "Page task failed");
                        Response::failure(request_id, &Error::page_task(e.to_string()))
                    });

                    self.reply(response);
                }
            }
        }

        if let Some((request_id, task)) = running {
            task.abort();
            warn!(session_id = %self.session_id, %request_id, "Page session closed with a request in flight");
            self.reply(Response::failure(request_id, &Error::PageClosed));
        }

        debug!(session_id = %self.session_id, "Page worker terminated");
    }

    fn reply(&self, response: Response) {
        if response.is_error {
            self.debug("error", &response.text, None);
        } else {
            self.debug(
                "response",
                "Sending complete response",
                Some(json!({
                    "length": response.text.chars().count(),
                    "preview": preview(&response.text, PREVIEW_CHARS),
                })),
            );
        }

        let _ = self.replies.send(PageReply {
            session_id: self.session_id,
            message: PageMessage::Response {
                data: response.text,
                is_error: response.is_error,
            },
        });

        self.debug("info", "Request handling complete, ready for next request", None);
    }

    fn debug(&self, level: &str, message: &str, data: Option<Value>) {
        let _ = self.replies.send(PageReply {
            session_id: self.session_id,
            message: debug_message(level, message, data),
        });
    }
}

/// Runs the executor and aggregates its stream.
async fn execute(executor: Arc<dyn PageExecutor>, request: RelayRequest) -> Response {
    match executor.execute(&request).await {
        Ok(stream) => StreamAggregator::new().consume(request.id, stream).await,
        Err(e) => {
            warn!(request_id = %request.id, error = %e, "Page call failed");
            Response::failure(request.id, &e)
        }
    }
}

fn debug_message(level: &str, message: &str, data: Option<Value>) -> PageMessage {
    PageMessage::Debug {
        level: level.to_string(),
        message: message.to_string(),
        data,
    }
}

// ============================================================================
// Debug Logging
// ============================================================================

/// Logs a page `debug` message at the matching tracing level.
pub fn log_page_debug(session_id: PageSessionId, level: &str, message: &str, data: Option<&Value>) {
    let data = data.map(Value::to_string).unwrap_or_default();
    match level {
        "error" => error!(%session_id, %data, "{message}"),
        "warning" | "warn" => warn!(%session_id, %data, "{message}"),
        _ => debug!(%session_id, %level, %data, "{message}"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use futures_util::stream;

    use crate::page::executor::ChunkStream;
    use crate::page::filter::DEFAULT_ORIGIN_FILTER;

    struct ChunkExecutor(Vec<String>);

    #[async_trait]
    impl PageExecutor for ChunkExecutor {
        async fn execute(&self, _request: &RelayRequest) -> Result<ChunkStream> {
            let chunks: Vec<Result<Bytes>> = self
                .0
                .iter()
                .map(|chunk| Ok(Bytes::from(chunk.clone())))
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl PageExecutor for FailingExecutor {
        async fn execute(&self, _request: &RelayRequest) -> Result<ChunkStream> {
            Err(Error::external_call(500, "boom"))
        }
    }

    struct PendingExecutor;

    #[async_trait]
    impl PageExecutor for PendingExecutor {
        async fn execute(&self, _request: &RelayRequest) -> Result<ChunkStream> {
            Ok(stream::pending().boxed())
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl PageExecutor for PanickingExecutor {
        async fn execute(&self, _request: &RelayRequest) -> Result<ChunkStream> {
            panic!("page crashed");
        }
    }

    async fn next_response(rx: &mut ReplyReceiver) -> (String, bool) {
        loop {
            let reply = rx.recv().await.expect("reply");
            if let PageMessage::Response { data, is_error } = reply.message {
                return (data, is_error);
            }
        }
    }

    fn token(text: &str) -> String {
        format!("{}\n", json!({"result": {"response": {"token": text}}}))
    }

    #[tokio::test]
    async fn test_request_is_aggregated_into_response() {
        let (sessions, mut rx) = PageSessions::new();
        let chunks = vec![token("Hel"), token("lo")];
        let id = sessions.register("https://grok.com/", Arc::new(ChunkExecutor(chunks)));

        sessions
            .deliver(id, PageMessage::request(json!("hi")))
            .expect("deliver");

        assert_eq!(next_response(&mut rx).await, ("Hello".to_string(), false));
    }

    #[tokio::test]
    async fn test_executor_error_becomes_error_response() {
        let (sessions, mut rx) = PageSessions::new();
        let id = sessions.register("https://grok.com/", Arc::new(FailingExecutor));

        sessions
            .deliver(id, PageMessage::request(json!("hi")))
            .expect("deliver");

        let (text, is_error) = next_response(&mut rx).await;
        assert!(is_error);
        assert_eq!(text, "Error communicating with Grok: HTTP error! Status: 500");
    }

    #[tokio::test]
    async fn test_panicking_executor_still_replies() {
        let (sessions, mut rx) = PageSessions::new();
        let id = sessions.register("https://grok.com/", Arc::new(PanickingExecutor));

        sessions
            .deliver(id, PageMessage::request(json!("hi")))
            .expect("deliver");

        let (text, is_error) = next_response(&mut rx).await;
        assert!(is_error);
        assert!(text.starts_with("Error communicating with Grok: Page task failed"));
    }

    #[tokio::test]
    async fn test_busy_session_ignores_second_request() {
        let (sessions, mut rx) = PageSessions::new();
        let id = sessions.register("https://grok.com/", Arc::new(PendingExecutor));

        sessions
            .deliver(id, PageMessage::request(json!("first")))
            .expect("deliver");
        sessions
            .deliver(id, PageMessage::request(json!("second")))
            .expect("deliver");

        loop {
            let reply = rx.recv().await.expect("reply");
            match reply.message {
                PageMessage::Debug { level, message, .. } if level == "warning" => {
                    assert!(message.starts_with("Ignoring request"));
                    break;
                }
                PageMessage::Response { .. } => panic!("pending request must not answer"),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_unregister_answers_running_request() {
        let (sessions, mut rx) = PageSessions::new();
        let id = sessions.register("https://grok.com/", Arc::new(PendingExecutor));
        let request_id = RequestId::generate();

        sessions
            .deliver(
                id,
                PageMessage::Request {
                    data: json!("one"),
                    request_id: Some(request_id),
                },
            )
            .expect("deliver");
        tokio::task::yield_now().await;
        assert!(sessions.unregister(id));

        let (text, is_error) = next_response(&mut rx).await;
        assert!(is_error);
        assert_eq!(text, "Error communicating with Grok: Page session closed");
    }

    #[tokio::test]
    async fn test_worker_uses_relay_request_id() {
        struct RecordingExecutor(Arc<parking_lot::Mutex<Option<RequestId>>>);

        #[async_trait]
        impl PageExecutor for RecordingExecutor {
            async fn execute(&self, request: &RelayRequest) -> Result<ChunkStream> {
                *self.0.lock() = Some(request.id);
                Err(Error::EmptyResult)
            }
        }

        let seen = Arc::new(parking_lot::Mutex::new(None));
        let (sessions, mut rx) = PageSessions::new();
        let id = sessions.register("https://grok.com/", Arc::new(RecordingExecutor(Arc::clone(&seen))));
        let request_id = RequestId::generate();

        sessions
            .deliver(
                id,
                PageMessage::Request {
                    data: json!("hi"),
                    request_id: Some(request_id),
                },
            )
            .expect("deliver");
        next_response(&mut rx).await;

        assert_eq!(*seen.lock(), Some(request_id));
    }

    #[tokio::test]
    async fn test_resolve_picks_first_matching_session() {
        let (sessions, _rx) = PageSessions::new();
        let filter = OriginFilter::parse(DEFAULT_ORIGIN_FILTER).expect("filter");

        assert!(sessions.resolve(&filter).is_none());

        sessions.register("https://example.com/", Arc::new(FailingExecutor));
        let first = sessions.register("https://grok.com/chat", Arc::new(FailingExecutor));
        let second = sessions.register("https://grok.com/", Arc::new(FailingExecutor));

        assert_eq!(sessions.resolve(&filter), Some(first));
        assert!(sessions.unregister(first));
        assert_eq!(sessions.resolve(&filter), Some(second));
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_deliver_to_unknown_session_fails() {
        let (sessions, _rx) = PageSessions::new();
        let id = sessions.register("https://grok.com/", Arc::new(FailingExecutor));
        sessions.close_all();

        assert!(sessions.is_empty());
        let err = sessions
            .deliver(id, PageMessage::request(json!("x")))
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
