//! Grok conversation executor.
//!
//! Posts the prompt to the Grok web API the way the grok.com page does and
//! returns the newline-delimited JSON body as a chunk stream.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, ORIGIN, REFERER};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::relay::RelayRequest;

use super::executor::{ChunkStream, PageExecutor};

// ============================================================================
// Constants
// ============================================================================

/// Conversation endpoint.
pub const GROK_CONVERSATION_URL: &str = "https://grok.com/rest/app-chat/conversations/new";

/// Page origin sent with every call.
const GROK_ORIGIN: &str = "https://grok.com";

/// Referer sent with every call.
const GROK_REFERER: &str = "https://grok.com/";

/// Model requested for new conversations.
pub const GROK_MODEL: &str = "grok-3";

/// Connect timeout for the HTTP client. The body stream itself has none.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConversationPayload
// ============================================================================

/// Body of a new-conversation call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    temporary: bool,
    model_name: String,
    message: String,
    file_attachments: Vec<Value>,
    image_attachments: Vec<Value>,
    disable_search: bool,
    enable_image_generation: bool,
    return_image_bytes: bool,
    return_raw_grok_in_xai_request: bool,
    enable_image_streaming: bool,
    image_generation_count: u32,
    force_concise: bool,
    tool_overrides: Map<String, Value>,
    enable_side_by_side: bool,
    is_preset: bool,
    send_final_metadata: bool,
    custom_instructions: String,
    deepsearch_preset: String,
    is_reasoning: bool,
}

impl ConversationPayload {
    /// Creates the payload the page sends for `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            temporary: false,
            model_name: GROK_MODEL.to_string(),
            message: message.into(),
            file_attachments: Vec::new(),
            image_attachments: Vec::new(),
            disable_search: false,
            enable_image_generation: true,
            return_image_bytes: false,
            return_raw_grok_in_xai_request: false,
            enable_image_streaming: true,
            image_generation_count: 2,
            force_concise: false,
            tool_overrides: Map::new(),
            enable_side_by_side: true,
            is_preset: false,
            send_final_metadata: true,
            custom_instructions: String::new(),
            deepsearch_preset: String::new(),
            is_reasoning: false,
        }
    }

    /// Returns the prompt.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

// ============================================================================
// GrokExecutor
// ============================================================================

/// Executor calling the Grok conversation API over HTTPS.
#[derive(Debug, Clone)]
pub struct GrokExecutor {
    client: reqwest::Client,
    endpoint: Url,
}

impl GrokExecutor {
    /// Creates an executor authenticated by a ready `Cookie` header value.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the cookie is not a valid header value
    /// - [`Error::Http`] if the client cannot be built
    pub fn new(cookie: &str) -> Result<Self> {
        let endpoint = Url::parse(GROK_CONVERSATION_URL)?;
        Self::with_endpoint(cookie, endpoint)
    }

    /// Creates an executor posting to a custom endpoint.
    ///
    /// # Errors
    ///
    /// Same as [`GrokExecutor::new`].
    pub fn with_endpoint(cookie: &str, endpoint: Url) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static(GROK_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static(GROK_REFERER));

        if !cookie.is_empty() {
            let mut value = HeaderValue::from_str(cookie)
                .map_err(|e| Error::config(format!("invalid cookie header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, endpoint })
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PageExecutor for GrokExecutor {
    async fn execute(&self, request: &RelayRequest) -> Result<ChunkStream> {
        let payload = ConversationPayload::new(request.prompt());

        debug!(request_id = %request.id, url = %self.endpoint, "Sending message to Grok API");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(request_id = %request.id, status = status.as_u16(), "Grok API returned error status");
            return Err(Error::external_call(status.as_u16(), body));
        }

        debug!(request_id = %request.id, status = status.as_u16(), "Received response from Grok API");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::stream_read(e.to_string())))
            .boxed())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::stream::StreamAggregator;

    /// Serves one canned HTTP response and returns the raw request.
    async fn serve_once(status_line: &'static str, body: String) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/rest/app-chat/conversations/new"))
            .expect("url");

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !request.ends_with(b"}") {
                let n = socket.read(&mut buf).await.expect("read");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let reply = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.expect("write");
            socket.shutdown().await.expect("shutdown");

            String::from_utf8_lossy(&request).into_owned()
        });

        (url, server)
    }

    #[test]
    fn test_payload_uses_page_flags() {
        let json = serde_json::to_value(ConversationPayload::new("hi")).expect("serialize");
        assert_eq!(json["modelName"], "grok-3");
        assert_eq!(json["message"], "hi");
        assert_eq!(json["imageGenerationCount"], 2);
        assert_eq!(json["returnRawGrokInXaiRequest"], false);
        assert_eq!(json["toolOverrides"], json!({}));
    }

    #[test]
    fn test_invalid_cookie_is_config_error() {
        let err = GrokExecutor::new("sso=a\nb").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_streams_body_on_success() {
        let body = [
            json!({"result": {"response": {"token": "Hi"}}}).to_string(),
            json!({"result": {"response": {"modelResponse": {"message": "Hi there"}}}}).to_string(),
        ]
        .join("\n");
        let (url, server) = serve_once("HTTP/1.1 200 OK", body).await;

        let executor = GrokExecutor::with_endpoint("sso=token", url).expect("executor");
        let request = RelayRequest::new(json!("hello"));
        let stream = executor.execute(&request).await.expect("execute");

        let response = StreamAggregator::new().consume(request.id, stream).await;
        assert_eq!(response.text, "Hi there");
        assert!(!response.is_error);

        let raw = server.await.expect("server").to_lowercase();
        assert!(raw.starts_with("post /rest/app-chat/conversations/new"));
        assert!(raw.contains("origin: https://grok.com"));
        assert!(raw.contains("referer: https://grok.com/"));
        assert!(raw.contains("cookie: sso=token"));
        assert!(raw.contains("\"modelname\":\"grok-3\""));
    }

    #[tokio::test]
    async fn test_error_status_is_external_call_error() {
        let (url, _server) = serve_once("HTTP/1.1 403 Forbidden", "{\"error\":\"no\"}".into()).await;

        let executor = GrokExecutor::with_endpoint("", url).expect("executor");
        let err = executor
            .execute(&RelayRequest::new(json!("hello")))
            .await
            .err()
            .expect("error");

        assert!(matches!(err, Error::ExternalCall { status: 403, .. }));
        assert_eq!(err.to_string(), "HTTP error! Status: 403");
    }
}
