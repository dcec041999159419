use super::models::{ChatCompletionsResponse, ChatRequest};
use crate::util::truncate;
use std::future::Future;
use thiserror::Error;
use tracing::debug;

/// Path appended to the configured base URL.
const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {status}{}", reason_suffix(.reason))]
    Http {
        status: u16,
        reason: Option<String>,
        body: Option<String>,
    },
    #[error("LLM returned empty content")]
    EmptyContent,
    #[error("could not reach the LLM endpoint: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("could not decode the LLM response: {message}")]
    Decode { message: String, body: String },
}

impl LlmError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short, display-safe description including a redacted body preview.
    pub fn user_message(&self) -> String {
        match self {
            LlmError::Http { status, body, .. } => {
                let hint = match status {
                    401 | 403 => " Check the API key in settings.",
                    404 => " Check the base URL and model name.",
                    429 => " Rate limited; wait and try again.",
                    500..=599 => " The service may be temporarily unavailable.",
                    _ => "",
                };
                match body.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
                    Some(body) => format!("{}.{} ({})", self, hint, sanitize_api_response(body)),
                    None => format!("{}.{}", self, hint),
                }
            }
            _ => self.to_string(),
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(" {}", r))
        .unwrap_or_default()
}

/// Sanitize API response content for error messages to prevent credential leakage.
pub(crate) fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
        "gsk_",
    ];

    let truncated = truncate(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated
}

/// Strip trailing slashes so `{base}/chat/completions` never doubles them.
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// Something that can answer an OpenAI-compatible chat-completions request.
pub trait ChatBackend {
    fn chat_completions(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ChatCompletionsResponse, LlmError>> + Send;
}

/// HTTP client for one OpenAI-compatible endpoint
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            normalize_base_url(&self.base_url),
            CHAT_COMPLETIONS_PATH
        )
    }

    /// Perform one request/response exchange.
    ///
    /// Dropping or aborting the returned future abandons the request.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatCompletionsResponse, LlmError> {
        let url = self.endpoint();
        debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(LlmError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            // Body is best-effort; the status alone is enough to report.
            let body = response.text().await.ok();
            debug!(status = status.as_u16(), "chat completion request failed");
            return Err(LlmError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().map(str::to_string),
                body,
            });
        }

        let text = response.text().await.map_err(LlmError::Transport)?;
        serde_json::from_str(&text).map_err(|e| LlmError::Decode {
            message: e.to_string(),
            body: sanitize_api_response(&text),
        })
    }
}

impl ChatBackend for ChatClient {
    async fn chat_completions(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatCompletionsResponse, LlmError> {
        self.send(request).await
    }
}

/// Content of the first choice. Other choices are never consulted.
pub fn pick_assistant_text(response: &ChatCompletionsResponse) -> Result<&str, LlmError> {
    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_deref())
        .filter(|content| !content.is_empty())
        .ok_or(LlmError::EmptyContent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::{AssistantMessage, Choice, Role};
    use futures::future::{AbortHandle, Abortable};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    /// Read one HTTP/1.1 request (headers plus Content-Length body).
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve exactly one canned response; yields the raw request it received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let _ = tx.send(request);
        });
        (format!("http://{}", addr), rx)
    }

    fn request() -> ChatRequest {
        ChatRequest::new("test-model", 0.0, "system prompt", "user prompt")
    }

    #[test]
    fn test_endpoint_strips_trailing_slashes() {
        let client = ChatClient::new("https://api.groq.com/openai/v1///", "k");
        assert_eq!(
            client.endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(normalize_base_url("http://x"), "http://x");
    }

    #[test]
    fn test_pick_assistant_text_uses_first_choice() {
        let response = ChatCompletionsResponse {
            id: "1".to_string(),
            choices: vec![
                Choice {
                    index: 0,
                    message: AssistantMessage {
                        role: Role::Assistant,
                        content: Some("first".to_string()),
                    },
                    finish_reason: None,
                },
                Choice {
                    index: 1,
                    message: AssistantMessage {
                        role: Role::Assistant,
                        content: Some("second".to_string()),
                    },
                    finish_reason: None,
                },
            ],
        };
        assert_eq!(pick_assistant_text(&response).unwrap(), "first");
    }

    #[test]
    fn test_pick_assistant_text_rejects_missing_or_empty_content() {
        let empty = ChatCompletionsResponse::default();
        assert!(matches!(
            pick_assistant_text(&empty),
            Err(LlmError::EmptyContent)
        ));

        let blank = ChatCompletionsResponse {
            id: "1".to_string(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: Role::Assistant,
                    content: Some(String::new()),
                },
                finish_reason: Some("stop".to_string()),
            }],
        };
        assert!(matches!(
            pick_assistant_text(&blank),
            Err(LlmError::EmptyContent)
        ));
    }

    #[test]
    fn test_sanitize_redacts_credentials() {
        assert!(sanitize_api_response("invalid api_key provided").contains("redacted"));
        assert_eq!(sanitize_api_response("model not found"), "model not found");
    }

    #[tokio::test]
    async fn test_sends_bearer_token_to_chat_completions_path() {
        let (base, request_rx) = serve_once(
            "200 OK",
            r#"{"id":"cmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#,
        )
        .await;
        let client = ChatClient::new(format!("{}/v1/", base), "secret-token");

        let response = client.send(&request()).await.unwrap();
        assert_eq!(pick_assistant_text(&response).unwrap(), "ok");

        let raw = request_rx.await.unwrap();
        assert!(raw.starts_with("POST /v1/chat/completions HTTP/1.1"));
        let lower = raw.to_lowercase();
        assert!(lower.contains("authorization: bearer secret-token"));
        assert!(lower.contains("content-type: application/json"));
        assert!(raw.contains(r#""model":"test-model""#));
        assert!(raw.contains(r#""role":"system""#));
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_http_error_with_status_and_body() {
        let (base, _rx) = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"slow down"}}"#,
        )
        .await;
        let client = ChatClient::new(base, "k");

        let err = client.send(&request()).await.unwrap_err();
        assert_eq!(err.status(), Some(429));
        match &err {
            LlmError::Http { body, .. } => {
                assert!(body.as_deref().unwrap_or_default().contains("slow down"));
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
        assert!(err.to_string().contains("429"));
        assert!(err.user_message().contains("Rate limited"));
    }

    #[tokio::test]
    async fn test_empty_choices_only_fail_when_picking_text() {
        let (base, _rx) = serve_once("200 OK", r#"{"id":"cmpl-2","choices":[]}"#).await;
        let client = ChatClient::new(base, "k");

        let response = client.send(&request()).await.unwrap();
        assert!(response.choices.is_empty());
        assert!(matches!(
            pick_assistant_text(&response),
            Err(LlmError::EmptyContent)
        ));
    }

    #[tokio::test]
    async fn test_undecodable_success_body_is_a_decode_error() {
        let (base, _rx) = serve_once("200 OK", "<html>gateway</html>").await;
        let client = ChatClient::new(base, "k");

        let err = client.send(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_abort_abandons_in_flight_request() {
        // Accepts the connection but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = ChatClient::new(format!("http://{}", addr), "k");
        let (handle, registration) = AbortHandle::new_pair();
        let req = request();
        let pending = Abortable::new(client.send(&req), registration);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.abort();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("abort should resolve the request promptly");
        assert!(outcome.is_err());
    }
}
