use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("AI service returned no content")]
    EmptyResponse,
    #[error("AI service unavailable: {0}")]
    Unavailable(String),
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

/// A document sent along with the prompt.
#[derive(Debug, Clone, Copy)]
pub struct Attachment<'a> {
    pub filename: &'a str,
    pub media_type: &'a str,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub attachment: Option<Attachment<'a>>,
}

impl<'a> CompletionRequest<'a> {
    pub fn text(prompt: &'a str) -> Self {
        Self { prompt, attachment: None }
    }
}

/// Abstraction over the AI completion service.
/// Implementations return the model's raw text reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError>;
}

// ── HTTP backend ──────────────────────────────────────────────────────────────

pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(settings: &AiSettings) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }

    fn body(&self, request: &CompletionRequest<'_>) -> serde_json::Value {
        let mut content = vec![json!({ "type": "text", "text": request.prompt })];
        if let Some(a) = request.attachment {
            let encoded = base64::engine::general_purpose::STANDARD.encode(a.data);
            content.push(json!({
                "type": "file",
                "file": {
                    "filename": a.filename,
                    "file_data": format!("data:{};base64,{encoded}", a.media_type),
                }
            }));
        }
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": content }],
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        tracing::debug!(model = %self.model, reply = %text, "AI completion received");
        Ok(text)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

type Responder = dyn Fn(&CompletionRequest<'_>) -> Result<String, CompletionError> + Send + Sync;

/// Answers from a closure instead of the network, and counts calls.
pub struct MockCompletion {
    responder: Box<Responder>,
    calls: AtomicUsize,
}

impl MockCompletion {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CompletionRequest<'_>) -> Result<String, CompletionError> + Send + Sync + 'static,
    {
        Self { responder: Box::new(f), calls: AtomicUsize::new(0) }
    }

    /// Always replies with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::from_fn(move |_| Ok(text.clone()))
    }

    /// Always fails as if the service were unreachable.
    pub fn failing(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::from_fn(move |_| Err(CompletionError::Unavailable(reason.clone())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_returns_preset_text() {
        let m = MockCompletion::replying("{\"ok\": true}");
        let reply = m.complete(CompletionRequest::text("hi")).await.unwrap();
        assert_eq!(reply, "{\"ok\": true}");
        assert_eq!(m.calls(), 1);
    }

    #[tokio::test]
    async fn mock_failing_reports_unavailable() {
        let m = MockCompletion::failing("offline");
        let err = m.complete(CompletionRequest::text("hi")).await.unwrap_err();
        assert!(matches!(err, CompletionError::Unavailable(_)));
    }

    #[tokio::test]
    async fn mock_sees_attachment() {
        let m = MockCompletion::from_fn(|req| {
            Ok(req.attachment.map(|a| a.filename.to_string()).unwrap_or_default())
        });
        let data = b"%PDF-1.4";
        let req = CompletionRequest {
            prompt: "extract",
            attachment: Some(Attachment { filename: "a.pdf", media_type: "application/pdf", data }),
        };
        assert_eq!(m.complete(req).await.unwrap(), "a.pdf");
    }

    #[test]
    fn request_body_embeds_pdf_as_data_url() {
        let client = OpenAiClient::new(&AiSettings::default()).unwrap();
        let req = CompletionRequest {
            prompt: "extract",
            attachment: Some(Attachment {
                filename: "r.pdf",
                media_type: "application/pdf",
                data: b"abc",
            }),
        };
        let body = client.body(&req);
        assert_eq!(body["model"], "gpt-4o-mini");
        let file = &body["messages"][0]["content"][1]["file"];
        assert_eq!(file["filename"], "r.pdf");
        assert_eq!(file["file_data"], "data:application/pdf;base64,YWJj");
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let settings = AiSettings { base_url: "http://localhost:8080/v1/".into(), ..Default::default() };
        let client = OpenAiClient::new(&settings).unwrap();
        assert_eq!(client.endpoint, "http://localhost:8080/v1/chat/completions");
    }
}
