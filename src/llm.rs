//! LLM backends used to refine extracted page text.
//!
//! The engine only needs one capability from a model server: send a prompt
//! (optionally with page images) and get text back. That capability is the
//! [`LlmService`] trait. The two shipped backends are variants of
//! [`LlmBackend`], selected by [`ConversionConfig::llm_service`]:
//!
//! | Variant | Endpoint | Auth |
//! |---------|----------|------|
//! | [`LlmBackend::Ollama`] | `POST {ollama_base_url}/api/generate` | none |
//! | [`LlmBackend::OpenAi`] | `POST {openai_base_url}/chat/completions` | bearer key |
//!
//! Every request is a single attempt. Connection failures, timeouts and
//! non-success responses surface immediately as `LLMServiceError`-kind errors.

use crate::config::{ConversionConfig, LlmServiceKind};
use crate::error::Pdf2MdError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One refinement request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmRequest {
    /// System instructions.
    pub system: String,
    /// User prompt (usually the page's Markdown).
    pub prompt: String,
    /// Base64-encoded PNG images attached to the prompt.
    pub images: Vec<String>,
}

/// A text-refinement backend.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Short service identifier, e.g. "ollama".
    fn name(&self) -> &str;

    /// Model the service talks to.
    fn model(&self) -> &str;

    /// Send one request and return the model's reply text.
    async fn complete(&self, request: &LlmRequest) -> Result<String, Pdf2MdError>;
}

/// The shipped LLM backends.
#[derive(Debug, Clone)]
pub enum LlmBackend {
    Ollama(OllamaService),
    OpenAi(OpenAiService),
}

impl LlmBackend {
    /// Construct the backend named by `config.llm_service`.
    ///
    /// No network traffic happens here; the first request is the first contact.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2MdError> {
        let backend = match config.llm_service {
            LlmServiceKind::Ollama => LlmBackend::Ollama(OllamaService::from_config(config)?),
            LlmServiceKind::OpenAi => LlmBackend::OpenAi(OpenAiService::from_config(config)?),
        };
        info!(
            "LLM service: {} (model {}) at {}",
            backend.name(),
            backend.model(),
            config.llm_base_url()
        );
        Ok(backend)
    }
}

#[async_trait]
impl LlmService for LlmBackend {
    fn name(&self) -> &str {
        match self {
            LlmBackend::Ollama(s) => s.name(),
            LlmBackend::OpenAi(s) => s.name(),
        }
    }

    fn model(&self) -> &str {
        match self {
            LlmBackend::Ollama(s) => s.model(),
            LlmBackend::OpenAi(s) => s.model(),
        }
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, Pdf2MdError> {
        match self {
            LlmBackend::Ollama(s) => s.complete(request).await,
            LlmBackend::OpenAi(s) => s.complete(request).await,
        }
    }
}

// ── Shared HTTP plumbing ─────────────────────────────────────────────────

fn build_client(service: &str, timeout_secs: u64) -> Result<reqwest::Client, Pdf2MdError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2MdError::LlmApiError {
            service: service.to_string(),
            message: format!("failed to build HTTP client: {e}"),
        })
}

fn map_send_error(service: &str, endpoint: &str, timeout_secs: u64, e: reqwest::Error) -> Pdf2MdError {
    if e.is_timeout() {
        Pdf2MdError::LlmTimeout {
            service: service.to_string(),
            secs: timeout_secs,
        }
    } else {
        Pdf2MdError::LlmUnreachable {
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Turn a non-success response into an API error carrying a body excerpt.
async fn api_error(service: &str, response: reqwest::Response) -> Pdf2MdError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(300).collect();
    Pdf2MdError::LlmApiError {
        service: service.to_string(),
        message: format!("HTTP {status}: {}", excerpt.trim()),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

// ── Ollama ───────────────────────────────────────────────────────────────

/// Client for Ollama's non-streaming `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    images: &'a [String],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaService {
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2MdError> {
        Ok(Self {
            client: build_client("ollama", config.llm_timeout_secs)?,
            base_url: config.ollama_base_url.clone(),
            model: config.ollama_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.llm_timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        join_url(&self.base_url, "api/generate")
    }
}

#[async_trait]
impl LlmService for OllamaService {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, Pdf2MdError> {
        let endpoint = self.endpoint();
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system,
            images: &request.images,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        debug!(
            "POST {} (model={}, prompt={} chars, images={})",
            endpoint,
            self.model,
            request.prompt.len(),
            request.images.len()
        );

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(self.name(), &endpoint, self.timeout_secs, e))?;

        if !response.status().is_success() {
            return Err(api_error(self.name(), response).await);
        }

        let parsed: OllamaGenerateResponse =
            response.json().await.map_err(|e| Pdf2MdError::LlmApiError {
                service: self.name().to_string(),
                message: format!("unparseable response: {e}"),
            })?;

        if let Some(err) = parsed.error {
            return Err(Pdf2MdError::LlmApiError {
                service: self.name().to_string(),
                message: err,
            });
        }
        if parsed.response.trim().is_empty() {
            return Err(Pdf2MdError::LlmApiError {
                service: self.name().to_string(),
                message: "empty response".into(),
            });
        }
        Ok(parsed.response)
    }
}

// ── OpenAI-compatible ────────────────────────────────────────────────────

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiService")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiService {
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2MdError> {
        let api_key = config
            .openai_api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("No OpenAI API key configured; requests will be sent without authorization");
        }
        Ok(Self {
            client: build_client("openai", config.llm_timeout_secs)?,
            base_url: config.openai_base_url.clone(),
            model: config.openai_model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.llm_timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        join_url(&self.base_url, "chat/completions")
    }

    fn build_messages(request: &LlmRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: vec![ContentPart::Text {
                    text: request.system.clone(),
                }],
            });
        }

        let mut user = vec![ContentPart::Text {
            text: request.prompt.clone(),
        }];
        user.extend(request.images.iter().map(|b64| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/png;base64,{b64}"),
                detail: "high",
            },
        }));
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });
        messages
    }
}

#[async_trait]
impl LlmService for OpenAiService {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, Pdf2MdError> {
        let endpoint = self.endpoint();
        let body = ChatRequest {
            model: &self.model,
            messages: Self::build_messages(request),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            "POST {} (model={}, prompt={} chars, images={})",
            endpoint,
            self.model,
            request.prompt.len(),
            request.images.len()
        );

        let mut builder = self.client.post(&endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_send_error(self.name(), &endpoint, self.timeout_secs, e))?;

        if !response.status().is_success() {
            return Err(api_error(self.name(), response).await);
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| Pdf2MdError::LlmApiError {
            service: self.name().to_string(),
            message: format!("unparseable response: {e}"),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Pdf2MdError::LlmApiError {
                service: self.name().to_string(),
                message: "response contained no message content".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response and hand back the raw request text.
    async fn serve_once(
        status: &'static str,
        body: String,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + content_length {
                        break;
                    }
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn request() -> LlmRequest {
        LlmRequest {
            system: "be precise".into(),
            prompt: "# Page".into(),
            images: vec!["aGVsbG8=".into()],
        }
    }

    #[test]
    fn from_config_picks_variant() {
        let config = ConversionConfig::default();
        let backend = LlmBackend::from_config(&config).unwrap();
        assert!(matches!(backend, LlmBackend::Ollama(_)));
        assert_eq!(backend.model(), "qwen2.5:14b");

        let config = ConversionConfig::builder()
            .llm_service(LlmServiceKind::OpenAi)
            .openai_api_key("sk-test")
            .build()
            .unwrap();
        let backend = LlmBackend::from_config(&config).unwrap();
        assert_eq!(backend.name(), "openai");
        assert_eq!(backend.model(), "gpt-4o-mini");
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("http://localhost:11434/", "/api/generate"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            join_url("https://api.openai.com/v1", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn openai_messages_carry_data_uri() {
        let messages = OpenAiService::build_messages(&request());
        let v = serde_json::to_value(&messages).unwrap();
        assert_eq!(v[0]["role"], "system");
        assert_eq!(v[1]["content"][0]["type"], "text");
        assert_eq!(v[1]["content"][1]["type"], "image_url");
        assert_eq!(
            v[1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,aGVsbG8="
        );
    }

    #[tokio::test]
    async fn ollama_round_trip() {
        let (base, server) =
            serve_once("200 OK", json!({ "response": "# Refined", "done": true }).to_string()).await;
        let config = ConversionConfig::builder()
            .ollama_base_url(base)
            .ollama_model("llama3:8b")
            .build()
            .unwrap();
        let service = OllamaService::from_config(&config).unwrap();

        let reply = service.complete(&request()).await.unwrap();
        assert_eq!(reply, "# Refined");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/generate"));
        assert!(raw.contains("\"model\":\"llama3:8b\""));
        assert!(raw.contains("\"stream\":false"));
        assert!(raw.contains("\"images\":[\"aGVsbG8=\"]"));
    }

    #[tokio::test]
    async fn ollama_error_status_is_api_error() {
        let (base, server) =
            serve_once("404 Not Found", json!({ "error": "model not found" }).to_string()).await;
        let config = ConversionConfig::builder().ollama_base_url(base).build().unwrap();
        let service = OllamaService::from_config(&config).unwrap();

        let err = service.complete(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LlmService);
        assert!(err.to_string().contains("model not found"), "got: {err}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn openai_round_trip_sends_bearer() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "Refined text" } }]
        });
        let (base, server) = serve_once("200 OK", body.to_string()).await;
        let config = ConversionConfig::builder()
            .llm_service(LlmServiceKind::OpenAi)
            .openai_base_url(format!("{base}/v1"))
            .openai_api_key("sk-test")
            .build()
            .unwrap();
        let backend = LlmBackend::from_config(&config).unwrap();

        assert_eq!(backend.complete(&request()).await.unwrap(), "Refined text");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1/chat/completions"));
        assert!(raw.to_lowercase().contains("authorization: bearer sk-test"));
    }

    #[tokio::test]
    async fn openai_empty_choices_is_api_error() {
        let (base, server) = serve_once("200 OK", json!({ "choices": [] }).to_string()).await;
        let config = ConversionConfig::builder()
            .llm_service(LlmServiceKind::OpenAi)
            .openai_base_url(base)
            .openai_api_key("sk-test")
            .build()
            .unwrap();
        let backend = LlmBackend::from_config(&config).unwrap();

        assert!(matches!(
            backend.complete(&request()).await,
            Err(Pdf2MdError::LlmApiError { .. })
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_maps_to_llm_error() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let config = ConversionConfig::builder()
            .ollama_base_url(format!("http://127.0.0.1:{port}"))
            .build()
            .unwrap();
        let backend = LlmBackend::from_config(&config).unwrap();

        let err = backend.complete(&request()).await.unwrap_err();
        assert!(
            matches!(err, Pdf2MdError::LlmUnreachable { .. }),
            "got: {err:?}"
        );
        assert_eq!(err.kind(), ErrorKind::LlmService);
    }
}
