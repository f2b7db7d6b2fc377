//! HTTP implementation of [`LanguageModel`] for Ollama and OpenAI-compatible APIs.
//!
//! Both providers speak a chat-messages protocol; the differences are the
//! endpoint path, how an image is attached and where the answer lives in
//! the response envelope:
//!
//! | Provider | Endpoint | Image | Answer |
//! |----------|----------|-------|--------|
//! | Ollama   | `POST {base}/api/chat` | `messages[].images: [base64]` | `message.content` |
//! | OpenAI   | `POST {base}/chat/completions` | `image_url` data-URL content part | `choices[0].message.content` |
//!
//! Availability is checked before any I/O so a disabled or key-less setup
//! surfaces as [`ModelError::NotConfigured`] rather than a connection error.

use super::{LanguageModel, ModelError, ModelRequest};
use crate::config::{ModelConfig, ProviderKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Upstream error bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 500;

const TEXT_TEMPERATURE: f32 = 0.7;
const TEXT_MAX_TOKENS: usize = 500;
const VISION_TEMPERATURE: f32 = 0.2;
const VISION_MAX_TOKENS: usize = 2000;

/// Model client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpModel {
    config: ModelConfig,
    client: Client,
    timeout_secs: u64,
}

impl HttpModel {
    /// Build a client with a 120 s transport timeout.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        Self::with_timeout(config, 120)
    }

    /// Build a client whose HTTP requests give up after `timeout_secs`.
    pub fn with_timeout(config: ModelConfig, timeout_secs: u64) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(Self {
            config,
            client,
            timeout_secs,
        })
    }

    /// Client configured from the process environment.
    pub fn from_env() -> Result<Self, ModelError> {
        Self::new(ModelConfig::from_env())
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn model_for(&self, request: &ModelRequest) -> &str {
        if request.has_image() {
            &self.config.vision_model
        } else {
            &self.config.model
        }
    }

    async fn call_ollama(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.config.ollama_base_url.trim_end_matches('/'));

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(OllamaMessage {
                role: "system",
                content: system,
                images: Vec::new(),
            });
        }
        messages.push(OllamaMessage {
            role: "user",
            content: &request.user,
            images: request.image.iter().map(|i| i.data.as_str()).collect(),
        });

        let body = OllamaChatRequest {
            model: self.model_for(request),
            messages,
            stream: false,
            options: Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }),
        };

        debug!("Ollama request → {} (model {})", url, body.model);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let text = self.read_success_body(response).await?;

        let parsed: OllamaChatResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;
        Ok(parsed
            .message
            .and_then(|m| m.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn call_openai(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let url = format!(
            "{}/chat/completions",
            self.config.openai_base_url.trim_end_matches('/')
        );
        let key = self
            .config
            .openai_api_key
            .as_deref()
            .ok_or_else(|| ModelError::NotConfigured {
                hint: self.config.setup_hint(),
            })?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(OpenAiMessage {
                role: "system",
                content: OpenAiContent::Text(system),
            });
        }
        let user_content = match &request.image {
            Some(image) => OpenAiContent::Parts(vec![
                OpenAiPart::Text {
                    text: &request.user,
                },
                OpenAiPart::ImageUrl {
                    image_url: OpenAiImageUrl {
                        url: image.to_data_url(),
                    },
                },
            ]),
            None => OpenAiContent::Text(&request.user),
        };
        messages.push(OpenAiMessage {
            role: "user",
            content: user_content,
        });

        let (default_temp, default_tokens) = if request.has_image() {
            (VISION_TEMPERATURE, VISION_MAX_TOKENS)
        } else {
            (TEXT_TEMPERATURE, TEXT_MAX_TOKENS)
        };
        let body = OpenAiChatRequest {
            model: self.model_for(request),
            messages,
            max_tokens: request.max_tokens.unwrap_or(default_tokens),
            temperature: request.temperature.unwrap_or(default_temp),
        };

        debug!("OpenAI request → {} (model {})", url, body.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let text = self.read_success_body(response).await?;

        let parsed: OpenAiChatResponse = serde_json::from_str(&text)
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    /// Read the body, mapping non-2xx statuses to [`ModelError::Http`].
    async fn read_success_body(&self, response: reqwest::Response) -> Result<String, ModelError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(ModelError::Http {
                provider: self.name().to_string(),
                status: status.as_u16(),
                body: truncate_chars(&text, MAX_ERROR_BODY),
            });
        }
        Ok(text)
    }

    fn transport_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            ModelError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    fn name(&self) -> &str {
        self.config.provider.as_str()
    }

    fn is_available(&self) -> bool {
        self.config.is_available()
    }

    fn setup_hint(&self) -> String {
        self.config.setup_hint()
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        if !self.is_available() {
            return Err(ModelError::NotConfigured {
                hint: self.setup_hint(),
            });
        }
        match self.config.provider {
            ProviderKind::Ollama => self.call_ollama(request).await,
            ProviderKind::OpenAi => self.call_openai(request).await,
        }
    }
}

/// Cut `s` to at most `max` characters, marking the cut.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: OpenAiContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OpenAiContent<'a> {
    Text(&'a str),
    Parts(Vec<OpenAiPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Serialize)]
struct OpenAiImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: Option<ResponseMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageData;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ollama_config(base: &str) -> ModelConfig {
        ModelConfig {
            enabled: true,
            provider: ProviderKind::Ollama,
            ollama_base_url: base.to_string(),
            ..ModelConfig::default()
        }
    }

    fn openai_config(base: &str) -> ModelConfig {
        ModelConfig {
            enabled: true,
            provider: ProviderKind::OpenAi,
            model: "gpt-4o-mini".into(),
            vision_model: "gpt-4o".into(),
            openai_api_key: Some("sk-test".into()),
            openai_base_url: base.to_string(),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("ééééé", 2), "éé\u{2026}");
    }

    #[tokio::test]
    async fn disabled_config_fails_before_io() {
        let model = HttpModel::new(ModelConfig::default()).unwrap();
        let err = model
            .complete(&ModelRequest::text("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn ollama_vision_request_sends_images_and_reads_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_string_contains("\"images\":[\"QUJD\"]"))
            .and(body_string_contains("\"model\":\"llava\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "  {\"type\":\"text\"}  " }
            })))
            .mount(&server)
            .await;

        let model = HttpModel::new(ollama_config(&server.uri())).unwrap();
        let req = ModelRequest::vision("sys", "classify", ImageData::new("QUJD", "image/jpeg"));
        let out = model.complete(&req).await.expect("response");
        assert_eq!(out, "{\"type\":\"text\"}");
    }

    #[tokio::test]
    async fn ollama_text_request_uses_text_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_string_contains("\"model\":\"llama3.2\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "content": "Shop the sale" }
            })))
            .mount(&server)
            .await;

        let model = HttpModel::new(ollama_config(&format!("{}/", server.uri()))).unwrap();
        let out = model
            .complete(&ModelRequest::text("sys", "suggest"))
            .await
            .unwrap();
        assert_eq!(out, "Shop the sale");
    }

    #[tokio::test]
    async fn non_success_status_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model \"llava\" not found"))
            .mount(&server)
            .await;

        let model = HttpModel::new(ollama_config(&server.uri())).unwrap();
        let err = model
            .complete(&ModelRequest::text("s", "u"))
            .await
            .unwrap_err();
        match err {
            ModelError::Http { status, body, .. } => {
                assert_eq!(status, 404);
                assert!(body.contains("not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn openai_vision_request_uses_data_url_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_string_contains("data:image/jpeg;base64,QUJD"))
            .and(body_string_contains("\"model\":\"gpt-4o\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "role": "assistant", "content": "{\"type\":\"spacer\"}" } } ]
            })))
            .mount(&server)
            .await;

        let model = HttpModel::new(openai_config(&server.uri())).unwrap();
        let req = ModelRequest::vision("sys", "classify", ImageData::new("QUJD", "image/jpeg"));
        let out = model.complete(&req).await.unwrap();
        assert_eq!(out, "{\"type\":\"spacer\"}");
    }

    #[tokio::test]
    async fn openai_malformed_envelope_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let model = HttpModel::new(openai_config(&server.uri())).unwrap();
        let err = model
            .complete(&ModelRequest::text("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MalformedResponse(_)));
    }
}
