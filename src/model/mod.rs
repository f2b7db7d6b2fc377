//! The language-model port.
//!
//! The pipeline never talks HTTP directly. It hands a [`ModelRequest`] to
//! an injected [`LanguageModel`] and gets text back, so tests can swap in a
//! deterministic fake and production can pick a provider at runtime
//! ([`http::HttpModel`]).

pub mod http;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

pub use http::HttpModel;

/// Failure of a single model call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Model access is disabled or credentials are missing. Raised before any I/O.
    #[error("AI is not configured. {hint}")]
    NotConfigured { hint: String },

    /// The provider answered with a non-2xx status.
    #[error("{provider}: HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// Connection, DNS, TLS or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call exceeded its deadline.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered 2xx but the envelope was not the expected JSON.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// An image attached to a request, already base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Standard base64, no data-URL prefix.
    pub data: String,
    pub mime_type: String,
}

impl ImageData {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Encode raw bytes.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(STANDARD.encode(bytes), mime_type)
    }

    /// `data:<mime>;base64,<data>` form used by OpenAI-style APIs.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// One prompt for the model: optional system text, user text, optional image.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub user: String,
    pub image: Option<ImageData>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl ModelRequest {
    /// A text-only request.
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: user.into(),
            image: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// A request carrying an image.
    pub fn vision(system: impl Into<String>, user: impl Into<String>, image: ImageData) -> Self {
        Self {
            image: Some(image),
            ..Self::text(system, user)
        }
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Anything that can answer a [`ModelRequest`] with text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Whether calls can be attempted at all. Checked before any pipeline work.
    fn is_available(&self) -> bool {
        true
    }

    /// Remediation text shown when [`LanguageModel::is_available`] is false.
    fn setup_hint(&self) -> String {
        String::from("Configure model access before running analysis.")
    }

    /// Submit the request and return the raw response text.
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}
