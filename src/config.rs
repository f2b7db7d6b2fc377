//! Configuration types for analysis, rendering and model access.
//!
//! Analysis behaviour is controlled through [`AnalysisConfig`], rendering
//! through [`RenderConfig`], and model access through [`ModelConfig`]. Each
//! is built via a builder whose `build()` validates the combination, so a
//! config that exists is a config the pipeline can run with.

use crate::error::Img2EmailError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Analysis ─────────────────────────────────────────────────────────────

/// How the image is turned into areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnalysisStrategy {
    /// Pixel segmentation into horizontal blocks, one small model call per
    /// flat block. Graphic blocks become slices without a model call. (default)
    #[default]
    Segmented,
    /// One model call over the whole image returning every area with
    /// coordinates. Failures are fatal.
    WholeImage,
}

/// Configuration for image analysis.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_img2email::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .concurrency(8)
///     .min_block_height(40)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Analysis strategy. Default: [`AnalysisStrategy::Segmented`].
    pub strategy: AnalysisStrategy,

    /// Width in pixels the image is downsampled to before row analysis. Default: 80.
    ///
    /// Small enough that the per-row scan is trivial, large enough that a
    /// line of dark text on white still leaves the background bucket dominant.
    pub sample_width: u32,

    /// Number of histogram buckets per channel. Default: 8.
    pub histogram_buckets: usize,

    /// A row is flat only if its average dominance exceeds this. Default: 0.55.
    pub dominance_threshold: f64,

    /// A row is flat only if its lightness exceeds this (0–255). Default: 180.
    pub lightness_threshold: f64,

    /// Blocks shorter than this (source pixels) are merged into a neighbour. Default: 30.
    pub min_block_height: u32,

    /// Areas narrower than this are discarded. Default: 50.
    pub min_area_width: u32,

    /// Areas shorter than this are discarded. Default: 36.
    pub min_area_height: u32,

    /// Adjacent text areas separated by at most this many pixels are merged. Default: 25.
    pub text_merge_gap: u32,

    /// Number of concurrent block classification calls. Default: 4.
    pub concurrency: usize,

    /// Per model call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Retries per block after the first failed attempt. Default: 1.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// JPEG quality for block crops sent to the model. Default: 85.
    pub crop_quality: u8,

    /// Sampling temperature for classification. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 2000.
    pub max_tokens: usize,

    /// Optional progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strategy: AnalysisStrategy::default(),
            sample_width: 80,
            histogram_buckets: 8,
            dominance_threshold: 0.55,
            lightness_threshold: 180.0,
            min_block_height: 30,
            min_area_width: 50,
            min_area_height: 36,
            text_merge_gap: 25,
            concurrency: 4,
            api_timeout_secs: 60,
            max_retries: 1,
            retry_backoff_ms: 500,
            crop_quality: 85,
            temperature: 0.2,
            max_tokens: 2000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("strategy", &self.strategy)
            .field("sample_width", &self.sample_width)
            .field("histogram_buckets", &self.histogram_buckets)
            .field("dominance_threshold", &self.dominance_threshold)
            .field("lightness_threshold", &self.lightness_threshold)
            .field("min_block_height", &self.min_block_height)
            .field("min_area_width", &self.min_area_width)
            .field("min_area_height", &self.min_area_height)
            .field("text_merge_gap", &self.text_merge_gap)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn strategy(mut self, strategy: AnalysisStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn sample_width(mut self, px: u32) -> Self {
        self.config.sample_width = px;
        self
    }

    pub fn histogram_buckets(mut self, n: usize) -> Self {
        self.config.histogram_buckets = n;
        self
    }

    pub fn dominance_threshold(mut self, t: f64) -> Self {
        self.config.dominance_threshold = t;
        self
    }

    pub fn lightness_threshold(mut self, t: f64) -> Self {
        self.config.lightness_threshold = t;
        self
    }

    pub fn min_block_height(mut self, px: u32) -> Self {
        self.config.min_block_height = px;
        self
    }

    pub fn min_area_size(mut self, width: u32, height: u32) -> Self {
        self.config.min_area_width = width;
        self.config.min_area_height = height;
        self
    }

    pub fn text_merge_gap(mut self, px: u32) -> Self {
        self.config.text_merge_gap = px;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn crop_quality(mut self, q: u8) -> Self {
        self.config.crop_quality = q.clamp(1, 100);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, Img2EmailError> {
        let c = &self.config;
        if c.sample_width == 0 {
            return Err(Img2EmailError::InvalidConfig(
                "sample width must be ≥ 1".into(),
            ));
        }
        if c.histogram_buckets == 0 || c.histogram_buckets > 256 {
            return Err(Img2EmailError::InvalidConfig(format!(
                "histogram buckets must be 1–256, got {}",
                c.histogram_buckets
            )));
        }
        if !(0.0..=1.0).contains(&c.dominance_threshold) {
            return Err(Img2EmailError::InvalidConfig(format!(
                "dominance threshold must be 0–1, got {}",
                c.dominance_threshold
            )));
        }
        if !(0.0..=255.0).contains(&c.lightness_threshold) {
            return Err(Img2EmailError::InvalidConfig(format!(
                "lightness threshold must be 0–255, got {}",
                c.lightness_threshold
            )));
        }
        if c.min_block_height == 0 {
            return Err(Img2EmailError::InvalidConfig(
                "minimum block height must be ≥ 1".into(),
            ));
        }
        if c.min_area_width == 0 || c.min_area_height == 0 {
            return Err(Img2EmailError::InvalidConfig(
                "minimum area size must be ≥ 1×1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Img2EmailError::InvalidConfig(
                "API timeout must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Configuration for the email HTML generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Width of the email container in pixels. Default: 600.
    pub email_width: u32,
    /// Background colour of the container. Default: `#ffffff`.
    pub background_color: String,
    /// Base URL prepended to relative image paths. Default: none.
    pub base_url: Option<String>,
    /// `lang` attribute of the document. Default: `en`.
    pub lang: String,
    /// Document `<title>`. Default: `Email`.
    pub title: String,
    /// Run the CSS inlining pass. Default: true.
    pub inline_css: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            email_width: 600,
            background_color: "#ffffff".to_string(),
            base_url: None,
            lang: "en".to_string(),
            title: "Email".to_string(),
            inline_css: true,
        }
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn email_width(mut self, px: u32) -> Self {
        self.config.email_width = px;
        self
    }

    pub fn background_color(mut self, color: impl Into<String>) -> Self {
        self.config.background_color = color.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.config.base_url = if url.is_empty() { None } else { Some(url) };
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.config.lang = lang.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn inline_css(mut self, v: bool) -> Self {
        self.config.inline_css = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, Img2EmailError> {
        let c = &self.config;
        if !(200..=2000).contains(&c.email_width) {
            return Err(Img2EmailError::InvalidConfig(format!(
                "email width must be 200–2000px, got {}",
                c.email_width
            )));
        }
        if crate::pipeline::parse::sanitize_hex_color(&c.background_color).is_none() {
            return Err(Img2EmailError::InvalidConfig(format!(
                "background colour must be #rgb or #rrggbb, got '{}'",
                c.background_color
            )));
        }
        Ok(self.config)
    }
}

// ── Model access ─────────────────────────────────────────────────────────

/// Which HTTP API the model client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama server (`/api/chat`). (default)
    #[default]
    Ollama,
    /// OpenAI-compatible chat completions (`/chat/completions`).
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
        }
    }

    /// Parse a provider name; unknown names fall back to Ollama.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => ProviderKind::OpenAi,
            _ => ProviderKind::Ollama,
        }
    }
}

/// Configuration for model access.
///
/// [`ModelConfig::from_env`] reads the same variables the rest of the
/// product uses (`AI_ENABLED`, `AI_PROVIDER`, `AI_MODEL`, `AI_VISION_MODEL`,
/// `OLLAMA_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_BASE_URL`).
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Master switch. Default: false.
    pub enabled: bool,
    pub provider: ProviderKind,
    /// Model for text-only requests. Default: `llama3.2`.
    pub model: String,
    /// Model for requests carrying an image. Default: `llava`.
    pub vision_model: String,
    pub ollama_base_url: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: ProviderKind::Ollama,
            model: "llama3.2".to_string(),
            vision_model: "llava".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("vision_model", &self.vision_model)
            .field("ollama_base_url", &self.ollama_base_url)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_base_url", &self.openai_base_url)
            .finish()
    }
}

impl ModelConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let model = get("AI_MODEL").unwrap_or(defaults.model);
        let vision_model = get("AI_VISION_MODEL")
            .or_else(|| get("AI_MODEL"))
            .unwrap_or(defaults.vision_model);

        Self {
            enabled: get("AI_ENABLED").is_some_and(|v| v.trim() == "true"),
            provider: get("AI_PROVIDER")
                .map(|p| ProviderKind::parse(&p))
                .unwrap_or_default(),
            model,
            vision_model,
            ollama_base_url: get("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
        }
    }

    /// Model access is usable: enabled, and OpenAI has a key.
    pub fn is_available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        !(self.provider == ProviderKind::OpenAi && self.openai_api_key.is_none())
    }

    /// Actionable setup guidance for the current configuration.
    pub fn setup_hint(&self) -> String {
        if !self.enabled {
            return "Set AI_ENABLED=true and AI_PROVIDER=ollama (with OLLAMA_BASE_URL) or AI_PROVIDER=openai (with OPENAI_API_KEY). For image analysis use a vision model, e.g. AI_VISION_MODEL=llava and `ollama pull llava`.".to_string();
        }
        match self.provider {
            ProviderKind::OpenAi if self.openai_api_key.is_none() => {
                "AI_PROVIDER=openai requires OPENAI_API_KEY.".to_string()
            }
            _ => "Model access is configured.".to_string(),
        }
    }
}
