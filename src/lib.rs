//! # edgequake-img2email
//!
//! Turn an email design image into table-based HTML email.
//!
//! ## Why this crate?
//!
//! A designer hands over a flat PNG of an email. Slicing it by hand into a
//! table layout that survives Outlook, Gmail and mobile clients is tedious.
//! This crate segments the image into horizontal bands by pixel analysis,
//! asks a vision model what each plain band contains (text, button, colour
//! stripe, blank space), keeps graphic bands as image crops, and renders the
//! result as a 600 px table email with inlined CSS and VML buttons.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Image
//!  │
//!  ├─ 1. Segment    row histograms → flat / slice blocks (spawn_blocking)
//!  ├─ 2. Classify   concurrent vision calls for flat blocks, spacer fallback
//!  ├─ 3. Normalize  clamp, default styles, merge adjacent text
//!  ├─ 4. Slices     crop slice areas to JPEG files (optional)
//!  └─ 5. Render     table-based HTML, MSO button fallback, CSS inlining
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_img2email::{analyze_image, generate_email_html, AnalysisConfig, HttpModel, RenderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Model access from AI_ENABLED / AI_PROVIDER / AI_VISION_MODEL / ...
//!     let model = HttpModel::from_env()?;
//!     let bytes = std::fs::read("design.png")?;
//!     let img = image::load_from_memory(&bytes)?;
//!
//!     let output = analyze_image(&bytes, img.width(), img.height(), &model, &AnalysisConfig::default()).await?;
//!     eprintln!("{} areas, {} fallbacks", output.areas.len(), output.fallbacks.len());
//!
//!     let html = generate_email_html(&output.areas, &RenderConfig::default())?;
//!     println!("{}", html);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img2email` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-img2email = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod area;
pub mod config;
pub mod error;
pub mod html;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod slices;
pub mod suggest;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_image, analyze_image_sync, segment_only, AnalysisOutput, AnalysisStats};
pub use area::{Area, AreaId, AreaKind, AreaStyles, TextAlign};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, AnalysisStrategy, ModelConfig, ProviderKind, RenderConfig,
    RenderConfigBuilder,
};
pub use error::{BlockError, Img2EmailError};
pub use html::{generate_email_html, render_to_file, EmailHtmlGenerator};
pub use model::{HttpModel, ImageData, LanguageModel, ModelError, ModelRequest};
pub use pipeline::segment::{Block, BlockKind};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use slices::{resolve_slices, DirSliceStore, SliceOptions, SliceStore};
pub use suggest::{AssistantStatus, SuggestionKind, TextAssistant};
