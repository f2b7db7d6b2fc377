//! Error types for the edgequake-img2email library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Img2EmailError`] — **Fatal**: the analysis or render cannot proceed at
//!   all (unreadable image, model not configured, whole-image analysis
//!   failed). Returned as `Err(Img2EmailError)` from the top-level functions.
//!
//! * [`BlockError`] — **Non-fatal**: classifying a single flat block failed
//!   (crop glitch, transient API error, timeout). The block becomes a spacer
//!   and the error is recorded in [`crate::analyze::AnalysisOutput::fallbacks`]
//!   so callers can inspect partial success.
//!
//! Model-port failures use [`crate::model::ModelError`]; the pipeline decides
//! per call site whether such a failure is fatal or becomes a [`BlockError`].

use crate::model::ModelError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-img2email library.
#[derive(Debug, Error)]
pub enum Img2EmailError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes could not be decoded as a supported raster image.
    #[error("Unsupported or corrupt image: {detail}")]
    UnsupportedImage { detail: String },

    /// Width or height is zero.
    #[error("Invalid image dimensions {width}x{height}: both must be greater than zero")]
    InvalidDimensions { width: u32, height: u32 },

    // ── Model errors ──────────────────────────────────────────────────────
    /// Model access is disabled or credentials are missing.
    #[error("AI model '{provider}' is not configured.\n{hint}")]
    ModelNotConfigured { provider: String, hint: String },

    /// Whole-image analysis failed; there is no safe default layout.
    #[error(
        "Image analysis failed: {detail}\n\
Check that the model server is running and that the configured model supports vision (e.g. `ollama pull llava`)."
    )]
    AnalysisFailed { detail: String },

    /// A model call made on behalf of the caller failed (text suggestions).
    #[error(transparent)]
    Model(#[from] ModelError),

    // ── Output errors ─────────────────────────────────────────────────────
    /// The CSS inlining pass rejected the generated document.
    #[error("CSS inlining failed: {0}")]
    CssInlineFailed(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Img2EmailError {
    /// True when the error is a setup problem the user can fix by configuring
    /// model access, as opposed to a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Img2EmailError::ModelNotConfigured { .. }
                | Img2EmailError::InvalidConfig(_)
                | Img2EmailError::Model(ModelError::NotConfigured { .. })
        )
    }
}

/// A non-fatal error for a single flat block.
///
/// The block is rendered as a spacer and the overall analysis continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BlockError {
    /// Cropping or encoding the block failed.
    #[error("Block {index}: crop failed: {detail}")]
    CropFailed { index: usize, detail: String },

    /// The model call failed after retries.
    #[error("Block {index}: model call failed after {retries} retries: {detail}")]
    ModelFailed {
        index: usize,
        retries: u32,
        detail: String,
    },

    /// The model call timed out on the last attempt.
    #[error("Block {index}: model call timed out after {secs}s")]
    Timeout { index: usize, secs: u64 },
}

impl BlockError {
    /// Index of the block (in segmentation order) the error belongs to.
    pub fn index(&self) -> usize {
        match self {
            BlockError::CropFailed { index, .. }
            | BlockError::ModelFailed { index, .. }
            | BlockError::Timeout { index, .. } => *index,
        }
    }
}
