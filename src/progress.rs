//! Progress-callback trait for per-block analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline classifies each block.
//!
//! # Example
//!
//! ```rust
//! use edgequake_img2email::{AnalysisConfig, AnalysisProgressCallback, AreaKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_block_complete(&self, index: usize, total: usize, kind: AreaKind) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("block {}/{} → {}", index + 1, total, kind);
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::area::AreaKind;
use std::sync::Arc;

/// Called by the analysis pipeline as it processes each block.
///
/// Implementations must be `Send + Sync`: flat blocks are classified
/// concurrently, so `on_block_*` may be called from several tasks at once.
/// All methods default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once segmentation is done.
    ///
    /// # Arguments
    /// * `total_blocks` — number of blocks that will be classified
    fn on_analysis_start(&self, total_blocks: usize) {
        let _ = total_blocks;
    }

    /// Called just before a block is classified.
    ///
    /// # Arguments
    /// * `index` — 0-indexed block position (top to bottom)
    /// * `total` — total blocks
    fn on_block_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a block produced a classified area.
    fn on_block_complete(&self, index: usize, total: usize, kind: AreaKind) {
        let _ = (index, total, kind);
    }

    /// Called when a block fell back to a spacer after a failure.
    fn on_block_fallback(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after normalization.
    ///
    /// # Arguments
    /// * `total_blocks` — number of blocks classified
    /// * `area_count`   — number of areas in the final list (after merging)
    fn on_analysis_complete(&self, total_blocks: usize, area_count: usize) {
        let _ = (total_blocks, area_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
