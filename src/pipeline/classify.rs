//! Block classification: one segmented block → one raw area.
//!
//! Graphic blocks need no model: they become full-width `slice` areas. Flat
//! blocks are cropped, sent to the vision model with
//! [`crate::prompts::BLOCK_CLASSIFIER_USER`], and the answer is parsed into a
//! `text | button | color | spacer` area.
//!
//! ## Failure policy
//!
//! [`classify_block`] never returns an error. A failed crop, a transport
//! error, a non-2xx status, a timeout or exhausted retries all produce a
//! `spacer` area covering the block plus a [`BlockError`] on the outcome.
//! One unreadable band must not cost the user the whole layout.
//!
//! ## Retry strategy
//!
//! Each attempt is bounded by `tokio::time::timeout(api_timeout_secs)`.
//! Failed attempts are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`), up to `max_retries` times. A
//! `NotConfigured` answer is not retried.

use crate::area::AreaKind;
use crate::config::AnalysisConfig;
use crate::error::BlockError;
use crate::model::{LanguageModel, ModelError, ModelRequest};
use crate::pipeline::encode::encode_crop;
use crate::pipeline::normalize::RawArea;
use crate::pipeline::parse::parse_block_classification;
use crate::pipeline::segment::{Block, BlockKind};
use crate::prompts::{BLOCK_CLASSIFIER_SYSTEM, BLOCK_CLASSIFIER_USER};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// The result of classifying one block.
#[derive(Debug, Clone)]
pub struct BlockOutcome {
    /// Block position in segmentation order.
    pub index: usize,
    pub raw: RawArea,
    /// Set when the block fell back to a spacer.
    pub error: Option<BlockError>,
    /// Model calls made for this block (0 for slices and crop failures).
    pub model_calls: u32,
    pub duration_ms: u64,
}

impl BlockOutcome {
    fn new(index: usize, raw: RawArea, start: Instant) -> Self {
        Self {
            index,
            raw,
            error: None,
            model_calls: 0,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Classify every block, flat ones concurrently, returning outcomes in
/// block order.
pub async fn classify_blocks(
    model: &dyn LanguageModel,
    image: Arc<DynamicImage>,
    image_width: u32,
    blocks: &[Block],
    config: &AnalysisConfig,
) -> Vec<BlockOutcome> {
    let total = blocks.len();

    let mut outcomes: Vec<BlockOutcome> = stream::iter(blocks.iter().enumerate().map(|(index, block)| {
        let image = Arc::clone(&image);
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_block_start(index, total);
            }
            let outcome = classify_block(model, image, image_width, index, block, config).await;
            if let Some(ref cb) = config.progress_callback {
                match &outcome.error {
                    None => {
                        let kind = outcome
                            .raw
                            .kind
                            .as_deref()
                            .and_then(AreaKind::parse)
                            .unwrap_or(AreaKind::Spacer);
                        cb.on_block_complete(index, total, kind);
                    }
                    Some(e) => cb.on_block_fallback(index, total, &e.to_string()),
                }
            }
            outcome
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    outcomes.sort_by_key(|o| o.index);
    outcomes
}

/// Classify one block. Never fails; see the module docs.
pub async fn classify_block(
    model: &dyn LanguageModel,
    image: Arc<DynamicImage>,
    image_width: u32,
    index: usize,
    block: &Block,
    config: &AnalysisConfig,
) -> BlockOutcome {
    let start = Instant::now();

    if block.kind == BlockKind::Slice {
        let raw = RawArea::new(AreaKind::Slice, 0, block.y, image_width, block.height);
        return BlockOutcome::new(index, raw, start);
    }

    let spacer = RawArea::new(AreaKind::Spacer, 0, block.y, image_width, block.height);

    // ── Crop ─────────────────────────────────────────────────────────────
    let (y, height, quality) = (block.y, block.height, config.crop_quality);
    let crop = tokio::task::spawn_blocking(move || encode_crop(&image, y, height, quality)).await;
    let image_data = match crop {
        Ok(Ok(data)) => data,
        Ok(Err(e)) => return crop_failed(index, spacer, start, e.to_string()),
        Err(e) => return crop_failed(index, spacer, start, format!("crop task panicked: {}", e)),
    };

    let request = ModelRequest::vision(BLOCK_CLASSIFIER_SYSTEM, BLOCK_CLASSIFIER_USER, image_data)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

    // ── Model call with retry ────────────────────────────────────────────
    let mut last_err: Option<BlockError> = None;
    let mut calls = 0u32;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Block {}: retry {}/{} after {}ms",
                index, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        calls += 1;
        match timeout(Duration::from_secs(config.api_timeout_secs), model.complete(&request)).await {
            Ok(Ok(text)) => {
                let preview: String = text.chars().take(200).collect();
                debug!("Block {} (y={}) classified: {}", index, block.y, preview);

                let cls = parse_block_classification(&text);
                let raw = RawArea {
                    kind: Some(cls.kind.as_str().to_string()),
                    content: cls.content,
                    bg_color: cls.bg_color.or_else(|| Some(block.background_hint.clone())),
                    ..spacer
                };
                let mut outcome = BlockOutcome::new(index, raw, start);
                outcome.model_calls = calls;
                return outcome;
            }
            Ok(Err(e)) => {
                warn!("Block {}: attempt {} failed: {}", index, attempt + 1, e);
                let fatal_for_block = matches!(e, ModelError::NotConfigured { .. });
                last_err = Some(BlockError::ModelFailed {
                    index,
                    retries: attempt,
                    detail: e.to_string(),
                });
                if fatal_for_block {
                    break;
                }
            }
            Err(_) => {
                warn!(
                    "Block {}: attempt {} timed out after {}s",
                    index,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(BlockError::Timeout {
                    index,
                    secs: config.api_timeout_secs,
                });
            }
        }
    }

    let error = last_err.unwrap_or_else(|| BlockError::ModelFailed {
        index,
        retries: config.max_retries,
        detail: "Unknown error".to_string(),
    });
    warn!("{}; using spacer", error);

    let mut outcome = BlockOutcome::new(index, spacer, start);
    outcome.error = Some(error);
    outcome.model_calls = calls;
    outcome
}

fn crop_failed(index: usize, spacer: RawArea, start: Instant, detail: String) -> BlockOutcome {
    warn!("Block {}: crop failed: {}; using spacer", index, detail);
    let mut outcome = BlockOutcome::new(index, spacer, start);
    outcome.error = Some(BlockError::CropFailed { index, detail });
    outcome
}
