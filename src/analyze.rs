//! Top-level analysis entry points.
//!
//! [`analyze_image`] is the primary API: image bytes in, normalized areas
//! out. It picks one of two strategies from [`AnalysisConfig::strategy`]:
//!
//! * **Segmented** (default): pixel segmentation, per-block classification
//!   of flat bands, normalization and text merging. A block whose
//!   classification fails becomes a spacer; the analysis still succeeds and
//!   the failure is listed in [`AnalysisOutput::fallbacks`].
//! * **Whole image**: one vision call for the complete layout. There is no
//!   safe default for a whole layout, so any failure is
//!   [`Img2EmailError::AnalysisFailed`].

use crate::area::Area;
use crate::config::{AnalysisConfig, AnalysisStrategy};
use crate::error::{BlockError, Img2EmailError};
use crate::model::{LanguageModel, ModelError, ModelRequest};
use crate::pipeline::classify::{classify_blocks, BlockOutcome};
use crate::pipeline::encode::encode_crop;
use crate::pipeline::input::decode_image;
use crate::pipeline::normalize::{normalize_raw, KindFallback, NormalizeOptions, RawArea};
use crate::pipeline::parse::parse_whole_image_areas;
use crate::pipeline::segment::{segment_decoded, Block, BlockKind, SegmentParams};
use crate::prompts::{whole_image_prompt, WHOLE_IMAGE_SYSTEM};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Counters and timings for one analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub total_blocks: usize,
    pub flat_blocks: usize,
    pub slice_blocks: usize,
    pub fallback_blocks: usize,
    pub model_calls: u32,
    pub area_count: usize,
    pub segment_duration_ms: u64,
    pub classify_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of [`analyze_image`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    /// Normalized areas, sorted by `y`.
    pub areas: Vec<Area>,
    /// Segmentation result. Empty for the whole-image strategy.
    pub blocks: Vec<Block>,
    /// Blocks that fell back to spacers.
    pub fallbacks: Vec<BlockError>,
    pub stats: AnalysisStats,
}

/// Analyze an email design image.
///
/// `width` and `height` are the image's pixel dimensions; every area in the
/// output lies inside `0..width × 0..height`.
///
/// # Errors
/// Only fatal errors are returned:
/// - a zero dimension or undecodable bytes
/// - the model reports itself unavailable (checked before any work)
/// - any failure of the whole-image strategy
pub async fn analyze_image(
    bytes: &[u8],
    width: u32,
    height: u32,
    model: &dyn LanguageModel,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, Img2EmailError> {
    if width == 0 || height == 0 {
        return Err(Img2EmailError::InvalidDimensions { width, height });
    }
    if !model.is_available() {
        return Err(Img2EmailError::ModelNotConfigured {
            provider: model.name().to_string(),
            hint: model.setup_hint(),
        });
    }

    info!(
        "Analyzing {}x{} image ({} bytes, {:?} strategy)",
        width,
        height,
        bytes.len(),
        config.strategy
    );

    match config.strategy {
        AnalysisStrategy::Segmented => analyze_segmented(bytes, width, height, model, config).await,
        AnalysisStrategy::WholeImage => analyze_whole(bytes, width, height, model, config).await,
    }
}

/// Synchronous wrapper around [`analyze_image`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_image_sync(
    bytes: &[u8],
    width: u32,
    height: u32,
    model: &dyn LanguageModel,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, Img2EmailError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Img2EmailError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze_image(bytes, width, height, model, config))
}

/// Segment an image into blocks without calling a model.
pub async fn segment_only(
    bytes: &[u8],
    width: u32,
    height: u32,
    config: &AnalysisConfig,
) -> Result<Vec<Block>, Img2EmailError> {
    crate::pipeline::segment::segment_image(bytes, width, height, config).await
}

// ── Segmented strategy ───────────────────────────────────────────────────

async fn analyze_segmented(
    bytes: &[u8],
    width: u32,
    height: u32,
    model: &dyn LanguageModel,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, Img2EmailError> {
    let total_start = Instant::now();

    // ── Step 1: Decode and segment ───────────────────────────────────────
    let params = SegmentParams::from(config);
    let owned = bytes.to_vec();
    let (image, blocks) = tokio::task::spawn_blocking(move || {
        let img = decode_image(&owned)?;
        let blocks = segment_decoded(&img, width, height, &params);
        Ok::<_, Img2EmailError>((Arc::new(img), blocks))
    })
    .await
    .map_err(|e| Img2EmailError::Internal(format!("Segmentation task panicked: {}", e)))??;
    let segment_duration_ms = total_start.elapsed().as_millis() as u64;

    let flat = blocks.iter().filter(|b| b.kind == BlockKind::Flat).count();
    info!(
        "Segmented into {} blocks ({} flat, {} slice) in {}ms",
        blocks.len(),
        flat,
        blocks.len() - flat,
        segment_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_start(blocks.len());
    }

    // ── Step 2: Classify ─────────────────────────────────────────────────
    let classify_start = Instant::now();
    let outcomes = classify_blocks(model, image, width, &blocks, config).await;
    let classify_duration_ms = classify_start.elapsed().as_millis() as u64;

    // ── Step 3: Normalize ────────────────────────────────────────────────
    // Block-derived areas are full-width and at least min_block_height tall,
    // so the height floor never drops a block.
    let opts = NormalizeOptions::new(width, height)
        .with_min_size(
            config.min_area_width,
            config.min_area_height.min(config.min_block_height),
        )
        .with_text_merge_gap(config.text_merge_gap)
        .with_fallback(KindFallback::Spacer);

    let model_calls = outcomes.iter().map(|o| o.model_calls).sum();
    let (raws, fallbacks) = split_outcomes(outcomes);
    let areas = normalize_raw(raws, &opts);

    let stats = AnalysisStats {
        total_blocks: blocks.len(),
        flat_blocks: flat,
        slice_blocks: blocks.len() - flat,
        fallback_blocks: fallbacks.len(),
        model_calls,
        area_count: areas.len(),
        segment_duration_ms,
        classify_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    if !fallbacks.is_empty() {
        warn!("{} of {} flat blocks fell back to spacers", fallbacks.len(), flat);
    }
    info!(
        "Analysis complete: {} areas from {} blocks, {}ms total",
        stats.area_count, stats.total_blocks, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_complete(blocks.len(), areas.len());
    }

    Ok(AnalysisOutput {
        areas,
        blocks,
        fallbacks,
        stats,
    })
}

fn split_outcomes(outcomes: Vec<BlockOutcome>) -> (Vec<RawArea>, Vec<BlockError>) {
    let mut raws = Vec::with_capacity(outcomes.len());
    let mut fallbacks = Vec::new();
    for outcome in outcomes {
        if let Some(e) = outcome.error {
            fallbacks.push(e);
        }
        raws.push(outcome.raw);
    }
    (raws, fallbacks)
}

// ── Whole-image strategy ─────────────────────────────────────────────────

async fn analyze_whole(
    bytes: &[u8],
    width: u32,
    height: u32,
    model: &dyn LanguageModel,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, Img2EmailError> {
    let total_start = Instant::now();

    let owned = bytes.to_vec();
    let quality = config.crop_quality;
    let image_data = tokio::task::spawn_blocking(move || {
        let img = decode_image(&owned)?;
        encode_crop(&img, 0, img.height(), quality).map_err(|e| Img2EmailError::UnsupportedImage {
            detail: format!("JPEG encoding failed: {}", e),
        })
    })
    .await
    .map_err(|e| Img2EmailError::Internal(format!("Encoding task panicked: {}", e)))??;

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_start(1);
        cb.on_block_start(0, 1);
    }

    let request = ModelRequest::vision(WHOLE_IMAGE_SYSTEM, whole_image_prompt(width, height), image_data)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

    let call_start = Instant::now();
    let (text, calls) = match complete_with_retry(model, &request, config).await {
        Ok(v) => v,
        Err(e) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_block_fallback(0, 1, &e.to_string());
            }
            return Err(e);
        }
    };
    let classify_duration_ms = call_start.elapsed().as_millis() as u64;

    let raws = parse_whole_image_areas(&text);
    if raws.is_empty() {
        let preview: String = text.chars().take(200).collect();
        return Err(Img2EmailError::AnalysisFailed {
            detail: format!("model response contained no areas: {}", preview),
        });
    }
    debug!("Whole-image response parsed into {} raw areas", raws.len());

    let opts = NormalizeOptions::new(width, height)
        .with_min_size(config.min_area_width, config.min_area_height)
        .with_text_merge_gap(config.text_merge_gap)
        .with_fallback(KindFallback::Slice);
    let areas = normalize_raw(raws, &opts);

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_complete(1, areas.len());
    }

    let stats = AnalysisStats {
        model_calls: calls,
        area_count: areas.len(),
        classify_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        ..Default::default()
    };
    info!(
        "Whole-image analysis complete: {} areas, {}ms total",
        stats.area_count, stats.total_duration_ms
    );

    Ok(AnalysisOutput {
        areas,
        blocks: Vec::new(),
        fallbacks: Vec::new(),
        stats,
    })
}

/// Call the model with the configured timeout and retries. Returns the text
/// and the number of calls made.
async fn complete_with_retry(
    model: &dyn LanguageModel,
    request: &ModelRequest,
    config: &AnalysisConfig,
) -> Result<(String, u32), Img2EmailError> {
    let mut last_err = String::from("Unknown error");
    let mut calls = 0u32;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Whole-image analysis: retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        calls += 1;
        match timeout(Duration::from_secs(config.api_timeout_secs), model.complete(request)).await {
            Ok(Ok(text)) => return Ok((text, calls)),
            Ok(Err(ModelError::NotConfigured { hint })) => {
                return Err(Img2EmailError::ModelNotConfigured {
                    provider: model.name().to_string(),
                    hint,
                });
            }
            Ok(Err(e)) => {
                warn!("Whole-image analysis: attempt {} failed: {}", attempt + 1, e);
                last_err = e.to_string();
            }
            Err(_) => {
                warn!(
                    "Whole-image analysis: attempt {} timed out after {}s",
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = format!("model call timed out after {}s", config.api_timeout_secs);
            }
        }
    }

    Err(Img2EmailError::AnalysisFailed { detail: last_err })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::AreaKind;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            Ok(self.0.to_string())
        }
    }

    struct Off;

    #[async_trait]
    impl LanguageModel for Off {
        fn name(&self) -> &str {
            "off"
        }

        fn is_available(&self) -> bool {
            false
        }

        async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            panic!("must not be called");
        }
    }

    fn white_png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[tokio::test]
    async fn zero_dimension_is_rejected() {
        let err = analyze_image(&[], 0, 10, &Fixed("{}"), &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Img2EmailError::InvalidDimensions { width: 0, .. }));
    }

    #[tokio::test]
    async fn unavailable_model_is_a_configuration_error() {
        let err = analyze_image(&white_png(10, 10), 10, 10, &Off, &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn white_image_becomes_one_spacer() {
        let out = analyze_image(
            &white_png(120, 200),
            120,
            200,
            &Fixed(r#"{"type":"spacer","content":"","bgColor":""}"#),
            &AnalysisConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.areas.len(), 1);
        assert_eq!(out.areas[0].kind, AreaKind::Spacer);
        assert_eq!((out.areas[0].y, out.areas[0].height), (0, 200));
        assert_eq!(out.stats.model_calls, 1);
    }

    #[tokio::test]
    async fn whole_image_unknown_type_becomes_slice() {
        let config = AnalysisConfig::builder()
            .strategy(AnalysisStrategy::WholeImage)
            .build()
            .unwrap();
        let out = analyze_image(
            &white_png(100, 100),
            100,
            100,
            &Fixed(r#"[{"type":"hero","x":0,"y":0,"width":100,"height":100}]"#),
            &config,
        )
        .await
        .unwrap();
        assert_eq!(out.areas.len(), 1);
        assert_eq!(out.areas[0].kind, AreaKind::Slice);
        assert!(out.blocks.is_empty());
    }

    #[tokio::test]
    async fn whole_image_without_areas_fails() {
        let config = AnalysisConfig::builder()
            .strategy(AnalysisStrategy::WholeImage)
            .build()
            .unwrap();
        let err = analyze_image(&white_png(100, 100), 100, 100, &Fixed("no idea"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Img2EmailError::AnalysisFailed { .. }));
    }

    #[test]
    fn sync_wrapper_runs_its_own_runtime() {
        let out = analyze_image_sync(
            &white_png(60, 60),
            60,
            60,
            &Fixed(r##"{"type":"color","bgColor":"#ffffff"}"##),
            &AnalysisConfig::default(),
        )
        .unwrap();
        assert_eq!(out.areas[0].kind, AreaKind::Color);
    }
}
