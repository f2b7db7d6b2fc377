//! Pixel segmentation: split an image into horizontal flat / graphic blocks.
//!
//! Email designs are vertical stacks of full-width bands. A band on a plain
//! light background (a paragraph, a button on white, a blank gap) is cheap
//! to classify and can be rebuilt as live HTML; anything busier (a photo, a
//! gradient hero) is kept as pixels. This module draws that line without a
//! model, by looking at colour histograms of downsampled rows.
//!
//! ## Algorithm
//!
//! 1. Resize to `sample_width` × `round(h · sample_width / w)` (exact fill).
//! 2. For every sampled row, bucket each channel into `histogram_buckets`
//!    bins. *Dominance* is the mean over channels of the fullest bin's
//!    share; *lightness* is the mean of the rounded channel means.
//! 3. A row is flat iff dominance > 0.55 and lightness > 180.
//! 4. Run-length encode rows into blocks and scale back to source pixels.
//! 5. Fold blocks shorter than `min_block_height` into a neighbour until
//!    none remain, then re-pack `y` so the blocks tile `[0, height)` exactly.
//!
//! Decoding and resizing are CPU-bound, so [`segment_image`] runs them in
//! `spawn_blocking`.

use crate::config::AnalysisConfig;
use crate::error::Img2EmailError;
use crate::pipeline::input::decode_image;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Whether a row / block sits on a plain light background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Plain light background; sent to the classifier.
    Flat,
    /// Graphic content; kept as an image crop.
    Slice,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Flat => "flat",
            BlockKind::Slice => "slice",
        }
    }
}

/// Classification of one sampled row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowClass {
    pub kind: BlockKind,
    /// Mean row colour, `#rrggbb`.
    pub dominant_color: String,
}

/// A contiguous horizontal band of the source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub kind: BlockKind,
    pub y: u32,
    pub height: u32,
    /// Mean colour of the first row of the band, `#rrggbb`.
    pub background_hint: String,
}

impl Block {
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// The segmentation knobs from [`AnalysisConfig`], copyable into a blocking task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentParams {
    pub sample_width: u32,
    pub histogram_buckets: usize,
    pub dominance_threshold: f64,
    pub lightness_threshold: f64,
    pub min_block_height: u32,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for SegmentParams {
    fn from(c: &AnalysisConfig) -> Self {
        Self {
            sample_width: c.sample_width,
            histogram_buckets: c.histogram_buckets,
            dominance_threshold: c.dominance_threshold,
            lightness_threshold: c.lightness_threshold,
            min_block_height: c.min_block_height,
        }
    }
}

/// Decode `bytes` and segment the image.
///
/// `width` and `height` are the source dimensions the blocks are expressed
/// in. The returned blocks are contiguous and cover `[0, height)`.
pub async fn segment_image(
    bytes: &[u8],
    width: u32,
    height: u32,
    config: &AnalysisConfig,
) -> Result<Vec<Block>, Img2EmailError> {
    if width == 0 || height == 0 {
        return Err(Img2EmailError::InvalidDimensions { width, height });
    }
    let bytes = bytes.to_vec();
    let params = SegmentParams::from(config);

    tokio::task::spawn_blocking(move || {
        let img = decode_image(&bytes)?;
        Ok::<_, Img2EmailError>(segment_decoded(&img, width, height, &params))
    })
    .await
    .map_err(|e| Img2EmailError::Internal(format!("Segmentation task panicked: {}", e)))?
}

/// Segment an already decoded image. Blocking.
pub fn segment_decoded(img: &DynamicImage, width: u32, height: u32, params: &SegmentParams) -> Vec<Block> {
    let sample_w = params.sample_width.max(1);
    let sample_h = sample_height(width, height, sample_w);

    let rgb = img.to_rgb8();
    let sampled = image::imageops::resize(&rgb, sample_w, sample_h, FilterType::Triangle);
    let blocks = segment_pixels(sampled.as_raw(), sample_w, sample_h, height, params);

    info!(
        "Segmented {}x{} image into {} blocks ({} flat)",
        width,
        height,
        blocks.len(),
        blocks.iter().filter(|b| b.kind == BlockKind::Flat).count()
    );
    blocks
}

/// Rows in the downsampled image: `round(h · sample_w / w)`, at least 1.
pub fn sample_height(width: u32, height: u32, sample_w: u32) -> u32 {
    let h = (f64::from(height) * f64::from(sample_w) / f64::from(width.max(1))).round();
    (h as u32).max(1)
}

/// Segment a packed RGB8 buffer of `sample_w × sample_h` pixels into blocks
/// in the coordinate space of an image `image_height` pixels tall.
pub fn segment_pixels(
    rgb: &[u8],
    sample_w: u32,
    sample_h: u32,
    image_height: u32,
    params: &SegmentParams,
) -> Vec<Block> {
    let rows = classify_rows(rgb, sample_w, sample_h, params);
    let raw = run_length_blocks(&rows, image_height);
    debug!("{} raw blocks before merging", raw.len());
    merge_small_blocks(raw, params.min_block_height, image_height)
}

/// Classify every sampled row as flat or slice.
pub fn classify_rows(rgb: &[u8], sample_w: u32, sample_h: u32, params: &SegmentParams) -> Vec<RowClass> {
    let w = sample_w as usize;
    let buckets = params.histogram_buckets.clamp(1, 256);
    let mut hist = vec![0u32; buckets * 3];
    let mut rows = Vec::with_capacity(sample_h as usize);

    for row in rgb.chunks_exact(w * 3).take(sample_h as usize) {
        hist.iter_mut().for_each(|c| *c = 0);
        let mut sums = [0u64; 3];

        for px in row.chunks_exact(3) {
            for (ch, &v) in px.iter().enumerate() {
                hist[ch * buckets + v as usize * buckets / 256] += 1;
                sums[ch] += u64::from(v);
            }
        }

        let dominance = (0..3)
            .map(|ch| {
                let max = hist[ch * buckets..(ch + 1) * buckets]
                    .iter()
                    .copied()
                    .max()
                    .unwrap_or(0);
                f64::from(max) / w as f64
            })
            .sum::<f64>()
            / 3.0;

        let means = sums.map(|s| (s as f64 / w as f64).round() as u8);
        let lightness = means.iter().map(|&m| f64::from(m)).sum::<f64>() / 3.0;

        let kind = if dominance > params.dominance_threshold && lightness > params.lightness_threshold {
            BlockKind::Flat
        } else {
            BlockKind::Slice
        };
        rows.push(RowClass {
            kind,
            dominant_color: format!("#{:02x}{:02x}{:02x}", means[0], means[1], means[2]),
        });
    }
    rows
}

/// Group consecutive rows of the same kind and scale them to source pixels.
fn run_length_blocks(rows: &[RowClass], image_height: u32) -> Vec<Block> {
    if rows.is_empty() {
        return Vec::new();
    }
    let scale = f64::from(image_height) / rows.len() as f64;
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < rows.len() {
        let start = i;
        let kind = rows[i].kind;
        while i < rows.len() && rows[i].kind == kind {
            i += 1;
        }
        let y = ((start as f64 * scale).round() as u32).min(image_height);
        let end = ((i as f64 * scale).round() as u32).min(image_height);
        blocks.push(Block {
            kind,
            y,
            height: end.saturating_sub(y),
            background_hint: rows[start].dominant_color.clone(),
        });
    }
    blocks
}

/// Fold blocks shorter than `min_height` into a neighbour until none remain.
///
/// A short block joins the previous block when one exists and either shares
/// its kind or is the last block; otherwise it is absorbed by the next block,
/// whose kind and hint survive. A lone block is never merged. Afterwards `y`
/// is re-packed from 0 and the last block is extended to `image_height`.
pub fn merge_small_blocks(blocks: Vec<Block>, min_height: u32, image_height: u32) -> Vec<Block> {
    let mut arr = blocks;
    let mut changed = true;

    while changed {
        changed = false;
        let len = arr.len();
        let mut out: Vec<Block> = Vec::with_capacity(len);

        for j in 0..len {
            let cur = arr[j].clone();
            if cur.height < min_height && len > 1 {
                let has_next = j + 1 < len;
                match out.last_mut() {
                    Some(prev) if !has_next || prev.kind == cur.kind => {
                        prev.height += cur.height;
                        changed = true;
                    }
                    _ if has_next => {
                        let next = &mut arr[j + 1];
                        next.y = cur.y;
                        next.height += cur.height;
                        changed = true;
                    }
                    _ => out.push(cur),
                }
            } else {
                out.push(cur);
            }
        }
        arr = out;
    }

    let mut cursor = 0u32;
    for b in &mut arr {
        b.y = cursor;
        cursor += b.height;
    }
    if let Some(last) = arr.last_mut() {
        last.height += image_height.saturating_sub(cursor);
    }
    arr
}
