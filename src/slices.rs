//! Slice resolution: crop pixel-only areas out of the source image.
//!
//! A `slice` area is just a rectangle of the design; before it can be
//! rendered it needs a URL. [`resolve_slices`] crops each `slice` (and, by
//! default, each `button`) to a JPEG, hands the bytes to a [`SliceStore`],
//! and returns a new area list where
//!
//! * slices become `image` areas whose `content` is the stored URL;
//! * buttons keep their type and get the URL as `content`, which the
//!   generator renders as a linked image CTA.
//!
//! The input list is not modified.

use crate::area::{Area, AreaId, AreaKind};
use crate::error::Img2EmailError;
use crate::pipeline::encode::crop_jpeg;
use crate::pipeline::input::decode_image;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where cropped slices are written.
#[async_trait]
pub trait SliceStore: Send + Sync {
    /// Persist one JPEG crop and return the URL it is served from.
    async fn store(&self, area_id: &AreaId, jpeg: Vec<u8>) -> Result<String, Img2EmailError>;
}

/// Writes slices to `{dir}/{file_prefix}{area_id}.jpg` and serves them from
/// `{url_prefix}/{file_name}`.
#[derive(Debug, Clone)]
pub struct DirSliceStore {
    dir: PathBuf,
    url_prefix: String,
    file_prefix: String,
}

impl DirSliceStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            file_prefix: String::new(),
        }
    }

    /// Prefix every file name, e.g. with a template ID and `_`.
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    fn file_name(&self, area_id: &AreaId) -> String {
        let safe: String = area_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}{}.jpg", self.file_prefix, safe)
    }
}

#[async_trait]
impl SliceStore for DirSliceStore {
    async fn store(&self, area_id: &AreaId, jpeg: Vec<u8>) -> Result<String, Img2EmailError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Img2EmailError::OutputWriteFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        let name = self.file_name(area_id);
        let path = self.dir.join(&name);
        tokio::fs::write(&path, &jpeg)
            .await
            .map_err(|e| Img2EmailError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        debug!("Wrote slice {} ({} bytes)", path.display(), jpeg.len());

        Ok(format!("{}/{}", self.url_prefix, name))
    }
}

/// Options for [`resolve_slices`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceOptions {
    /// Also crop `button` areas into image CTAs. Default: true.
    pub include_buttons: bool,
    /// JPEG quality. Default: 90.
    pub quality: u8,
    /// Multiplier from area coordinates to image pixels, for areas edited
    /// on a canvas narrower than the image. Default: 1.0.
    pub scale: f64,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            include_buttons: true,
            quality: 90,
            scale: 1.0,
        }
    }
}

impl SliceOptions {
    fn wants(&self, kind: AreaKind) -> bool {
        kind == AreaKind::Slice || (self.include_buttons && kind == AreaKind::Button)
    }
}

/// Crop slice (and button) areas and return the list with image URLs filled in.
///
/// Areas whose rectangle falls outside the image are kept unchanged (an
/// unresolved slice renders no row). Store failures are fatal.
pub async fn resolve_slices(
    areas: &[Area],
    image_bytes: &[u8],
    store: &dyn SliceStore,
    options: &SliceOptions,
) -> Result<Vec<Area>, Img2EmailError> {
    let targets: Vec<(usize, [u32; 4])> = areas
        .iter()
        .enumerate()
        .filter(|(_, a)| options.wants(a.kind))
        .map(|(i, a)| (i, scaled_rect(a, options.scale)))
        .collect();

    if targets.is_empty() {
        return Ok(areas.to_vec());
    }

    let bytes = image_bytes.to_vec();
    let quality = options.quality;
    let crops = tokio::task::spawn_blocking(move || {
        let img = decode_image(&bytes)?;
        Ok::<_, Img2EmailError>(
            targets
                .into_iter()
                .map(|(i, [x, y, w, h])| (i, crop_jpeg(&img, x, y, w, h, quality)))
                .collect::<Vec<_>>(),
        )
    })
    .await
    .map_err(|e| Img2EmailError::Internal(format!("Slice crop task panicked: {}", e)))??;

    let mut resolved = areas.to_vec();
    let mut stored = 0usize;
    for (i, crop) in crops {
        let area = &mut resolved[i];
        let jpeg = match crop {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!("Area {}: crop failed ({}); leaving unresolved", area.id, e);
                continue;
            }
        };
        let url = store.store(&area.id, jpeg).await?;
        if area.kind == AreaKind::Slice {
            area.kind = AreaKind::Image;
        }
        area.content = Some(url);
        stored += 1;
    }

    info!("Resolved {} slice crops", stored);
    Ok(resolved)
}

fn scaled_rect(area: &Area, scale: f64) -> [u32; 4] {
    let s = |v: u32| (f64::from(v) * scale).round().max(0.0) as u32;
    [s(area.x), s(area.y), s(area.width), s(area.height)]
}
