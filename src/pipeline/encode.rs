//! Crop encoding: a rectangle of the decoded image → JPEG bytes / base64.
//!
//! Block crops go to the vision model as base64 JPEG. JPEG keeps flat bands
//! of text tiny; the classifier only needs to read labels and colours, not
//! reproduce them pixel-exactly.

use crate::model::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageError};
use tracing::debug;

/// JPEG-encode the rectangle `(x, y, width, height)` of `img`.
///
/// The rectangle is clipped to the image; a height or width of zero is
/// raised to one pixel. A rectangle starting outside the image is an error.
pub fn crop_jpeg(
    img: &DynamicImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, ImageError> {
    let (iw, ih) = img.dimensions();
    if x >= iw || y >= ih {
        return Err(ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::DimensionMismatch,
        )));
    }
    let width = width.max(1).min(iw - x);
    let height = height.max(1).min(ih - y);

    let crop = img.crop_imm(x, y, width, height).to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(&crop)?;
    Ok(buf)
}

/// Encode the full-width band `[y, y + height)` for the block classifier.
pub fn encode_crop(img: &DynamicImage, y: u32, height: u32, quality: u8) -> Result<ImageData, ImageError> {
    let buf = crop_jpeg(img, 0, y, img.width(), height, quality)?;
    let data = ImageData::from_bytes(&buf, "image/jpeg");
    debug!("Encoded crop y={} h={} → {} bytes base64", y, height, data.data.len());
    Ok(data)
}
