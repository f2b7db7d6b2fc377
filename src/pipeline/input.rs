//! Input resolution: turn a user-supplied path or URL into image bytes.
//!
//! The image is small enough to keep in memory, so URLs are downloaded
//! straight into a buffer. The format is checked from the magic bytes
//! (`image::guess_format`) before returning so callers get a meaningful
//! error rather than a decoder failure deep inside the pipeline.

use crate::error::Img2EmailError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::path::PathBuf;
use tracing::{debug, info};

/// Uploads wider than this are scaled down by [`prepare_image`].
pub const MAX_PREPARED_WIDTH: u32 = 1200;

/// JPEG quality used by [`prepare_image`].
pub const PREPARED_QUALITY: u8 = 90;

/// Image bytes with their decoded dimensions.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to validated image bytes.
///
/// If the input is a URL, download it. If the input is a local file,
/// validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<LoadedImage, Img2EmailError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else if input.contains("://") {
        return Err(Img2EmailError::InvalidInput {
            input: input.to_string(),
        });
    } else {
        read_local(input).await?
    };
    inspect_bytes(bytes)
}

/// Validate the format of in-memory bytes and read their dimensions.
pub fn inspect_bytes(bytes: Vec<u8>) -> Result<LoadedImage, Img2EmailError> {
    let format = detect_format(&bytes)?;
    let img = decode_image(&bytes)?;
    Ok(LoadedImage {
        format,
        width: img.width(),
        height: img.height(),
        bytes,
    })
}

/// Sniff the format from magic bytes; only PNG and JPEG are accepted.
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, Img2EmailError> {
    let format = image::guess_format(bytes).map_err(|e| Img2EmailError::UnsupportedImage {
        detail: e.to_string(),
    })?;
    match format {
        ImageFormat::Png | ImageFormat::Jpeg => Ok(format),
        other => Err(Img2EmailError::UnsupportedImage {
            detail: format!("{:?} images are not supported; use PNG or JPEG", other),
        }),
    }
}

/// Decode bytes into an image. Blocking.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, Img2EmailError> {
    image::load_from_memory(bytes).map_err(|e| Img2EmailError::UnsupportedImage {
        detail: e.to_string(),
    })
}

/// Normalise an upload: at most 1200 px wide (never enlarged), re-encoded
/// as JPEG at quality 90.
///
/// Analysis coordinates refer to the prepared image, so callers should
/// persist and analyse the returned bytes, not the original upload.
pub async fn prepare_image(bytes: &[u8]) -> Result<LoadedImage, Img2EmailError> {
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || prepare_blocking(&bytes))
        .await
        .map_err(|e| Img2EmailError::Internal(format!("Image preparation task panicked: {}", e)))?
}

fn prepare_blocking(bytes: &[u8]) -> Result<LoadedImage, Img2EmailError> {
    detect_format(bytes)?;
    let img = decode_image(bytes)?;

    let img = if img.width() > MAX_PREPARED_WIDTH {
        let height = (f64::from(img.height()) * f64::from(MAX_PREPARED_WIDTH) / f64::from(img.width()))
            .round()
            .max(1.0) as u32;
        debug!(
            "Scaling {}x{} upload to {}x{}",
            img.width(),
            img.height(),
            MAX_PREPARED_WIDTH,
            height
        );
        img.resize_exact(MAX_PREPARED_WIDTH, height, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, PREPARED_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| Img2EmailError::UnsupportedImage {
            detail: format!("JPEG encoding failed: {}", e),
        })?;

    Ok(LoadedImage {
        bytes: out,
        format: ImageFormat::Jpeg,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Read a local file, mapping I/O errors to input errors.
async fn read_local(path_str: &str) -> Result<Vec<u8>, Img2EmailError> {
    let path = PathBuf::from(path_str);

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read local image: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(Img2EmailError::PermissionDenied { path })
        }
        Err(_) => Err(Img2EmailError::FileNotFound { path }),
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, Img2EmailError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Img2EmailError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let to_error = |e: reqwest::Error| {
        if e.is_timeout() {
            Img2EmailError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Img2EmailError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(to_error)?;

    if !response.status().is_success() {
        return Err(Img2EmailError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(to_error)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/design.png"));
        assert!(is_url("http://example.com/design.png"));
        assert!(!is_url("/tmp/design.png"));
        assert!(!is_url("design.png"));
        assert!(!is_url(""));
    }

    #[test]
    fn detect_format_accepts_png_and_rejects_text() {
        assert_eq!(detect_format(&png_bytes(2, 2)).unwrap(), ImageFormat::Png);
        let err = detect_format(b"%PDF-1.7 not an image").unwrap_err();
        assert!(matches!(err, Img2EmailError::UnsupportedImage { .. }));
    }

    #[test]
    fn inspect_reads_dimensions() {
        let loaded = inspect_bytes(png_bytes(7, 3)).unwrap();
        assert_eq!((loaded.width, loaded.height), (7, 3));
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.png", 5).await.unwrap_err();
        assert!(matches!(err, Img2EmailError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_invalid_input() {
        let err = resolve_input("ftp://example.com/a.png", 5).await.unwrap_err();
        assert!(matches!(err, Img2EmailError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn local_file_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.png");
        std::fs::write(&path, png_bytes(4, 4)).unwrap();
        let loaded = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(loaded.format, ImageFormat::Png);
    }

    #[tokio::test]
    async fn prepare_scales_wide_images_down() {
        let prepared = prepare_image(&png_bytes(2400, 100)).await.unwrap();
        assert_eq!((prepared.width, prepared.height), (1200, 50));
        assert_eq!(prepared.format, ImageFormat::Jpeg);
        assert_eq!(detect_format(&prepared.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn prepare_never_enlarges() {
        let prepared = prepare_image(&png_bytes(300, 80)).await.unwrap();
        assert_eq!((prepared.width, prepared.height), (300, 80));
    }
}
