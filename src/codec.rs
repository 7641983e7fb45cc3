//! Decode, resize, WebP encode and the safe write path shared by every writer.
//!
//! Nothing is written to its final name until the bytes on disk have been read
//! back and decoded. Temp files are hidden (`.asset-squeeze-*.tmp`) so the
//! walker never mistakes an interrupted write for a finished output.

use crate::cancel::CancelToken;
use crate::constants::{SHARPEN_SIGMA, SHARPEN_THRESHOLD, TEMP_FILE_PREFIX, TEMP_FILE_SUFFIX};
use crate::error::{PipelineError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Decodes an image, returning it with the file size in bytes.
pub fn load_image(path: &Path) -> Result<(DynamicImage, u64)> {
    let file_size = fs::metadata(path)
        .map_err(|e| PipelineError::filesystem(path, e))?
        .len();

    let img = ImageReader::open(path)
        .map_err(|e| PipelineError::filesystem(path, e))?
        .with_guessed_format()
        .map_err(|e| PipelineError::filesystem(path, e))?
        .decode()
        .map_err(|source| PipelineError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    Ok((img, file_size))
}

/// Height that keeps the aspect ratio at `target_width`, rounded, at least 1.
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height.max(1);
    }
    let scaled = (height as u64 * target_width as u64 + width as u64 / 2) / width as u64;
    scaled.max(1) as u32
}

/// Downscales to `target_width` with Lanczos3. Never upscales.
pub fn resize_to_width(img: &DynamicImage, target_width: u32) -> Cow<'_, DynamicImage> {
    let (width, height) = img.dimensions();
    if target_width == 0 || target_width >= width {
        return Cow::Borrowed(img);
    }
    let target_height = scaled_height(width, height, target_width);
    tracing::debug!(
        "Resizing {}x{} -> {}x{}",
        width,
        height,
        target_width,
        target_height
    );
    Cow::Owned(img.resize_exact(target_width, target_height, FilterType::Lanczos3))
}

pub fn sharpen(img: &DynamicImage) -> DynamicImage {
    img.unsharpen(SHARPEN_SIGMA, SHARPEN_THRESHOLD)
}

/// Lossy WebP encode in memory. `effort` maps onto libwebp's `method`.
pub fn encode_webp(img: &DynamicImage, quality: u8, effort: u8, path: &Path) -> Result<Vec<u8>> {
    let (width, height) = img.dimensions();
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        encode_with(
            webp::Encoder::from_rgba(rgba.as_raw(), width, height),
            quality,
            effort,
        )
    } else {
        let rgb = img.to_rgb8();
        encode_with(
            webp::Encoder::from_rgb(rgb.as_raw(), width, height),
            quality,
            effort,
        )
    };

    encoded.map_err(|reason| PipelineError::Encode {
        path: path.to_path_buf(),
        reason,
    })
}

fn encode_with(
    encoder: webp::Encoder<'_>,
    quality: u8,
    effort: u8,
) -> std::result::Result<Vec<u8>, String> {
    let mut config =
        webp::WebPConfig::new().map_err(|_| "failed to initialise WebP config".to_string())?;
    config.quality = quality as f32;
    config.method = effort as i32;

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| format!("{:?}", e))?;
    if memory.is_empty() {
        return Err("encoder produced no data".to_string());
    }
    Ok(memory.to_vec())
}

/// Decodes the file at `path` and returns its dimensions.
pub fn verify_decodable(path: &Path) -> Result<(u32, u32)> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| PipelineError::Verification(path.to_path_buf(), e.to_string()))?;
    let img = reader
        .decode()
        .map_err(|e| PipelineError::Verification(path.to_path_buf(), e.to_string()))?;
    Ok(img.dimensions())
}

fn verify_written(path: &Path, expected: &[u8]) -> Result<()> {
    let on_disk = fs::read(path).map_err(|e| PipelineError::filesystem(path, e))?;
    if on_disk != expected {
        return Err(PipelineError::Verification(
            path.to_path_buf(),
            format!(
                "read back {} bytes, expected {} bytes",
                on_disk.len(),
                expected.len()
            ),
        ));
    }
    verify_decodable(path)?;
    Ok(())
}

/// Writes `bytes` to a hidden temp file next to `dest`, syncs and verifies it,
/// then renames it over `dest`. The temp file is removed on any failure and
/// `dest` is never left half-written.
pub fn write_atomically(dest: &Path, bytes: &[u8], cancel: &CancelToken) -> Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| PipelineError::filesystem(dir, e))?;

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .suffix(TEMP_FILE_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| PipelineError::filesystem(dir, e))?;

    temp.write_all(bytes)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| PipelineError::filesystem(temp.path(), e))?;

    verify_written(temp.path(), bytes)?;

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    temp.persist(dest)
        .map_err(|e| PipelineError::filesystem(dest, e.error))?;
    tracing::debug!("Wrote {} ({} bytes)", dest.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_scaled_height() {
        assert_eq!(scaled_height(3000, 2000, 1920), 1280);
        assert_eq!(scaled_height(1000, 333, 500), 167);
        assert_eq!(scaled_height(5000, 1, 10), 1);
    }

    #[test]
    fn test_resize_to_width_downscales() {
        let source = gradient(400, 200);
        let img = resize_to_width(&source, 100);
        assert!(matches!(img, Cow::Owned(_)));
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn test_resize_to_width_never_upscales() {
        let source = gradient(80, 60);
        let img = resize_to_width(&source, 100);
        assert!(matches!(img, Cow::Borrowed(_)));
        assert_eq!(img.dimensions(), (80, 60));
    }

    #[test]
    fn test_sharpen_keeps_dimensions() {
        let img = sharpen(&gradient(32, 16));
        assert_eq!(img.dimensions(), (32, 16));
    }

    #[test]
    fn test_encode_webp_produces_riff() {
        let bytes = encode_webp(&gradient(64, 48), 80, 4, Path::new("x.webp")).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_encode_webp_with_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([10, 20, 30, 128])));
        let bytes = encode_webp(&img, 80, 4, Path::new("x.webp")).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (20, 10));
    }

    #[test]
    fn test_write_atomically_replaces_destination() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("room-optimized.webp");
        fs::write(&dest, b"stale").unwrap();

        let bytes = encode_webp(&gradient(32, 32), 80, 4, &dest).unwrap();
        write_atomically(&dest, &bytes, &CancelToken::new()).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), bytes);
        let leftovers = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomically_rejects_undecodable_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("room-optimized.webp");

        let result = write_atomically(&dest, b"not an image", &CancelToken::new());
        assert!(matches!(result, Err(PipelineError::Verification(_, _))));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_atomically_respects_cancel() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("room-optimized.webp");
        let cancel = CancelToken::new();
        cancel.cancel();

        let bytes = encode_webp(&gradient(16, 16), 80, 4, &dest).unwrap();
        let result = write_atomically(&dest, &bytes, &cancel);
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_load_image_missing() {
        let result = load_image(Path::new("nonexistent.jpg"));
        assert!(matches!(result, Err(PipelineError::FileNotFound(_))));
    }

    #[test]
    fn test_load_image_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        fs::write(&path, b"fake image data").unwrap();

        let result = load_image(&path);
        assert!(matches!(result, Err(PipelineError::Decode { .. })));
    }
}
