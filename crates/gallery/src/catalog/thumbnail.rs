use std::path::Path;

use image::{DynamicImage, ImageReader, imageops::FilterType};

use super::storage::write_atomically;

pub const THUMBNAIL_SIZE: u32 = 300;
const THUMBNAIL_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    AlreadyPresent,
    Generated,
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("image decode error: {0}")]
    DecodeError(String),
    #[error("image encode error: {0}")]
    EncodeError(String),
    #[error("thumbnail io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ThumbnailService;

impl ThumbnailService {
    /// Make sure a thumbnail exists at `target` for the image at `source`.
    ///
    /// An existing target is never regenerated, even if the source changed since.
    /// Concurrent callers may both render; each rename is atomic and the output is
    /// deterministic, so the last writer wins without a torn file.
    pub fn ensure(source: &Path, target: &Path) -> Result<ThumbnailOutcome, ThumbnailError> {
        if target.exists() {
            return Ok(ThumbnailOutcome::AlreadyPresent);
        }

        let jpeg_bytes = Self::render(source)?;
        write_atomically(target, &jpeg_bytes)?;
        Ok(ThumbnailOutcome::Generated)
    }

    /// Decode `source` and return the cover-cropped JPEG thumbnail bytes.
    pub fn render(source: &Path) -> Result<Vec<u8>, ThumbnailError> {
        let img = ImageReader::open(source)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| ThumbnailError::DecodeError(e.to_string()))?;

        let thumbnail = cover_fit(&img, THUMBNAIL_SIZE);
        encode_jpeg(&thumbnail, THUMBNAIL_JPEG_QUALITY)
    }
}

/// Scale to fill a `size`x`size` box and crop the overflow around the centre.
fn cover_fit(img: &DynamicImage, size: u32) -> DynamicImage {
    img.resize_to_fill(size, size, FilterType::Lanczos3)
}

/// Encode a DynamicImage as JPEG with specified quality.
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ThumbnailError> {
    let rgb = img.to_rgb8();
    let mut output = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|e| ThumbnailError::EncodeError(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;

    fn three_bands(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| match x * 3 / width {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        })
    }

    #[test]
    fn test_generates_square_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        three_bands(640, 360).save(&source).unwrap();
        let target = dir.path().join("thumb_wide.png");

        let outcome = ThumbnailService::ensure(&source, &target).unwrap();
        assert_eq!(outcome, ThumbnailOutcome::Generated);

        let bytes = std::fs::read(&target).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let thumb = image::load_from_memory(&bytes).unwrap();
        assert_eq!(thumb.dimensions(), (THUMBNAIL_SIZE, THUMBNAIL_SIZE));
    }

    #[test]
    fn test_cover_fit_crops_to_centre() {
        // Scale factor is 1, so the middle band fills the whole box.
        let img = DynamicImage::ImageRgb8(three_bands(900, 300));
        let thumb = cover_fit(&img, 300).to_rgb8();
        for x in [20, 150, 280] {
            let Rgb([r, g, b]) = *thumb.get_pixel(x, 150);
            assert!(g > 200 && r < 40 && b < 40, "pixel {x} was {r},{g},{b}");
        }
    }

    #[test]
    fn test_portrait_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tall.jpg");
        three_bands(120, 500).save(&source).unwrap();

        let thumb = image::load_from_memory(&ThumbnailService::render(&source).unwrap()).unwrap();
        assert_eq!(thumb.dimensions(), (300, 300));
    }

    #[test]
    fn test_alpha_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("alpha.png");
        RgbaImage::from_pixel(40, 40, Rgba([10, 20, 30, 0]))
            .save(&source)
            .unwrap();
        let target = dir.path().join("thumb_alpha.png");
        ThumbnailService::ensure(&source, &target).unwrap();
        assert!(image::open(&target).is_ok());
    }

    #[test]
    fn test_existing_thumbnail_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.png");
        three_bands(30, 30).save(&source).unwrap();
        let target = dir.path().join("thumb_a.png");
        std::fs::write(&target, b"stale").unwrap();

        let outcome = ThumbnailService::ensure(&source, &target).unwrap();
        assert_eq!(outcome, ThumbnailOutcome::AlreadyPresent);
        assert_eq!(std::fs::read(&target).unwrap(), b"stale");
    }

    #[test]
    fn test_corrupt_source_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.jpg");
        std::fs::write(&source, b"definitely not a jpeg").unwrap();
        let target = dir.path().join("thumb_broken.jpg");

        let err = ThumbnailService::ensure(&source, &target).unwrap_err();
        assert!(matches!(err, ThumbnailError::DecodeError(_)));
        assert!(!target.exists());
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ThumbnailService::ensure(
            &dir.path().join("gone.png"),
            &dir.path().join("thumb_gone.png"),
        )
        .unwrap_err();
        assert!(matches!(err, ThumbnailError::Io(_)));
    }
}
