//! Pure Rust image backend, no external programs.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, TIFF, WebP, BMP, ICO) | `image::ImageReader` with guessed format |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3`, dimensions from [`fit_within`] |
//! | Crop (inside the image) | `image::DynamicImage::crop_imm` |
//! | Crop (past the edges) | blank canvas + `image::imageops::replace` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with quality |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → others | `image::DynamicImage::write_to` |

use super::backend::{BackendError, BackendVariant, Dimensions, ImageBackend, ImageHandle};
use super::calculations::fit_within;
use super::format::{format_name, image_format_for, normalize_format};
use super::geometry::PixelBox;
use super::params::{HandleOptions, Quality};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use std::io::{Cursor, Read, Write};
use std::sync::LazyLock;
use tracing::debug;

/// Formats this backend is expected to decode.
const DECODE_CANDIDATES: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Tiff,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Ico,
];

static DECODABLE: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    DECODE_CANDIDATES
        .iter()
        .filter(|fmt| fmt.reading_enabled())
        .map(|fmt| format_name(*fmt))
        .collect()
});

/// Returns the format names that have working decoders compiled in.
pub fn supported_input_formats() -> &'static [&'static str] {
    &DECODABLE
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    options: HandleOptions,
}

impl RustBackend {
    pub fn new(quality: Quality) -> Self {
        Self {
            options: HandleOptions {
                quality,
                ..HandleOptions::default()
            },
        }
    }

    /// Cap the pixel count of crop results.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.options.max_pixels = max_pixels;
        self
    }

    /// Capability probe: succeeds when at least one decoder is compiled in.
    pub fn probe(quality: Quality) -> Result<Self, BackendError> {
        if supported_input_formats().is_empty() {
            return Err(BackendError::Unavailable {
                variant: BackendVariant::Rust,
                reason: "no image decoders compiled in".to_string(),
            });
        }
        Ok(Self::new(quality))
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new(Quality::default())
    }
}

impl ImageBackend for RustBackend {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Rust
    }

    fn open(&self, source: &mut dyn Read) -> Result<Box<dyn ImageHandle>, BackendError> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;

        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let detected = reader
            .format()
            .ok_or_else(|| BackendError::Decode("unrecognized image format".to_string()))?;
        let image = reader
            .decode()
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let format = format_name(detected).to_string();
        debug!(%format, width = image.width(), height = image.height(), "opened with image crate");
        Ok(Box::new(RustHandle {
            image,
            format,
            options: self.options,
        }))
    }
}

/// Decoded image held in memory.
pub struct RustHandle {
    image: DynamicImage,
    format: String,
    options: HandleOptions,
}

impl ImageHandle for RustHandle {
    fn format(&self) -> &str {
        &self.format
    }

    fn set_format(&mut self, format: &str) {
        self.format = normalize_format(format);
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    fn max_pixels(&self) -> u64 {
        self.options.max_pixels
    }

    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<(), BackendError> {
        let current = (self.image.width(), self.image.height());
        if let Some((width, height)) = fit_within(current, (max_width, max_height)) {
            debug!(?current, width, height, "resize");
            self.image = self.image.resize_exact(width, height, FilterType::Lanczos3);
        }
        Ok(())
    }

    fn apply_crop(&mut self, region: PixelBox) -> Result<(), BackendError> {
        let (Ok(width), Ok(height)) = (u32::try_from(region.width()), u32::try_from(region.height()))
        else {
            return Err(BackendError::InvalidCropBox(region));
        };

        if region.fits_within(self.image.width(), self.image.height()) {
            self.image = self
                .image
                .crop_imm(region.left as u32, region.top as u32, width, height);
        } else {
            // Uncovered area stays zeroed: black, or transparent with alpha
            let mut canvas = DynamicImage::new(width, height, self.image.color());
            image::imageops::replace(&mut canvas, &self.image, -region.left, -region.top);
            self.image = canvas;
        }
        Ok(())
    }

    fn save(&self, sink: &mut dyn Write) -> Result<(), BackendError> {
        let target = image_format_for(&self.format)
            .filter(|fmt| fmt.writing_enabled())
            .ok_or_else(|| BackendError::UnsupportedFormat(self.format.clone()))?;

        let mut encoded = Vec::new();
        encode(&self.image, target, self.options.quality, &mut encoded)?;
        sink.write_all(&encoded)?;
        sink.flush()?;
        Ok(())
    }
}

/// Convert to a pixel layout the target encoder accepts.
fn prepare_for(img: &DynamicImage, format: ImageFormat) -> Option<DynamicImage> {
    let color = img.color();
    match format {
        ImageFormat::Jpeg => match color {
            ColorType::L8 | ColorType::Rgb8 => None,
            _ => Some(DynamicImage::ImageRgb8(img.to_rgb8())),
        },
        ImageFormat::WebP | ImageFormat::Avif | ImageFormat::Gif | ImageFormat::Ico => {
            match color {
                ColorType::Rgb8 | ColorType::Rgba8 => None,
                c if c.has_alpha() => Some(DynamicImage::ImageRgba8(img.to_rgba8())),
                _ => Some(DynamicImage::ImageRgb8(img.to_rgb8())),
            }
        }
        _ => None,
    }
}

fn encode(
    img: &DynamicImage,
    format: ImageFormat,
    quality: Quality,
    out: &mut Vec<u8>,
) -> Result<(), BackendError> {
    let converted = prepare_for(img, format);
    let img = converted.as_ref().unwrap_or(img);

    let result = match format {
        ImageFormat::Jpeg => {
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut *out, quality.as_u8());
            img.write_with_encoder(encoder)
        }
        ImageFormat::Avif => {
            let encoder =
                image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut *out, 6, quality.as_u8());
            img.write_with_encoder(encoder)
        }
        other => img.write_to(&mut Cursor::new(&mut *out), other),
    };
    result.map_err(|e| BackendError::Encode(format!("{}: {e}", format_name(format))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{CropSpec, Gravity};
    use image::{GenericImageView, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn supported_formats_match_decodable_formats() {
        let formats = super::supported_input_formats();
        for expected in &["jpeg", "png", "gif", "tiff", "webp", "bmp", "ico"] {
            assert!(
                formats.contains(expected),
                "expected {expected} in supported formats"
            );
        }
    }

    /// Encode a small gradient PNG with the given dimensions.
    fn test_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut bytes)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        bytes
    }

    fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut bytes)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        bytes
    }

    fn open(bytes: &[u8]) -> Box<dyn ImageHandle> {
        RustBackend::default().open(&mut &bytes[..]).unwrap()
    }

    fn decode(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn probe_succeeds_with_compiled_decoders() {
        let backend = RustBackend::probe(Quality::new(80)).unwrap();
        assert_eq!(backend.variant(), BackendVariant::Rust);
    }

    #[test]
    fn open_reports_format_and_dimensions() {
        let handle = open(&test_jpeg(200, 150));
        assert_eq!(handle.format(), "jpeg");
        assert_eq!(handle.mimetype(), "image/jpeg");
        assert_eq!(handle.dimensions(), Dimensions { width: 200, height: 150 });
    }

    #[test]
    fn open_garbage_is_decode_error() {
        let result = RustBackend::default().open(&mut &b"definitely not an image"[..]);
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn resize_fits_within_bounds() {
        let mut handle = open(&test_png(800, 600));
        handle.resize(400, 400).unwrap();
        assert_eq!(handle.dimensions(), Dimensions { width: 400, height: 300 });
    }

    #[test]
    fn resize_never_enlarges() {
        let mut handle = open(&test_png(100, 50));
        handle.resize(400, 400).unwrap();
        assert_eq!(handle.dimensions(), Dimensions { width: 100, height: 50 });
    }

    #[test]
    fn crop_inside_image_copies_pixels() {
        let mut handle = open(&test_png(800, 600));
        handle
            .crop(&CropSpec::anchored(Gravity::NorthEast, 200.0, 100.0))
            .unwrap();
        assert_eq!(handle.dimensions(), Dimensions { width: 200, height: 100 });

        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        let img = decode(&out);
        // Gradient red channel = x % 256; first column is source x = 600
        assert_eq!(img.get_pixel(0, 0), Rgba([(600 % 256) as u8, 0, 128, 255]));
    }

    #[test]
    fn crop_past_edges_pads_with_black() {
        let mut handle = open(&test_png(100, 100));
        // Oversized centre window: hcut = 0, box (0, 25, 150, 75)
        handle
            .crop(&CropSpec::anchored(Gravity::Center, 150.0, 50.0))
            .unwrap();
        assert_eq!(handle.dimensions(), Dimensions { width: 150, height: 50 });

        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        let img = decode(&out);
        assert_eq!(img.get_pixel(10, 0), Rgba([10, 25, 128, 255]));
        assert_eq!(img.get_pixel(120, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn crop_past_edges_keeps_alpha_transparent() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let mut handle = open(&bytes);
        let spec = CropSpec {
            left: Some(-5.0),
            ..CropSpec::default()
        };
        handle.crop(&spec).unwrap();
        assert_eq!(handle.width(), 15);

        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        let decoded = decode(&out);
        assert_eq!(decoded.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(decoded.get_pixel(5, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn crop_odd_window_over_odd_excess_keeps_size() {
        let mut handle = open(&test_png(800, 600));
        handle
            .crop(&CropSpec::anchored(Gravity::Center, 201.0, 101.0))
            .unwrap();
        assert_eq!(handle.dimensions(), Dimensions { width: 201, height: 101 });

        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        let img = decode(&out);
        assert_eq!(img.dimensions(), (201, 101));
        // Window starts at source (300, 250)
        assert_eq!(img.get_pixel(0, 0), Rgba([(300 % 256) as u8, 250, 128, 255]));
    }

    #[test]
    fn crop_single_pixel_from_center() {
        let mut handle = open(&test_png(4, 4));
        handle
            .crop(&CropSpec::anchored(Gravity::Center, 1.0, 1.0))
            .unwrap();

        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        let img = decode(&out);
        assert_eq!(img.dimensions(), (1, 1));
        assert_eq!(img.get_pixel(0, 0), Rgba([2, 2, 128, 255]));
    }

    #[test]
    fn oversized_padding_is_refused_not_allocated() {
        let backend = RustBackend::default().with_max_pixels(10_000);
        let mut handle = backend.open(&mut &test_png(100, 100)[..]).unwrap();

        let err = handle
            .crop(&CropSpec::anchored(Gravity::Center, 100_000.0, 100_000.0))
            .unwrap_err();
        assert!(matches!(err, BackendError::CropTooLarge { limit: 10_000, .. }));
        assert_eq!(handle.dimensions(), Dimensions { width: 100, height: 100 });

        // Exactly at the limit is fine
        handle
            .crop(&CropSpec::anchored(Gravity::Center, 100.0, 100.0))
            .unwrap();
    }

    #[test]
    fn save_uses_assigned_format() {
        let mut handle = open(&test_png(64, 48));
        handle.set_format("jpg");
        assert_eq!(handle.format(), "jpeg");

        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn save_jpeg_drops_alpha() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let mut handle = open(&bytes);
        handle.set_format("jpeg");
        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        assert_eq!(decode(&out).color(), ColorType::Rgb8);
    }

    #[test]
    fn save_webp_output() {
        let mut handle = open(&test_jpeg(40, 30));
        handle.set_format("webp");
        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn save_avif_output() {
        let mut handle = open(&test_png(32, 24));
        handle.set_format("avif");
        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn save_unknown_format_is_unsupported() {
        let mut handle = open(&test_png(10, 10));
        handle.set_format("heic");
        let err = handle.save(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedFormat(f) if f == "heic"));
    }

    #[test]
    fn format_change_does_not_touch_pixels() {
        let mut handle = open(&test_png(30, 20));
        handle.set_format("bmp");
        assert_eq!(handle.dimensions(), Dimensions { width: 30, height: 20 });
    }
}
