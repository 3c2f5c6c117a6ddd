//! ImageMagick backend, driven through the command-line tool.
//!
//! The richer engine: it decodes and encodes far more formats than the pure
//! Rust backend. Each operation pipes bytes through one `magick` (IM7) or
//! `convert` (IM6) invocation over stdin/stdout; no temp files are written.
//!
//! | Operation | Invocation |
//! |---|---|
//! | Identify | `<in> -format "%m %w %h\n" info:-` |
//! | Resize | `<in> -resize WxH! miff:-` (dimensions from [`fit_within`]) |
//! | Crop | `<in> -background none -extent WxH±X±Y +repage miff:-` |
//! | Save | `<in> -quality Q <format>:-` |
//!
//! Between operations pixels are kept as MIFF, ImageMagick's lossless native
//! format, so a resize followed by a crop does not re-encode through a lossy
//! codec.

use super::backend::{BackendError, BackendVariant, Dimensions, ImageBackend, ImageHandle};
use super::calculations::fit_within;
use super::format::{is_plain_format_name, normalize_format};
use super::geometry::PixelBox;
use super::params::{HandleOptions, Quality};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::debug;

/// Binaries tried, in order, when no explicit binary is configured.
pub const DEFAULT_BINARIES: &[&str] = &["magick", "convert"];

/// ImageMagick backend bound to a verified binary.
#[derive(Debug)]
pub struct MagickBackend {
    binary: Arc<Path>,
    options: HandleOptions,
}

impl MagickBackend {
    /// Capability probe.
    ///
    /// Runs `<binary> -version` for the configured binary, or for each of
    /// [`DEFAULT_BINARIES`], and keeps the first one that identifies itself
    /// as ImageMagick.
    pub fn probe(binary: Option<&str>, quality: Quality) -> Result<Self, BackendError> {
        let candidates: Vec<&str> = match binary {
            Some(b) => vec![b],
            None => DEFAULT_BINARIES.to_vec(),
        };

        let mut failures = Vec::new();
        for candidate in candidates {
            match check_binary(candidate) {
                Ok(version) => {
                    debug!(binary = candidate, %version, "found ImageMagick");
                    return Ok(Self {
                        binary: Arc::from(PathBuf::from(candidate)),
                        options: HandleOptions {
                            quality,
                            ..HandleOptions::default()
                        },
                    });
                }
                Err(reason) => {
                    debug!(binary = candidate, %reason, "ImageMagick probe failed");
                    failures.push(format!("{candidate}: {reason}"));
                }
            }
        }

        Err(BackendError::Unavailable {
            variant: BackendVariant::Magick,
            reason: failures.join(", "),
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Cap the pixel count of crop results.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.options.max_pixels = max_pixels;
        self
    }
}

/// Run `<binary> -version`, returning its first line if it is ImageMagick.
fn check_binary(binary: &str) -> Result<String, String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(format!("exited with {}", output.status));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or_default();
    if !first_line.contains("ImageMagick") {
        return Err("not ImageMagick".to_string());
    }
    Ok(first_line.trim().to_string())
}

/// Run the binary with `args`, feeding `input` on stdin, returning stdout.
///
/// `failure` wraps stderr when the process exits unsuccessfully.
fn run(
    binary: &Path,
    args: &[String],
    input: &[u8],
    failure: fn(String) -> BackendError,
) -> Result<Vec<u8>, BackendError> {
    debug!(binary = %binary.display(), ?args, input_len = input.len(), "running ImageMagick");
    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("child stdin not captured"))?;

    // Feed stdin from a second thread so a full stdout pipe cannot deadlock us
    let (output, fed) = std::thread::scope(|scope| {
        let feeder = scope.spawn(move || stdin.write_all(input));
        let output = child.wait_with_output();
        let fed = feeder
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin feeder panicked")));
        (output, fed)
    });
    let output = output?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failure(format!("{}: {}", output.status, stderr.trim())));
    }
    fed?;
    Ok(output.stdout)
}

impl ImageBackend for MagickBackend {
    fn variant(&self) -> BackendVariant {
        BackendVariant::Magick
    }

    fn open(&self, source: &mut dyn Read) -> Result<Box<dyn ImageHandle>, BackendError> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;

        let args = vec![
            "-".to_string(),
            "-format".to_string(),
            r"%m %w %h\n".to_string(),
            "info:-".to_string(),
        ];
        let info = run(&self.binary, &args, &bytes, BackendError::Decode)?;
        let (format, dims) = parse_identify(&String::from_utf8_lossy(&info))?;
        debug!(%format, width = dims.width, height = dims.height, "opened with ImageMagick");

        Ok(Box::new(MagickHandle {
            binary: Arc::clone(&self.binary),
            options: self.options,
            pixels: bytes,
            intermediate: false,
            format,
            dims,
        }))
    }
}

/// Parse the first `FORMAT WIDTH HEIGHT` line of an identify run.
///
/// Multi-frame inputs print one line per frame; the first frame wins.
fn parse_identify(text: &str) -> Result<(String, Dimensions), BackendError> {
    let line = text.lines().next().unwrap_or_default();
    let mut fields = line.split_whitespace();
    let parsed = match (fields.next(), fields.next(), fields.next()) {
        (Some(format), Some(w), Some(h)) => w
            .parse::<u32>()
            .ok()
            .zip(h.parse::<u32>().ok())
            .map(|(width, height)| (format.to_ascii_lowercase(), Dimensions { width, height })),
        _ => None,
    };
    parsed.ok_or_else(|| BackendError::Decode(format!("unexpected identify output: {line:?}")))
}

/// Image held as encoded bytes between ImageMagick invocations.
pub struct MagickHandle {
    binary: Arc<Path>,
    options: HandleOptions,
    /// Original encoded input until the first operation, MIFF afterwards.
    pixels: Vec<u8>,
    intermediate: bool,
    format: String,
    dims: Dimensions,
}

impl MagickHandle {
    fn input_arg(&self) -> String {
        if self.intermediate {
            "miff:-".to_string()
        } else {
            "-".to_string()
        }
    }

    /// Run `ops` over the current pixels, keeping the result as MIFF.
    fn transform(&mut self, ops: &[String], dims: Dimensions) -> Result<(), BackendError> {
        let mut args = vec![self.input_arg()];
        args.extend_from_slice(ops);
        args.push("miff:-".to_string());

        self.pixels = run(&self.binary, &args, &self.pixels, BackendError::Decode)?;
        self.intermediate = true;
        self.dims = dims;
        Ok(())
    }
}

/// ImageMagick geometry for a box, e.g. `150x50-10+25`.
fn extent_geometry(region: PixelBox) -> String {
    format!(
        "{}x{}{:+}{:+}",
        region.width(),
        region.height(),
        region.left,
        region.top
    )
}

impl ImageHandle for MagickHandle {
    fn format(&self) -> &str {
        &self.format
    }

    fn set_format(&mut self, format: &str) {
        self.format = normalize_format(format);
    }

    fn dimensions(&self) -> Dimensions {
        self.dims
    }

    fn max_pixels(&self) -> u64 {
        self.options.max_pixels
    }

    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<(), BackendError> {
        let current = (self.dims.width, self.dims.height);
        let Some((width, height)) = fit_within(current, (max_width, max_height)) else {
            return Ok(());
        };
        let ops = ["-resize".to_string(), format!("{width}x{height}!")];
        self.transform(&ops, Dimensions { width, height })
    }

    fn apply_crop(&mut self, region: PixelBox) -> Result<(), BackendError> {
        let (Ok(width), Ok(height)) = (u32::try_from(region.width()), u32::try_from(region.height()))
        else {
            return Err(BackendError::InvalidCropBox(region));
        };
        let ops = [
            "-background".to_string(),
            "none".to_string(),
            "-extent".to_string(),
            extent_geometry(region),
            "+repage".to_string(),
        ];
        self.transform(&ops, Dimensions { width, height })
    }

    fn save(&self, sink: &mut dyn Write) -> Result<(), BackendError> {
        if !is_plain_format_name(&self.format) {
            return Err(BackendError::UnsupportedFormat(self.format.clone()));
        }
        let args = vec![
            self.input_arg(),
            "-quality".to_string(),
            self.options.quality.value().to_string(),
            format!("{}:-", self.format),
        ];
        let encoded = run(&self.binary, &args, &self.pixels, BackendError::Encode)?;
        sink.write_all(&encoded)?;
        sink.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{CropSpec, Gravity};
    use image::{GenericImageView, ImageEncoder, Rgb, RgbImage};

    #[test]
    fn parse_identify_first_frame() {
        let (format, dims) = parse_identify("GIF 40 30\nGIF 40 30\n").unwrap();
        assert_eq!(format, "gif");
        assert_eq!(dims, Dimensions { width: 40, height: 30 });
    }

    #[test]
    fn parse_identify_rejects_garbage() {
        assert!(matches!(
            parse_identify("JPEG wide tall"),
            Err(BackendError::Decode(_))
        ));
        assert!(parse_identify("").is_err());
    }

    #[test]
    fn extent_geometry_signs_offsets() {
        let region = PixelBox {
            left: -10,
            top: 25,
            right: 140,
            bottom: 75,
        };
        assert_eq!(extent_geometry(region), "150x50-10+25");
    }

    #[test]
    fn probe_missing_binary_is_unavailable() {
        let err = MagickBackend::probe(Some("/nonexistent/magick"), Quality::default()).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Unavailable {
                variant: BackendVariant::Magick,
                ..
            }
        ));
    }

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

    #[test]
    #[ignore] // Requires ImageMagick
    fn magick_open_resize_crop_save() {
        let backend = MagickBackend::probe(None, Quality::new(85)).unwrap();
        let mut handle = backend.open(&mut &test_png(800, 600)[..]).unwrap();
        assert_eq!(handle.format(), "png");
        assert_eq!(handle.dimensions(), Dimensions { width: 800, height: 600 });

        handle.resize(400, 400).unwrap();
        assert_eq!(handle.dimensions(), Dimensions { width: 400, height: 300 });

        handle
            .crop(&CropSpec::anchored(Gravity::Center, 100.0, 100.0))
            .unwrap();
        handle.set_format("jpg");

        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (100, 100));
        assert_eq!(
            image::guess_format(&out).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    #[ignore] // Requires ImageMagick
    fn magick_crop_past_edges_pads() {
        let backend = MagickBackend::probe(None, Quality::default()).unwrap();
        let mut handle = backend.open(&mut &test_png(100, 100)[..]).unwrap();
        handle
            .crop(&CropSpec::anchored(Gravity::East, 150.0, 100.0))
            .unwrap();

        let mut out = Vec::new();
        handle.save(&mut out).unwrap();
        assert_eq!(image::load_from_memory(&out).unwrap().dimensions(), (150, 100));
    }
}
