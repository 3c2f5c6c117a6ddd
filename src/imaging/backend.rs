//! Image backend traits and shared types.
//!
//! An [`ImageBackend`] is a factory: it opens encoded bytes and returns an
//! [`ImageHandle`]. Every handle, whatever engine sits behind it, exposes the
//! same surface: format/mimetype/dimensions, `resize`, `crop`, `save`.
//!
//! | Variant | Engine | Crop |
//! |---|---|---|
//! | [`BackendVariant::Magick`] | ImageMagick CLI | `-extent` over the resolved box |
//! | [`BackendVariant::Rust`] | `image` crate | `crop_imm`, or pad onto a canvas |
//!
//! ## Stream ownership
//!
//! `open` borrows the source stream and `save` borrows the sink. A handle
//! never owns, closes, or keeps a reference to either; dropping a handle
//! releases only its own pixel buffer. Callers may keep using both streams
//! after the handle is gone.

use super::format;
use super::geometry::{CropSpec, GeometryError, PixelBox, crop_box};
use super::params::DEFAULT_MAX_PIXELS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{variant} backend unavailable: {reason}")]
    Unavailable {
        variant: BackendVariant,
        reason: String,
    },
    #[error("no imaging backend available ({})", describe_attempts(.attempts))]
    NoneAvailable {
        attempts: Vec<(BackendVariant, String)>,
    },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("invalid crop box {0}")]
    InvalidCropBox(PixelBox),
    #[error("crop box {region} exceeds the limit of {limit} pixels")]
    CropTooLarge { region: PixelBox, limit: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

fn describe_attempts(attempts: &[(BackendVariant, String)]) -> String {
    if attempts.is_empty() {
        return "no variants configured".to_string();
    }
    attempts
        .iter()
        .map(|(variant, reason)| format!("{variant}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Identity of an available engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendVariant {
    /// ImageMagick, driven through its command-line tool.
    Magick,
    /// Pure Rust, the `image` crate.
    Rust,
}

impl BackendVariant {
    /// Default fallback order, richest engine first.
    pub const PRIORITY: [BackendVariant; 2] = [BackendVariant::Magick, BackendVariant::Rust];

    pub fn name(self) -> &'static str {
        match self {
            BackendVariant::Magick => "magick",
            BackendVariant::Rust => "rust",
        }
    }
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendVariant::PRIORITY
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown backend `{s}` (expected magick or rust)"))
    }
}

/// Pixel dimensions of an open image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Factory for image handles. Shared across threads once selected.
pub trait ImageBackend: Send + Sync {
    fn variant(&self) -> BackendVariant;

    /// Decode an image from `source`, reading it to the end.
    ///
    /// Format and dimensions are known as soon as this returns.
    fn open(&self, source: &mut dyn Read) -> Result<Box<dyn ImageHandle>, BackendError>;
}

/// One open image, exclusively owned by whoever opened it.
///
/// See the [module docs](self) for the stream ownership contract.
pub trait ImageHandle: Send {
    /// Output format used by the next [`save`](Self::save).
    fn format(&self) -> &str;

    /// Change the output format. `jpg` is stored as `jpeg`; anything else verbatim.
    fn set_format(&mut self, format: &str);

    fn dimensions(&self) -> Dimensions;

    /// Downscale in place to fit within `max_width` × `max_height`,
    /// keeping aspect ratio. Images already inside the bounds are untouched.
    fn resize(&mut self, max_width: u32, max_height: u32) -> Result<(), BackendError>;

    /// Replace the pixels with `region`. Areas outside the image are padded.
    ///
    /// Called by [`crop`](Self::crop) with a non-empty box.
    fn apply_crop(&mut self, region: PixelBox) -> Result<(), BackendError>;

    /// Encode with the current format and write everything to `sink`.
    fn save(&self, sink: &mut dyn Write) -> Result<(), BackendError>;

    fn mimetype(&self) -> &'static str {
        format::mimetype_for(self.format())
    }

    fn width(&self) -> u32 {
        self.dimensions().width
    }

    fn height(&self) -> u32 {
        self.dimensions().height
    }

    /// Largest `width * height` a crop may produce.
    fn max_pixels(&self) -> u64 {
        DEFAULT_MAX_PIXELS
    }

    /// Resolve `spec` against the current dimensions and crop in place.
    ///
    /// Empty or inverted boxes fail with `InvalidCropBox`, boxes over
    /// [`max_pixels`](Self::max_pixels) with `CropTooLarge`; neither reaches
    /// the engine.
    fn crop(&mut self, spec: &CropSpec) -> Result<(), BackendError> {
        let Dimensions { width, height } = self.dimensions();
        let resolved = crop_box(width, height, spec)?;
        let region = resolved.to_pixels();
        debug!(%resolved, %region, width, height, "crop");
        if !region.is_non_empty() {
            return Err(BackendError::InvalidCropBox(region));
        }
        let limit = self.max_pixels();
        if region.area().is_none_or(|pixels| pixels > limit) {
            return Err(BackendError::CropTooLarge { region, limit });
        }
        self.apply_crop(region)
    }
}
