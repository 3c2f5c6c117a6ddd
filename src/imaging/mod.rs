//! Image processing behind one capability-based backend interface.
//!
//! | Concern | Where |
//! |---|---|
//! | **Crop boxes** | [`crop_box`]: explicit edges or nine-gravity windows |
//! | **Resize bounds** | [`fit_within`]: aspect-preserving downscale |
//! | **Engines** | [`MagickBackend`] (ImageMagick CLI), [`RustBackend`] (`image` crate) |
//! | **Engine choice** | [`BackendSelector`]: probe, fall back, memoize |
//! | **Formats** | [`normalize_format`], [`mimetype_for`] |
//!
//! The module is split into:
//! - **Geometry**: Pure crop-box resolution (unit testable)
//! - **Calculations**: Pure functions for dimension math
//! - **Parameters**: Encoder settings shared by both engines
//! - **Backend**: [`ImageBackend`] / [`ImageHandle`] traits + both engines
//! - **Selector**: Runtime choice between engines
//! - **Operations**: High-level functions driving a backend end to end

pub mod backend;
mod calculations;
mod format;
pub mod geometry;
pub mod magick_backend;
pub mod operations;
mod params;
pub mod rust_backend;
pub mod selector;

pub use backend::{BackendError, BackendVariant, Dimensions, ImageBackend, ImageHandle};
pub use calculations::fit_within;
pub use format::{FALLBACK_MIMETYPE, mimetype_for, normalize_format};
pub use geometry::{CropBox, CropSpec, GeometryError, Gravity, PixelBox, crop_box};
pub use magick_backend::MagickBackend;
pub use operations::{
    ImageInfo, VariantRequest, VariantSummary, create_variant, extension_for, identify,
};
pub use params::{DEFAULT_MAX_PIXELS, HandleOptions, Quality};
pub use rust_backend::{RustBackend, supported_input_formats};
pub use selector::BackendSelector;
