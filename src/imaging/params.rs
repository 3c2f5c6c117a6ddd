//! Parameter types shared by all backends.
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`HandleOptions`]: Settings a backend hands to every image it opens.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Quality as the byte most encoders take.
    pub fn as_u8(self) -> u8 {
        self.0.clamp(1, 100) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Largest crop result, in pixels, a handle will produce by default.
///
/// 100 megapixels: a padded RGBA canvas of this size is 400 MB.
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

/// Settings a backend applies to every handle it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleOptions {
    pub quality: Quality,
    /// Upper bound on `width * height` of a crop box.
    pub max_pixels: u64,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
        assert_eq!(HandleOptions::default().quality.as_u8(), 90);
    }

    #[test]
    fn default_pixel_limit() {
        assert_eq!(HandleOptions::default().max_pixels, DEFAULT_MAX_PIXELS);
    }

    #[test]
    fn quality_byte_is_clamped_even_when_constructed_directly() {
        assert_eq!(Quality(500).as_u8(), 100);
    }
}
