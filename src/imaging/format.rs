//! Output format names and their MIME types.
//!
//! Handles report formats by a lowercase canonical name (`jpeg`, `png`, ...).
//! Assigning a format goes through [`normalize_format`], which only rewrites
//! the `jpg` alias; everything else is stored verbatim and resolved
//! case-insensitively when a MIME type or encoder is needed.

use image::ImageFormat;

/// MIME type reported for formats missing from [`FORMATS`].
pub const FALLBACK_MIMETYPE: &str = "application/octet-stream";

/// Canonical name, MIME type, `image` crate format.
const FORMATS: &[(&str, &str, ImageFormat)] = &[
    ("jpeg", "image/jpeg", ImageFormat::Jpeg),
    ("png", "image/png", ImageFormat::Png),
    ("gif", "image/gif", ImageFormat::Gif),
    ("webp", "image/webp", ImageFormat::WebP),
    ("tiff", "image/tiff", ImageFormat::Tiff),
    ("bmp", "image/bmp", ImageFormat::Bmp),
    ("ico", "image/x-icon", ImageFormat::Ico),
    ("avif", "image/avif", ImageFormat::Avif),
];

/// Apply the format alias table. Only `jpg` has an alias.
pub fn normalize_format(format: &str) -> String {
    match format {
        "jpg" => "jpeg".to_string(),
        other => other.to_string(),
    }
}

fn lookup(format: &str) -> Option<&'static (&'static str, &'static str, ImageFormat)> {
    FORMATS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(format))
}

/// MIME type for a format name.
pub fn mimetype_for(format: &str) -> &'static str {
    lookup(format).map_or(FALLBACK_MIMETYPE, |(_, mime, _)| *mime)
}

/// `image` crate format for a format name, if the name is known.
pub fn image_format_for(format: &str) -> Option<ImageFormat> {
    lookup(format).map(|(_, _, fmt)| *fmt)
}

/// Canonical name for a decoded format.
pub fn format_name(format: ImageFormat) -> &'static str {
    FORMATS
        .iter()
        .find(|(_, _, fmt)| *fmt == format)
        .map(|(name, _, _)| *name)
        .or_else(|| format.extensions_str().first().copied())
        .unwrap_or("unknown")
}

/// True for names safe to pass to an external encoder as a format prefix.
pub fn is_plain_format_name(format: &str) -> bool {
    !format.is_empty() && format.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpg_alias_normalized() {
        assert_eq!(normalize_format("jpg"), "jpeg");
    }

    #[test]
    fn other_values_pass_through() {
        assert_eq!(normalize_format("png"), "png");
        assert_eq!(normalize_format("JPG"), "JPG");
        assert_eq!(normalize_format("jpeg"), "jpeg");
        assert_eq!(normalize_format("heic"), "heic");
    }

    #[test]
    fn mimetype_known_formats() {
        assert_eq!(mimetype_for("jpeg"), "image/jpeg");
        assert_eq!(mimetype_for("PNG"), "image/png");
        assert_eq!(mimetype_for("webp"), "image/webp");
        assert_eq!(mimetype_for("ico"), "image/x-icon");
    }

    #[test]
    fn mimetype_of_normalized_jpg_is_jpeg() {
        assert_eq!(mimetype_for(&normalize_format("jpg")), "image/jpeg");
    }

    #[test]
    fn mimetype_unknown_falls_back() {
        assert_eq!(mimetype_for("heic"), FALLBACK_MIMETYPE);
        assert_eq!(mimetype_for(""), FALLBACK_MIMETYPE);
    }

    #[test]
    fn decoded_format_names_are_canonical() {
        assert_eq!(format_name(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_name(ImageFormat::Tiff), "tiff");
    }

    #[test]
    fn image_format_lookup() {
        assert_eq!(image_format_for("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(image_format_for("AVIF"), Some(ImageFormat::Avif));
        assert_eq!(image_format_for("jpg"), None);
    }

    #[test]
    fn plain_format_names() {
        assert!(is_plain_format_name("webp"));
        assert!(!is_plain_format_name("png:/etc/passwd"));
        assert!(!is_plain_format_name(""));
    }
}
