//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate best-fit dimensions for a thumbnail-style downscale.
///
/// Shrinks `source` to the largest size that fits inside `bounds` while
/// keeping its aspect ratio. Never enlarges: returns `None` when the source
/// already fits, so callers can skip the resample entirely.
///
/// Each output side is at least 1px and never exceeds its bound.
///
/// # Arguments
/// * `source` - Current image dimensions (width, height)
/// * `bounds` - Maximum allowed dimensions (width, height)
///
/// # Examples
/// ```
/// # use image_variants::imaging::fit_within;
/// // 800x600 into 400x400 → width-limited, 400x300
/// assert_eq!(fit_within((800, 600), (400, 400)), Some((400, 300)));
///
/// // Already small enough → nothing to do
/// assert_eq!(fit_within((200, 100), (400, 400)), None);
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w <= max_w && src_h <= max_h {
        return None;
    }

    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    Some((w, h))
}
