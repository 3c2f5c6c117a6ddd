//! Crop-box resolution.
//!
//! Turns a [`CropSpec`] into an absolute [`CropBox`] in the source image's
//! current pixel space. Everything here is pure: no backend, no I/O.
//!
//! Two strategies, chosen by whether `gravity` is present:
//!
//! - **Explicit box** (no gravity): `left`/`top` default to `0`, the far edges
//!   come from `right`/`bottom`, or from `left + width`/`top + height`, or from
//!   the image extent. Giving both a span and its far edge is a conflict.
//!   The resulting box is *not* clamped to the image.
//! - **Anchored window** (gravity): `width` and `height` are mandatory and the
//!   window is placed at one of nine anchors. The half-cut
//!   `max(0, image - requested) / 2` only guards against a negative cut; a
//!   window larger than the image still runs past its far edge.
//!
//! The two branches clamp differently on purpose. Backends receive the box
//! as-is and pad any area outside the image.
//!
//! Values are not range-checked either. A negative `left`/`top` places the
//! box before the origin (the backend pads that strip), and a negative
//! `width`/`height` yields an inverted box that the handle rejects as
//! `InvalidCropBox`. Only NaN and infinities are refused here, with
//! [`GeometryError::NonFiniteCropValue`].
//!
//! ```text
//!  north_west ── north ── north_east
//!      │           │           │
//!    west ───── center ───── east
//!      │           │           │
//!  south_west ── south ── south_east
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("conflicting crop parameters: `{dimension}` and `{edge}` are mutually exclusive")]
    ConflictingCropParameters {
        dimension: &'static str,
        edge: &'static str,
    },
    #[error("gravity `{gravity}` requires `{field}`")]
    MissingCropDimension {
        field: &'static str,
        gravity: Gravity,
    },
    #[error("unknown gravity `{0}`")]
    UnknownGravity(String),
    #[error("crop parameter `{field}` must be a finite number")]
    NonFiniteCropValue { field: &'static str },
}

/// Named anchor for a fixed-size crop window.
///
/// Tokens are matched exactly (`north_east`, not `NorthEast` or `ne`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gravity {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

/// Where a window sits along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Start,
    Middle,
    End,
}

impl Gravity {
    pub const ALL: [Gravity; 9] = [
        Gravity::NorthWest,
        Gravity::North,
        Gravity::NorthEast,
        Gravity::West,
        Gravity::Center,
        Gravity::East,
        Gravity::SouthWest,
        Gravity::South,
        Gravity::SouthEast,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Gravity::NorthWest => "north_west",
            Gravity::North => "north",
            Gravity::NorthEast => "north_east",
            Gravity::West => "west",
            Gravity::Center => "center",
            Gravity::East => "east",
            Gravity::SouthWest => "south_west",
            Gravity::South => "south",
            Gravity::SouthEast => "south_east",
        }
    }

    /// Split into (horizontal, vertical) anchors.
    fn anchors(self) -> (Anchor, Anchor) {
        use Anchor::*;
        match self {
            Gravity::NorthWest => (Start, Start),
            Gravity::North => (Middle, Start),
            Gravity::NorthEast => (End, Start),
            Gravity::West => (Start, Middle),
            Gravity::Center => (Middle, Middle),
            Gravity::East => (End, Middle),
            Gravity::SouthWest => (Start, End),
            Gravity::South => (Middle, End),
            Gravity::SouthEast => (End, End),
        }
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gravity {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gravity::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| GeometryError::UnknownGravity(s.to_string()))
    }
}

/// Crop request as it arrives from callers.
///
/// Mirrors the wire mapping `{gravity, left, top, right, bottom, width, height}`;
/// every key is optional and unknown keys are rejected. `gravity` stays a raw
/// token here so that an unrecognised anchor surfaces as
/// [`GeometryError::UnknownGravity`] at resolution time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl CropSpec {
    /// A `width` × `height` window placed at `gravity`.
    pub fn anchored(gravity: Gravity, width: f64, height: f64) -> Self {
        Self {
            gravity: Some(gravity.as_str().to_string()),
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// First numeric field holding NaN or an infinity.
    fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("left", self.left),
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
            ("width", self.width),
            ("height", self.height),
        ]
        .into_iter()
        .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
        .map(|(field, _)| field)
    }
}

/// Resolved crop rectangle, in source pixel coordinates.
///
/// Coordinates may be fractional (centred windows over an odd excess) and may
/// lie outside the image; see the [module docs](self).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl CropBox {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Snap to whole pixels.
    ///
    /// The near edges round half to even; the far edges are the near edge
    /// plus the rounded span, so a window never grows or shrinks by a pixel
    /// when both of its edges sit on a half.
    pub fn to_pixels(&self) -> PixelBox {
        let (left, right) = snap(self.left, self.right);
        let (top, bottom) = snap(self.top, self.bottom);
        PixelBox {
            left,
            top,
            right,
            bottom,
        }
    }
}

fn snap(near: f64, far: f64) -> (i64, i64) {
    let start = near.round_ties_even() as i64;
    let span = (far - near).round_ties_even() as i64;
    (start, start.saturating_add(span))
}

impl fmt::Display for CropBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Integer crop rectangle handed to a backend's crop primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl PixelBox {
    pub fn width(&self) -> i64 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i64 {
        self.bottom.saturating_sub(self.top)
    }

    /// Pixel count, or `None` for an empty box or one too large to count.
    pub fn area(&self) -> Option<u64> {
        let width = u64::try_from(self.width()).ok()?;
        let height = u64::try_from(self.height()).ok()?;
        width.checked_mul(height).filter(|&n| n > 0)
    }

    /// True when the box covers at least one pixel.
    pub fn is_non_empty(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    /// True when the box lies entirely inside a `width` × `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left >= 0
            && self.top >= 0
            && self.right <= i64::from(width)
            && self.bottom <= i64::from(height)
    }
}

impl fmt::Display for PixelBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Resolve `spec` against an image of `image_width` × `image_height`.
///
/// # Examples
/// ```
/// # use image_variants::imaging::{CropSpec, Gravity, crop_box};
/// let b = crop_box(800, 600, &CropSpec::anchored(Gravity::NorthEast, 200.0, 100.0)).unwrap();
/// assert_eq!((b.left, b.top, b.right, b.bottom), (600.0, 0.0, 800.0, 100.0));
/// ```
pub fn crop_box(
    image_width: u32,
    image_height: u32,
    spec: &CropSpec,
) -> Result<CropBox, GeometryError> {
    if let Some(field) = spec.non_finite_field() {
        return Err(GeometryError::NonFiniteCropValue { field });
    }
    let image_width = f64::from(image_width);
    let image_height = f64::from(image_height);

    match spec.gravity.as_deref() {
        None => explicit_box(image_width, image_height, spec),
        Some(token) => anchored_box(image_width, image_height, token.parse()?, spec),
    }
}

fn explicit_box(image_width: f64, image_height: f64, spec: &CropSpec) -> Result<CropBox, GeometryError> {
    let left = spec.left.unwrap_or(0.0);
    let top = spec.top.unwrap_or(0.0);
    let right = far_edge(left, spec.right, spec.width, image_width, ("width", "right"))?;
    let bottom = far_edge(top, spec.bottom, spec.height, image_height, ("height", "bottom"))?;

    Ok(CropBox {
        left,
        top,
        right,
        bottom,
    })
}

/// Far edge of one axis: explicit edge, else `near + span`, else the image extent.
fn far_edge(
    near: f64,
    edge: Option<f64>,
    span: Option<f64>,
    extent: f64,
    (span_name, edge_name): (&'static str, &'static str),
) -> Result<f64, GeometryError> {
    match (edge, span) {
        (Some(_), Some(_)) => Err(GeometryError::ConflictingCropParameters {
            dimension: span_name,
            edge: edge_name,
        }),
        (Some(edge), None) => Ok(edge),
        (None, Some(span)) => Ok(near + span),
        (None, None) => Ok(extent),
    }
}

fn anchored_box(
    image_width: f64,
    image_height: f64,
    gravity: Gravity,
    spec: &CropSpec,
) -> Result<CropBox, GeometryError> {
    let width = spec.width.ok_or(GeometryError::MissingCropDimension {
        field: "width",
        gravity,
    })?;
    let height = spec.height.ok_or(GeometryError::MissingCropDimension {
        field: "height",
        gravity,
    })?;

    let (horizontal, vertical) = gravity.anchors();
    let (left, right) = place(horizontal, width, image_width);
    let (top, bottom) = place(vertical, height, image_height);

    Ok(CropBox {
        left,
        top,
        right,
        bottom,
    })
}

/// Near and far edge of a `span`-long window along an axis of length `extent`.
fn place(anchor: Anchor, span: f64, extent: f64) -> (f64, f64) {
    match anchor {
        Anchor::Start => (0.0, span),
        Anchor::Middle => {
            let half_cut = (extent - span).max(0.0) / 2.0;
            (half_cut, span + half_cut)
        }
        Anchor::End => (extent - span, extent),
    }
}
