//! High-level image operations.
//!
//! These functions drive a backend through a full open → transform → save
//! cycle. They never touch the filesystem: callers pass in the streams.

use super::backend::{BackendError, BackendVariant, ImageBackend, ImageHandle};
use super::format::normalize_format;
use super::geometry::CropSpec;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// What one variant of a source image should look like.
///
/// Steps run in a fixed order: resize, then crop (against the resized
/// dimensions), then re-encode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VariantRequest {
    /// Bounding box to downscale into, keeping aspect ratio.
    pub max_size: Option<(u32, u32)>,
    pub crop: Option<CropSpec>,
    /// Output format. `None` keeps the source format.
    pub format: Option<String>,
}

impl VariantRequest {
    /// Fill in `format` when the request doesn't name one.
    pub fn or_format(mut self, format: Option<&str>) -> Self {
        if self.format.is_none() {
            self.format = format.map(str::to_string);
        }
        self
    }
}

/// Format and dimensions of an image at one point in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub format: String,
    pub mimetype: String,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    fn of(handle: &dyn ImageHandle) -> Self {
        Self {
            format: handle.format().to_string(),
            mimetype: handle.mimetype().to_string(),
            width: handle.width(),
            height: handle.height(),
        }
    }
}

/// Outcome of [`create_variant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantSummary {
    pub backend: BackendVariant,
    pub source: ImageInfo,
    pub output: ImageInfo,
}

/// Decode `source` and report its format and dimensions.
pub fn identify(backend: &dyn ImageBackend, source: &mut dyn Read) -> Result<ImageInfo> {
    let handle = backend.open(source)?;
    Ok(ImageInfo::of(handle.as_ref()))
}

/// Produce one variant of `source` and write it to `sink`.
pub fn create_variant(
    backend: &dyn ImageBackend,
    source: &mut dyn Read,
    sink: &mut dyn Write,
    request: &VariantRequest,
) -> Result<VariantSummary> {
    let mut handle = backend.open(source)?;
    let source_info = ImageInfo::of(handle.as_ref());

    if let Some((max_width, max_height)) = request.max_size {
        handle.resize(max_width, max_height)?;
    }
    if let Some(spec) = &request.crop {
        handle.crop(spec)?;
    }
    if let Some(format) = &request.format {
        handle.set_format(format);
    }

    let output = ImageInfo::of(handle.as_ref());
    debug!(
        backend = %backend.variant(),
        from = %source_info.format,
        to = %output.format,
        width = output.width,
        height = output.height,
        "encoding variant"
    );
    handle.save(sink)?;

    Ok(VariantSummary {
        backend: backend.variant(),
        source: source_info,
        output,
    })
}

/// File extension for a variant in `format`.
///
/// `jpeg` becomes `jpg`, the extension most tools expect.
pub fn extension_for(format: &str) -> String {
    match normalize_format(format).as_str() {
        "jpeg" => "jpg".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::{Gravity, PixelBox};

    fn run(backend: &MockBackend, input: &str, request: &VariantRequest) -> (VariantSummary, String) {
        let mut sink = Vec::new();
        let summary = create_variant(backend, &mut input.as_bytes(), &mut sink, request).unwrap();
        (summary, String::from_utf8(sink).unwrap())
    }

    // =========================================================================
    // identify
    // =========================================================================

    #[test]
    fn identify_reports_format_and_dimensions() {
        let backend = MockBackend::new();
        let info = identify(&backend, &mut "640x480".as_bytes()).unwrap();
        assert_eq!(
            info,
            ImageInfo {
                format: "png".into(),
                mimetype: "image/png".into(),
                width: 640,
                height: 480,
            }
        );
        assert_eq!(
            backend.get_operations(),
            vec![RecordedOp::Open { width: 640, height: 480 }]
        );
    }

    #[test]
    fn identify_propagates_decode_errors() {
        let backend = MockBackend::new();
        let result = identify(&backend, &mut "not an image".as_bytes());
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    // =========================================================================
    // create_variant
    // =========================================================================

    #[test]
    fn empty_request_reencodes_unchanged() {
        let backend = MockBackend::new();
        let (summary, output) = run(&backend, "300x200", &VariantRequest::default());

        assert_eq!(output, "png:300x200");
        assert_eq!(summary.source, summary.output);
        assert_eq!(
            backend.get_operations(),
            vec![
                RecordedOp::Open { width: 300, height: 200 },
                RecordedOp::Save { format: "png".into(), width: 300, height: 200 },
            ]
        );
    }

    #[test]
    fn resize_then_crop_then_format() {
        let backend = MockBackend::new();
        let request = VariantRequest {
            max_size: Some((400, 400)),
            crop: Some(CropSpec::anchored(Gravity::North, 200.0, 100.0)),
            format: Some("jpg".into()),
        };
        let (summary, output) = run(&backend, "800x600", &request);

        assert_eq!(
            backend.get_operations(),
            vec![
                RecordedOp::Open { width: 800, height: 600 },
                RecordedOp::Resize { max_width: 400, max_height: 400 },
                // North on 400x300: centered horizontally, top edge
                RecordedOp::Crop(PixelBox { left: 100, top: 0, right: 300, bottom: 100 }),
                RecordedOp::SetFormat("jpg".into()),
                RecordedOp::Save { format: "jpeg".into(), width: 200, height: 100 },
            ]
        );
        assert_eq!(output, "jpeg:200x100");
        assert_eq!(summary.backend, BackendVariant::Rust);
        assert_eq!(summary.source.width, 800);
        assert_eq!(summary.output.mimetype, "image/jpeg");
    }

    #[test]
    fn crop_error_stops_before_save() {
        let backend = MockBackend::new();
        let request = VariantRequest {
            crop: Some(CropSpec {
                gravity: Some("middle".into()),
                width: Some(10.0),
                height: Some(10.0),
                ..CropSpec::default()
            }),
            ..VariantRequest::default()
        };
        let mut sink = Vec::new();
        let result = create_variant(&backend, &mut "100x100".as_bytes(), &mut sink, &request);

        assert!(matches!(result, Err(BackendError::Geometry(_))));
        assert!(sink.is_empty());
        assert!(
            !backend
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Save { .. }))
        );
    }

    #[test]
    fn or_format_keeps_explicit_format() {
        let explicit = VariantRequest {
            format: Some("png".into()),
            ..VariantRequest::default()
        };
        assert_eq!(explicit.or_format(Some("webp")).format.as_deref(), Some("png"));
        assert_eq!(
            VariantRequest::default().or_format(Some("webp")).format.as_deref(),
            Some("webp")
        );
        assert_eq!(VariantRequest::default().or_format(None).format, None);
    }

    #[test]
    fn request_parses_from_json() {
        let request: VariantRequest = serde_json::from_str(
            r#"{"max_size": [1200, 800], "crop": {"gravity": "south", "width": 400, "height": 300}}"#,
        )
        .unwrap();
        assert_eq!(request.max_size, Some((1200, 800)));
        assert_eq!(
            request.crop,
            Some(CropSpec::anchored(Gravity::South, 400.0, 300.0))
        );
        assert_eq!(request.format, None);
    }

    #[test]
    fn extension_for_formats() {
        assert_eq!(extension_for("jpg"), "jpg");
        assert_eq!(extension_for("jpeg"), "jpg");
        assert_eq!(extension_for("webp"), "webp");
        assert_eq!(extension_for("PNG"), "png");
    }
}
