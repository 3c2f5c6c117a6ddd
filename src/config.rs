//! Imaging configuration.
//!
//! Handles loading, validating, and merging `imaging.toml`. User files are
//! sparse: stock defaults are serialized to a TOML table and the user's
//! values are merged on top before deserializing.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [backend]
//! priority = ["magick", "rust"]  # Fallback order, richest engine first
//! # magick_binary = "magick"     # Skip the magick/convert search
//!
//! [output]
//! quality = 90                   # Lossy encoding quality (1-100)
//! # format = "webp"              # Default output format (omit = keep source format)
//!
//! [processing]
//! # max_processes = 4            # Parallel batch workers (omit = CPU cores)
//! max_pixels = 100000000         # Largest crop result, in pixels
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{BackendVariant, DEFAULT_MAX_PIXELS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE: &str = "imaging.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Imaging configuration loaded from `imaging.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagingConfig {
    /// Backend selection settings.
    pub backend: BackendConfig,
    /// Encoder settings for saved variants.
    pub output: OutputConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ImagingConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.priority.is_empty() {
            return Err(ConfigError::Validation(
                "backend.priority must not be empty".into(),
            ));
        }
        for (i, variant) in self.backend.priority.iter().enumerate() {
            if self.backend.priority[..i].contains(variant) {
                return Err(ConfigError::Validation(format!(
                    "backend.priority lists `{variant}` more than once"
                )));
            }
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.output.format.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "output.format must not be empty".into(),
            ));
        }
        if self.processing.max_pixels == 0 {
            return Err(ConfigError::Validation(
                "processing.max_pixels must be at least 1".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Backend selection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Variants tried by `resolve`, in order.
    pub priority: Vec<BackendVariant>,
    /// Explicit ImageMagick binary. When absent, `magick` then `convert` are tried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magick_binary: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            priority: BackendVariant::PRIORITY.to_vec(),
            magick_binary: None,
        }
    }
}

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Lossy encoding quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Output format applied when a request doesn't name one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            quality: 90,
            format: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel batch workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
    /// Largest `width * height` a crop may produce. Bounds the canvas
    /// allocated when a crop box runs past the image.
    pub max_pixels: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// Base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ImagingConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `imaging.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ImagingConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ImagingConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `imaging.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<ImagingConfig, ConfigError> {
    resolve_config(stock_defaults_value()?, load_raw_config(dir)?)
}

/// Returns a fully-commented stock `imaging.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image Variants Configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Backend selection
# ---------------------------------------------------------------------------
[backend]
# Engines tried in order until one is available.
#   magick - ImageMagick command-line tool (more formats)
#   rust   - built-in pure Rust engine (always available)
priority = ["magick", "rust"]

# ImageMagick binary to use. When unset, `magick` (IM7) then `convert` (IM6)
# are looked up on PATH.
# magick_binary = "/usr/local/bin/magick"

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[output]
# Lossy encoding quality (1 = worst, 100 = best). Used for JPEG, AVIF and
# by ImageMagick for every format that honours -quality.
quality = 90

# Default output format when a request doesn't name one. `jpg` is read as
# `jpeg`. When unset the source format is kept.
# format = "webp"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for `batch`. Omit for one per CPU core.
# Values above the core count are clamped down.
# max_processes = 4

# Largest crop result, in pixels. Crop windows may run past the image edge
# and get padded; requests above this size fail instead of allocating.
max_pixels = 100000000
"##
}
