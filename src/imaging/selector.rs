//! Backend selection: lazy, memoized, overridable.
//!
//! A [`BackendSelector`] is an ordinary value owned by the application (or by
//! a single test), not process-global state. It holds:
//!
//! - a **priority list** of [`BackendVariant`]s, richest engine first;
//! - the settings each variant's **capability probe** needs;
//! - the **memoized** factory, once one has been chosen.
//!
//! [`resolve`](BackendSelector::resolve) walks the priority list, skipping
//! variants whose probe reports [`BackendError::Unavailable`], and memoizes
//! the first that succeeds. [`select`](BackendSelector::select) forces a
//! variant. [`reset`](BackendSelector::reset) forgets the choice; it takes
//! `&mut self`, so it cannot run while another thread is resolving.
//!
//! ```
//! # use image_variants::imaging::{BackendSelector, BackendVariant};
//! let selector = BackendSelector::with_priority(vec![BackendVariant::Rust]);
//! let backend = selector.resolve().unwrap();
//! assert_eq!(backend.variant(), BackendVariant::Rust);
//! ```

use super::backend::{BackendError, BackendVariant, ImageBackend};
use super::magick_backend::MagickBackend;
use super::params::{DEFAULT_MAX_PIXELS, Quality};
use super::rust_backend::RustBackend;
use crate::config::{BackendConfig, ImagingConfig};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

pub struct BackendSelector {
    priority: Vec<BackendVariant>,
    magick_binary: Option<String>,
    quality: Quality,
    max_pixels: u64,
    active: RwLock<Option<Arc<dyn ImageBackend>>>,
}

impl BackendSelector {
    pub fn new(backend: &BackendConfig, quality: Quality) -> Self {
        Self {
            priority: backend.priority.clone(),
            magick_binary: backend.magick_binary.clone(),
            quality,
            max_pixels: DEFAULT_MAX_PIXELS,
            active: RwLock::new(None),
        }
    }

    pub fn from_config(config: &ImagingConfig) -> Self {
        Self::new(&config.backend, Quality::new(config.output.quality))
            .max_pixels(config.processing.max_pixels)
    }

    /// Selector with a custom fallback order and default settings.
    pub fn with_priority(priority: Vec<BackendVariant>) -> Self {
        Self::new(
            &BackendConfig {
                priority,
                ..BackendConfig::default()
            },
            Quality::default(),
        )
    }

    /// Use a specific ImageMagick binary instead of searching for one.
    pub fn magick_binary(mut self, binary: impl Into<String>) -> Self {
        self.magick_binary = Some(binary.into());
        self
    }

    /// Pixel limit for crop results on every backend this selector builds.
    pub fn max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn priority(&self) -> &[BackendVariant] {
        &self.priority
    }

    /// Run a variant's capability probe without touching the memoized choice.
    pub fn probe(&self, variant: BackendVariant) -> Result<Arc<dyn ImageBackend>, BackendError> {
        let backend: Arc<dyn ImageBackend> = match variant {
            BackendVariant::Magick => Arc::new(
                MagickBackend::probe(self.magick_binary.as_deref(), self.quality)?
                    .with_max_pixels(self.max_pixels),
            ),
            BackendVariant::Rust => Arc::new(
                RustBackend::probe(self.quality)?.with_max_pixels(self.max_pixels),
            ),
        };
        Ok(backend)
    }

    /// Probe every known variant, in priority order first, for reporting.
    pub fn probe_all(&self) -> Vec<(BackendVariant, Result<(), String>)> {
        let mut variants = self.priority.clone();
        for variant in BackendVariant::PRIORITY {
            if !variants.contains(&variant) {
                variants.push(variant);
            }
        }
        variants
            .into_iter()
            .map(|variant| {
                let status = self.probe(variant).map(|_| ()).map_err(|e| e.to_string());
                (variant, status)
            })
            .collect()
    }

    /// Force `variant` to be the active backend.
    ///
    /// A no-op returning the current factory when `variant` is already active.
    pub fn select(&self, variant: BackendVariant) -> Result<Arc<dyn ImageBackend>, BackendError> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = active.as_ref().filter(|b| b.variant() == variant) {
            return Ok(Arc::clone(current));
        }
        let backend = self.probe(variant)?;
        info!(%variant, "imaging backend selected");
        *active = Some(Arc::clone(&backend));
        Ok(backend)
    }

    pub fn force_magick(&self) -> Result<Arc<dyn ImageBackend>, BackendError> {
        self.select(BackendVariant::Magick)
    }

    pub fn force_rust(&self) -> Result<Arc<dyn ImageBackend>, BackendError> {
        self.select(BackendVariant::Rust)
    }

    /// The active backend, choosing one on first use.
    pub fn resolve(&self) -> Result<Arc<dyn ImageBackend>, BackendError> {
        if let Some(backend) = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(backend));
        }

        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have finished resolving while we waited
        if let Some(backend) = active.as_ref() {
            return Ok(Arc::clone(backend));
        }

        let mut attempts = Vec::new();
        for &variant in &self.priority {
            match self.probe(variant) {
                Ok(backend) => {
                    info!(%variant, "imaging backend resolved");
                    *active = Some(Arc::clone(&backend));
                    return Ok(backend);
                }
                Err(BackendError::Unavailable { reason, .. }) => {
                    warn!(%variant, %reason, "imaging backend unavailable, trying next");
                    attempts.push((variant, reason));
                }
                Err(other) => return Err(other),
            }
        }
        Err(BackendError::NoneAvailable { attempts })
    }

    /// Variant currently memoized, if any. Never probes.
    pub fn selected(&self) -> Option<BackendVariant> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|b| b.variant())
    }

    /// Forget the memoized backend so the next `resolve` searches again.
    pub fn reset(&mut self) {
        *self.active.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::from_config(&ImagingConfig::default())
    }
}
