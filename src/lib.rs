//! # Image Variants
//!
//! Derive resized, cropped, and re-encoded variants of images through one
//! interface, whichever image engine happens to be installed.
//!
//! # Architecture: Capability-Selected Backends
//!
//! ```text
//!            BackendSelector ── probe ──▶ MagickBackend (ImageMagick CLI)
//!                  │          └─ probe ──▶ RustBackend   (image crate)
//!                  ▼
//!   reader ──▶ ImageBackend::open ──▶ ImageHandle ──▶ resize / crop / set_format ──▶ save ──▶ writer
//!                                          │
//!                                   geometry::crop_box
//! ```
//!
//! The selector walks a priority list (richest engine first), keeps the first
//! engine whose probe succeeds, and hands the same factory to every caller
//! from then on. Handles never own the streams they read from or write to.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Crop geometry, the backend traits, both engines, and the selector |
//! | [`config`] | `imaging.toml` loading, validation, and merging over stock defaults |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Two Engines, One Surface
//!
//! ImageMagick reads and writes far more formats than any pure Rust stack, but
//! it is a system dependency that may not be there. The `image` crate is always
//! compiled in. Both sit behind [`imaging::ImageHandle`], so callers never
//! branch on which one they got.
//!
//! ## Crop Geometry Is Backend-Independent
//!
//! Crop boxes are resolved once, in [`imaging::crop_box`], against the
//! handle's current dimensions. Engines only execute an absolute pixel box, so
//! both produce the same window for the same request.
//!
//! ## Selector Is a Value, Not a Global
//!
//! [`imaging::BackendSelector`] is owned by whoever needs it. Tests build their
//! own, and `reset` takes `&mut self`, so it cannot race with a resolve.

pub mod config;
pub mod imaging;
pub mod output;
