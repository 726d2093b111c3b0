//! Common utilities for the Kestrel pipeline.
//!
//! This crate provides shared infrastructure used by every pipeline stage:
//! - **Geometry** - the [`Rect`] type shared by layout, paint and compositing
//! - **Settings** - viewport and timing configuration loaded from JSON
//! - **Warning System** - deduplicated warnings for unsupported style input

pub mod config;
pub mod geometry;
pub mod warning;

pub use config::{ConfigError, Settings};
pub use geometry::Rect;
