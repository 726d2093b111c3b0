//! CSS Painting
//!
//! [CSS 2.1 Appendix E - Elaborate description of Stacking Contexts](https://www.w3.org/TR/CSS2/zindex.html)
//!
//! This module implements the painting phase, which converts a layout tree into
//! a display list: a tree of drawing commands and the visual effects that
//! apply to them. The display list can then be replayed onto any [`Canvas`].
//!
//! # Architecture
//!
//! ```text
//! Style → Layout → Paint → Composite → Raster
//!                    ↓
//!              DisplayList
//! ```
//!
//! Effects (clip, group opacity/blend, translation) are inner items rather
//! than state changes, so the compositor can lift subtrees into separate
//! layers and re-apply the chain of effects above them.

mod canvas;
mod display_list;
mod painter;

pub use canvas::{Canvas, CanvasCommand, RecordingCanvas};
pub use display_list::{DisplayItem, DisplayItemId, DisplayList, ItemKind};
pub use painter::paint;
