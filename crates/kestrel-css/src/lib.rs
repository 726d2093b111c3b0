//! Style cascade, transitions, layout and paint for the Kestrel pipeline.
//!
//! # Scope
//!
//! This crate implements the document side of the rendering pipeline:
//!
//! - **Selectors and rules** ([Selectors Level 4](https://www.w3.org/TR/selectors-4/))
//!   - Tag, descendant and `:focus` selectors
//!   - Integer priority instead of specificity
//!   - `prefers-color-scheme` media conditions
//!
//! - **Cascade** ([CSS Cascading Level 4](https://www.w3.org/TR/css-cascade-4/))
//!   - Inheritance of font and color properties
//!   - Inline style overrides
//!   - Percentage font sizes
//!
//! - **Transitions** ([CSS Transitions Level 1](https://www.w3.org/TR/css-transitions-1/))
//!   - Frame-stepped animations of `opacity`, `width`, `height` and
//!     `transform: translate(...)`
//!
//! - **Layout** ([CSS 2.1 § 9](https://www.w3.org/TR/CSS2/visuren.html))
//!   - Block stacking and greedy inline line breaking
//!   - Input and button atoms
//!
//! - **Paint** ([CSS 2.1 Appendix E](https://www.w3.org/TR/CSS2/zindex.html))
//!   - Display-item trees with clip, group and translation effects
//!   - Replay onto an abstract [`Canvas`]
//!
//! # Not Yet Implemented
//!
//! - Margins, padding and borders
//! - Font shaping and bidirectional text
//! - Transforms other than translation

/// Frame-stepped transition animations.
pub mod animation;
/// Style computation per [CSS Cascading Level 4](https://www.w3.org/TR/css-cascade-4/).
pub mod cascade;
/// Box tree construction per [CSS 2.1 § 9](https://www.w3.org/TR/CSS2/visuren.html).
pub mod layout;
/// Display list and painting per [CSS 2.1 Appendix E](https://www.w3.org/TR/CSS2/zindex.html).
pub mod paint;
/// Selectors, rules and stylesheets per [Selectors Level 4](https://www.w3.org/TR/selectors-4/).
pub mod selector;
/// Resolved per-node styles.
pub mod style;
/// Default stylesheet per [WHATWG HTML § 15 Rendering](https://html.spec.whatwg.org/multipage/rendering.html).
pub mod ua;
/// Declaration value parsing per [CSS Values Level 4](https://www.w3.org/TR/css-values-4/).
pub mod values;

// Re-exports for convenience
pub use animation::Animation;
pub use cascade::{AnimationTick, StyleChanges, StyleState, compute_styles};
pub use layout::{
    ApproximateFontMetrics, BoxId, BoxKind, FontMetrics, FontSpec, FontStyle, FontWeight,
    LayoutBox, LayoutTree, layout,
};
pub use paint::{
    Canvas, CanvasCommand, DisplayItem, DisplayItemId, DisplayList, ItemKind, RecordingCanvas,
    paint,
};
pub use selector::{MediaQuery, Selector, StyleRule, Stylesheet};
pub use style::{ComputedStyle, DEFAULT_FONT_SIZE_PX, StyleMap};
pub use ua::default_stylesheet;
pub use values::{BlendMode, ColorValue, Outline};
