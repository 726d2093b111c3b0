//! The snapshot a tab hands to the compositor after rendering a frame.

use std::collections::HashMap;

use kestrel_css::{DisplayItem, DisplayList};
use kestrel_dom::NodeId;
use url::Url;

use crate::accessibility::AccessibilityNode;

/// Everything the compositor thread needs from one rendered frame.
///
/// The tab keeps its own trees; the compositor only ever sees these
/// copies.
#[derive(Debug, Clone)]
pub struct CommitData {
    /// The document's URL, if a document is loaded.
    pub url: Option<Url>,
    /// A scroll offset the tab wants applied, or `None` to keep the
    /// compositor's.
    pub scroll: Option<f32>,
    /// Document height in device pixels.
    pub height: f32,
    /// The full display list. Unused when only `composited_updates` changed.
    pub display_list: DisplayList,
    /// `SaveLayer` items changed by paint-only animations, keyed by node.
    /// `None` means the display list changed and must be recomposited.
    pub composited_updates: Option<HashMap<NodeId, DisplayItem>>,
    /// The accessibility tree, when it was rebuilt this frame.
    pub accessibility_tree: Option<AccessibilityNode>,
    /// The focused node.
    pub focus: Option<NodeId>,
}

impl CommitData {
    /// Whether the compositor must rebuild its layers.
    #[must_use]
    pub const fn needs_composite(&self) -> bool {
        self.composited_updates.is_none()
    }
}

/// Clamp a scroll offset to `[0, max(0, doc_height - viewport_height)]`.
///
/// Idempotent, and never negative even for documents shorter than the
/// viewport.
#[must_use]
pub fn clamp_scroll(scroll: f32, doc_height: f32, viewport_height: f32) -> f32 {
    let max_scroll = (doc_height - viewport_height).max(0.0);
    if scroll.is_nan() {
        return 0.0;
    }
    scroll.clamp(0.0, max_scroll)
}
