//! Box tree construction and geometry.
//!
//! [CSS 2.1 § 9 Visual formatting model](https://www.w3.org/TR/CSS2/visuren.html)
//!
//! Layout turns the node tree plus resolved styles into a tree of boxes with
//! absolute positions in device pixels. The model is intentionally small:
//!
//! ```text
//! Document
//!   └─ Block ─┬─ Block ...          (block mode: one box per child node)
//!             └─ Inline ─┬─ Line ─┬─ Text "hello"
//!                        │        └─ Input
//!                        └─ Line ...
//! ```
//!
//! Blocks stack vertically; each box's `y` is its previous sibling's bottom,
//! or its parent's `y` for the first child.
//!
//! Boxes live in a flat arena ([`LayoutTree`]) and refer to each other by
//! [`BoxId`]. Parent and previous-sibling links are plain indices.

mod flow;
mod font;

pub use flow::{BLOCK_ELEMENTS, layout};
pub use font::{ApproximateFontMetrics, FontMetrics, FontSpec, FontStyle, FontWeight};

use kestrel_common::Rect;
use kestrel_dom::{DomTree, NodeId};
use serde::Serialize;

use crate::style::StyleMap;

/// Index of a box in its [`LayoutTree`].
pub type BoxId = usize;

/// The kind of a layout box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BoxKind {
    /// The root box, inset from the viewport edges.
    Document,
    /// A box whose children are blocks stacked vertically.
    Block,
    /// A block-level box whose content is broken into [`BoxKind::Line`]s.
    Inline,
    /// One line of inline content.
    Line,
    /// One word of a text node.
    Text {
        /// The word.
        word: String,
        /// Resolved font.
        font: FontSpec,
    },
    /// An `input` or `button` atom of fixed width.
    Input {
        /// Resolved font.
        font: FontSpec,
        /// Text shown inside: the `value` attribute, or a button's label.
        text: String,
        /// Advance width of `text`, where the caret goes.
        text_width: f32,
    },
}

/// One box of the layout tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutBox {
    /// What kind of box this is.
    pub kind: BoxKind,
    /// The node this box renders.
    pub node: NodeId,
    /// Containing box.
    pub parent: Option<BoxId>,
    /// Previous sibling at the same level.
    pub previous: Option<BoxId>,
    /// Children in order.
    pub children: Vec<BoxId>,
    /// Left edge in device pixels.
    pub x: f32,
    /// Top edge in device pixels.
    pub y: f32,
    /// Width in device pixels.
    pub width: f32,
    /// Height in device pixels.
    pub height: f32,
}

impl LayoutBox {
    /// The box's own rectangle, before any transform.
    #[must_use]
    pub const fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Arena of boxes. Box 0 is the document box.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LayoutTree {
    boxes: Vec<LayoutBox>,
    zoom: f32,
}

impl LayoutTree {
    /// The document box, if layout has run.
    #[must_use]
    pub fn root(&self) -> Option<BoxId> {
        (!self.boxes.is_empty()).then_some(0)
    }

    /// Get a box by id.
    #[must_use]
    pub fn get(&self, id: BoxId) -> Option<&LayoutBox> {
        self.boxes.get(id)
    }

    /// All boxes in creation order.
    #[must_use]
    pub fn boxes(&self) -> &[LayoutBox] {
        &self.boxes
    }

    /// Zoom factor this tree was laid out at.
    #[must_use]
    pub const fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Total document height, including the vertical margins.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.boxes.first().map_or(0.0, |doc| doc.height)
    }

    /// Boxes in tree order (preorder), starting at the document box.
    #[must_use]
    pub fn preorder(&self) -> Vec<BoxId> {
        let mut order = Vec::with_capacity(self.boxes.len());
        let mut stack: Vec<BoxId> = self.root().into_iter().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.boxes[id].children.iter().rev().copied());
        }
        order
    }

    /// The first box, in tree order, that renders `node`.
    #[must_use]
    pub fn box_for_node(&self, node: NodeId) -> Option<BoxId> {
        self.preorder()
            .into_iter()
            .find(|&id| self.boxes[id].node == node)
    }

    /// The box's rectangle with every `transform: translate(...)` of its node
    /// and the node's ancestors applied.
    #[must_use]
    pub fn absolute_bounds(&self, id: BoxId, dom: &DomTree, styles: &StyleMap) -> Rect {
        let Some(layout_box) = self.boxes.get(id) else {
            return Rect::EMPTY;
        };
        let mut rect = layout_box.rect();
        let mut current = Some(layout_box.node);
        while let Some(node) = current {
            if let Some((dx, dy)) = styles.get(&node).and_then(|s| s.translation()) {
                rect = rect.translate(dx * self.zoom, dy * self.zoom);
            }
            current = dom.parent(node);
        }
        rect
    }

    /// The node of the topmost box (last in paint order) under the point.
    #[must_use]
    pub fn hit_test(&self, x: f32, y: f32, dom: &DomTree, styles: &StyleMap) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .rev()
            .find(|&id| self.absolute_bounds(id, dom, styles).contains_point(x, y))
            .map(|id| self.boxes[id].node)
    }
}
