//! Display List - a tree of drawing commands
//!
//! [CSS 2.1 Appendix E](https://www.w3.org/TR/CSS2/zindex.html)
//!
//! The display list is the output of the painting phase. Leaves draw; inner
//! items are visual effects (clip, layer, translation) applied to their
//! children. Items live in a flat arena and refer to each other by
//! [`DisplayItemId`]. Parent links are filled in as soon as an item adopts
//! its children, so every item can walk up to find its effect chain.

use kestrel_common::Rect;
use kestrel_dom::NodeId;
use serde::Serialize;

use super::canvas::Canvas;
use crate::layout::FontSpec;
use crate::values::{BlendMode, ColorValue};

/// Index of an item in its [`DisplayList`].
pub type DisplayItemId = usize;

/// A single drawing command or visual effect.
///
/// [CSS 2.1 Appendix E.2 Painting order](https://www.w3.org/TR/CSS2/zindex.html#painting-order)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ItemKind {
    /// Draw a run of text whose top-left corner is the item's rect origin.
    DrawText {
        /// The text to draw.
        text: String,
        /// Resolved font.
        font: FontSpec,
        /// Text color.
        color: ColorValue,
    },
    /// Fill the item's rect.
    DrawRect {
        /// Fill color.
        color: ColorValue,
    },
    /// Fill the item's rect with rounded corners.
    ///
    /// [§ 5 'border-radius'](https://www.w3.org/TR/css-backgrounds-3/#border-radius)
    DrawRRect {
        /// Corner radius in device pixels.
        radius: f32,
        /// Fill color.
        color: ColorValue,
    },
    /// Stroke a straight line.
    DrawLine {
        /// Start point.
        from: (f32, f32),
        /// End point.
        to: (f32, f32),
        /// Stroke color.
        color: ColorValue,
        /// Stroke width in device pixels.
        thickness: f32,
    },
    /// Stroke the edges of the item's rect.
    ///
    /// [CSS UI § 5 Outline properties](https://www.w3.org/TR/css-ui-4/#outline-props)
    DrawOutline {
        /// Stroke color.
        color: ColorValue,
        /// Stroke width in device pixels.
        thickness: f32,
    },
    /// Clip children to the item's rect with rounded corners.
    ///
    /// [§ 11.1.1 overflow](https://www.w3.org/TR/CSS2/visufx.html#overflow)
    ClipRRect {
        /// Node whose box is clipped.
        node: NodeId,
        /// Corner radius in device pixels.
        radius: f32,
        /// Whether the clip is active (`overflow: clip`).
        should_clip: bool,
    },
    /// Draw children into an isolated group, then blend it down.
    ///
    /// [Compositing and Blending § 3.4 Isolated groups](https://www.w3.org/TR/compositing-1/#isolatedgroups)
    SaveLayer {
        /// Node whose opacity and blend mode this applies.
        node: NodeId,
        /// Group opacity.
        opacity: f32,
        /// Blend mode used when compositing the group.
        blend: BlendMode,
        /// Whether a separate group is needed at all.
        should_save: bool,
    },
    /// Translate children.
    ///
    /// [CSS Transforms § 12](https://www.w3.org/TR/css-transforms-1/#transform-property)
    Transform {
        /// Node whose `transform` this applies.
        node: NodeId,
        /// Offset in device pixels, if any.
        translation: Option<(f32, f32)>,
    },
    /// Draw a pre-rastered composited layer at the item's rect.
    DrawCompositedLayer {
        /// Index of the layer in the compositor's layer list.
        layer: usize,
    },
}

impl ItemKind {
    /// Whether this item, on its own, must be kept out of a merged layer.
    #[must_use]
    pub const fn forces_compositing(&self) -> bool {
        match self {
            Self::ClipRRect { should_clip, .. } => *should_clip,
            Self::SaveLayer { should_save, .. } => *should_save,
            Self::Transform { translation, .. } => translation.is_some(),
            _ => false,
        }
    }

    /// The node a visual effect belongs to.
    #[must_use]
    pub const fn effect_node(&self) -> Option<NodeId> {
        match self {
            Self::ClipRRect { node, .. }
            | Self::SaveLayer { node, .. }
            | Self::Transform { node, .. } => Some(*node),
            _ => None,
        }
    }
}

/// One node of the display-item tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayItem {
    /// What to draw or apply.
    pub kind: ItemKind,
    /// Bounds in the coordinate space of the item's parent effect.
    pub rect: Rect,
    /// Children, back to front.
    pub children: Vec<DisplayItemId>,
    /// Enclosing effect.
    pub parent: Option<DisplayItemId>,
    /// Whether this item or any descendant forces compositing.
    pub needs_compositing: bool,
}

impl DisplayItem {
    /// Map a rect in this item's children's space to its parent's space.
    #[must_use]
    pub fn map(&self, rect: Rect) -> Rect {
        match self.kind {
            ItemKind::Transform {
                translation: Some((dx, dy)),
                ..
            } => rect.translate(dx, dy),
            ItemKind::ClipRRect {
                should_clip: true, ..
            } => rect.intersection(&self.rect),
            _ => rect,
        }
    }
}

/// An arena of display items with an ordered list of root items.
///
/// [CSS 2.1 Appendix E.2 Painting order](https://www.w3.org/TR/CSS2/zindex.html#painting-order)
///
/// Roots and children are stored back to front, so executing the roots in
/// order reproduces painter's order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayList {
    items: Vec<DisplayItem>,
    roots: Vec<DisplayItemId>,
}

impl DisplayList {
    /// Create an empty display list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Add a leaf item.
    pub fn leaf(&mut self, kind: ItemKind, rect: Rect) -> DisplayItemId {
        self.push(kind, rect, Vec::new())
    }

    /// Add an item that adopts `children`.
    ///
    /// `needs_compositing` is derived here from the item itself and its
    /// children, so children must be added first.
    pub fn push(&mut self, kind: ItemKind, rect: Rect, children: Vec<DisplayItemId>) -> DisplayItemId {
        let id = self.items.len();
        let needs_compositing = kind.forces_compositing()
            || children
                .iter()
                .any(|&c| self.items.get(c).is_some_and(|item| item.needs_compositing));
        for &child in &children {
            if let Some(item) = self.items.get_mut(child) {
                item.parent = Some(id);
            }
        }
        self.items.push(DisplayItem {
            kind,
            rect,
            children,
            parent: None,
            needs_compositing,
        });
        id
    }

    /// Append `child` to `parent`'s children.
    pub fn adopt(&mut self, parent: DisplayItemId, child: DisplayItemId) {
        let child_compositing = self.items.get(child).is_some_and(|c| c.needs_compositing);
        if let Some(item) = self.items.get_mut(child) {
            item.parent = Some(parent);
        }
        if let Some(item) = self.items.get_mut(parent) {
            item.children.push(child);
            item.needs_compositing |= child_compositing;
        }
    }

    /// Mark an item as a root, painted after the existing roots.
    pub fn push_root(&mut self, id: DisplayItemId) {
        self.roots.push(id);
    }

    /// Root items, back to front.
    #[must_use]
    pub fn roots(&self) -> &[DisplayItemId] {
        &self.roots
    }

    /// Get an item by id.
    #[must_use]
    pub fn get(&self, id: DisplayItemId) -> Option<&DisplayItem> {
        self.items.get(id)
    }

    /// All items in creation order.
    #[must_use]
    pub fn items(&self) -> &[DisplayItem] {
        &self.items
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every item reachable from the roots, parents before children.
    #[must_use]
    pub fn preorder(&self) -> Vec<DisplayItemId> {
        let mut order = Vec::with_capacity(self.items.len());
        let mut stack: Vec<DisplayItemId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(item) = self.items.get(id) {
                stack.extend(item.children.iter().rev().copied());
            }
        }
        order
    }

    /// Map an item's rect through every ancestor effect into page space.
    #[must_use]
    pub fn local_to_absolute(&self, id: DisplayItemId, rect: Rect) -> Rect {
        let mut rect = rect;
        let mut current = self.items.get(id).and_then(|item| item.parent);
        while let Some(parent) = current {
            let Some(item) = self.items.get(parent) else {
                break;
            };
            rect = item.map(rect);
            current = item.parent;
        }
        rect
    }

    /// The item's own rect in page space.
    #[must_use]
    pub fn absolute_bounds(&self, id: DisplayItemId) -> Rect {
        self.items
            .get(id)
            .map_or(Rect::EMPTY, |item| self.local_to_absolute(id, item.rect))
    }

    /// The `SaveLayer` painted for `node`, if any.
    #[must_use]
    pub fn save_layer_for(&self, node: NodeId) -> Option<DisplayItemId> {
        self.items.iter().position(|item| {
            matches!(item.kind, ItemKind::SaveLayer { node: n, .. } if n == node)
        })
    }

    /// Replay every root onto `canvas`.
    pub fn execute(&self, canvas: &mut dyn Canvas) {
        for &root in &self.roots {
            self.execute_item(root, canvas);
        }
    }

    /// Replay one item and its children onto `canvas`.
    pub fn execute_item(&self, id: DisplayItemId, canvas: &mut dyn Canvas) {
        let Some(item) = self.items.get(id) else {
            return;
        };
        match &item.kind {
            ItemKind::DrawText { text, font, color } => {
                canvas.draw_text(item.rect.x, item.rect.y, text, font, *color);
            }
            ItemKind::DrawRect { color } => canvas.draw_rect(item.rect, *color),
            ItemKind::DrawRRect { radius, color } => canvas.draw_rrect(item.rect, *radius, *color),
            ItemKind::DrawLine {
                from,
                to,
                color,
                thickness,
            } => canvas.draw_line(*from, *to, *color, *thickness),
            ItemKind::DrawOutline { color, thickness } => {
                let r = item.rect;
                let corners = [
                    (r.x, r.y),
                    (r.right(), r.y),
                    (r.right(), r.bottom()),
                    (r.x, r.bottom()),
                ];
                for i in 0..corners.len() {
                    let next = corners[(i + 1) % corners.len()];
                    canvas.draw_line(corners[i], next, *color, *thickness);
                }
            }
            ItemKind::ClipRRect {
                radius,
                should_clip,
                ..
            } => {
                if *should_clip {
                    canvas.save();
                    canvas.clip_rrect(item.rect, *radius);
                }
                self.execute_children(item, canvas);
                if *should_clip {
                    canvas.restore();
                }
            }
            ItemKind::SaveLayer {
                opacity,
                blend,
                should_save,
                ..
            } => {
                if *should_save {
                    canvas.save_layer(*opacity, *blend);
                }
                self.execute_children(item, canvas);
                if *should_save {
                    canvas.restore();
                }
            }
            ItemKind::Transform { translation, .. } => {
                if let Some((dx, dy)) = *translation {
                    canvas.save();
                    canvas.translate(dx, dy);
                    self.execute_children(item, canvas);
                    canvas.restore();
                } else {
                    self.execute_children(item, canvas);
                }
            }
            ItemKind::DrawCompositedLayer { layer } => canvas.draw_layer(*layer, item.rect),
        }
    }

    fn execute_children(&self, item: &DisplayItem, canvas: &mut dyn Canvas) {
        for &child in &item.children {
            self.execute_item(child, canvas);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(list: &mut DisplayList, rect: Rect) -> DisplayItemId {
        list.leaf(
            ItemKind::DrawText {
                text: "x".to_string(),
                font: FontSpec::default(),
                color: ColorValue::BLACK,
            },
            rect,
        )
    }

    #[test]
    fn test_compositing_propagates_to_ancestors() {
        let mut list = DisplayList::new();
        let leaf = text(&mut list, Rect::new(0.0, 0.0, 10.0, 10.0));
        let layer = list.push(
            ItemKind::SaveLayer {
                node: NodeId::ROOT,
                opacity: 0.5,
                blend: BlendMode::Normal,
                should_save: true,
            },
            Rect::new(0.0, 0.0, 10.0, 10.0),
            vec![leaf],
        );
        let clip = list.push(
            ItemKind::ClipRRect {
                node: NodeId::ROOT,
                radius: 0.0,
                should_clip: false,
            },
            Rect::new(0.0, 0.0, 10.0, 10.0),
            vec![layer],
        );
        assert!(!list.get(leaf).unwrap().needs_compositing);
        assert!(list.get(layer).unwrap().needs_compositing);
        assert!(list.get(clip).unwrap().needs_compositing);
        assert_eq!(list.get(leaf).unwrap().parent, Some(layer));
        assert_eq!(list.get(layer).unwrap().parent, Some(clip));
    }

    #[test]
    fn test_absolute_bounds_applies_translation_and_clip() {
        let mut list = DisplayList::new();
        let leaf = text(&mut list, Rect::new(0.0, 0.0, 50.0, 10.0));
        let moved = list.push(
            ItemKind::Transform {
                node: NodeId::ROOT,
                translation: Some((5.0, 0.0)),
            },
            Rect::new(0.0, 0.0, 50.0, 10.0),
            vec![leaf],
        );
        let _clip = list.push(
            ItemKind::ClipRRect {
                node: NodeId::ROOT,
                radius: 0.0,
                should_clip: true,
            },
            Rect::new(0.0, 0.0, 20.0, 10.0),
            vec![moved],
        );
        assert_eq!(list.absolute_bounds(leaf), Rect::new(5.0, 0.0, 15.0, 10.0));
    }

    #[test]
    fn test_adopt_links_parent_and_flag() {
        let mut list = DisplayList::new();
        let layer = list.push(
            ItemKind::Transform {
                node: NodeId::ROOT,
                translation: None,
            },
            Rect::EMPTY,
            Vec::new(),
        );
        let child = list.push(
            ItemKind::Transform {
                node: NodeId::ROOT,
                translation: Some((1.0, 1.0)),
            },
            Rect::EMPTY,
            Vec::new(),
        );
        assert!(!list.get(layer).unwrap().needs_compositing);
        list.adopt(layer, child);
        assert!(list.get(layer).unwrap().needs_compositing);
        assert_eq!(list.get(layer).unwrap().children, vec![child]);
    }
}
