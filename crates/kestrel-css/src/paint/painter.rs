//! Painter - generates a display list from the layout tree
//!
//! [CSS 2.1 Appendix E.2 Painting order](https://www.w3.org/TR/CSS2/zindex.html#painting-order)
//!
//! The painter walks the box tree depth first. Each box contributes its own
//! drawing commands, then its children's, and the whole group is wrapped in
//! the box's visual effects. Sibling order is paint order.

use kestrel_common::Rect;
use kestrel_dom::{DomTree, NodeId};

use super::{DisplayItemId, DisplayList, ItemKind};
use crate::layout::{BoxId, BoxKind, LayoutBox, LayoutTree};
use crate::style::{ComputedStyle, StyleMap};
use crate::values::{BlendMode, ColorValue, Outline};

/// The ring drawn around a focused element that has no `outline` of its own.
///
/// [CSS UI § 5.5 'outline-style'](https://www.w3.org/TR/css-ui-4/#outline-style)
const FOCUS_RING: Outline = Outline {
    width: 1.0,
    color: ColorValue::BLACK,
};

/// Paint a laid-out document.
///
/// An empty layout produces an empty list.
#[must_use]
pub fn paint(layout: &LayoutTree, dom: &DomTree, styles: &StyleMap) -> DisplayList {
    let mut painter = Painter {
        layout,
        dom,
        styles,
        list: DisplayList::new(),
    };
    if let Some(root) = layout.root() {
        for id in painter.paint_tree(root) {
            painter.list.push_root(id);
        }
    }
    log::debug!(
        target: "kestrel::paint",
        "painted {} display items",
        painter.list.len()
    );
    painter.list
}

struct Painter<'a> {
    layout: &'a LayoutTree,
    dom: &'a DomTree,
    styles: &'a StyleMap,
    list: DisplayList,
}

impl<'a> Painter<'a> {
    fn style(&self, node: NodeId) -> Option<&'a ComputedStyle> {
        self.styles.get(&node)
    }

    fn zoom(&self) -> f32 {
        self.layout.zoom()
    }

    /// Paint one box and its subtree, returning the items to place in the
    /// parent's group.
    fn paint_tree(&mut self, id: BoxId) -> Vec<DisplayItemId> {
        let layout = self.layout;
        let Some(layout_box) = layout.get(id) else {
            return Vec::new();
        };
        let should_paint = self.should_paint(layout_box);

        let mut items = Vec::new();
        if should_paint {
            self.paint_box(layout_box, &mut items);
        }
        for &child in &layout_box.children {
            let child_items = self.paint_tree(child);
            items.extend(child_items);
        }
        if !should_paint {
            return items;
        }
        match layout_box.kind {
            BoxKind::Block | BoxKind::Inline | BoxKind::Input { .. } => {
                vec![self.paint_visual_effects(layout_box.node, items, layout_box.rect())]
            }
            BoxKind::Document | BoxKind::Line | BoxKind::Text { .. } => items,
        }
    }

    /// Boxes of `input` and `button` elements outside the inline atom only
    /// hold the atom; the atom paints the control.
    fn should_paint(&self, layout_box: &LayoutBox) -> bool {
        match layout_box.kind {
            BoxKind::Block | BoxKind::Inline => !matches!(
                self.dom.tag_name(layout_box.node),
                Some("input" | "button")
            ),
            _ => true,
        }
    }

    /// The box's own commands, painted below its children.
    fn paint_box(&mut self, layout_box: &LayoutBox, items: &mut Vec<DisplayItemId>) {
        let rect = layout_box.rect();
        match &layout_box.kind {
            BoxKind::Document => {}
            BoxKind::Block | BoxKind::Inline => {
                self.paint_background(layout_box.node, rect, items);
                if layout_box.kind == BoxKind::Block {
                    self.paint_outline(layout_box.node, rect, items);
                }
            }
            BoxKind::Line => self.paint_line_outlines(layout_box, items),
            BoxKind::Text { word, font } => {
                let color = self
                    .style(layout_box.node)
                    .map_or(ColorValue::BLACK, ComputedStyle::color);
                items.push(self.list.leaf(
                    ItemKind::DrawText {
                        text: word.clone(),
                        font: *font,
                        color,
                    },
                    rect,
                ));
            }
            BoxKind::Input {
                font,
                text,
                text_width,
            } => {
                let node = layout_box.node;
                let color = self.style(node).map_or(ColorValue::BLACK, ComputedStyle::color);
                self.paint_background(node, rect, items);
                if !text.is_empty() {
                    items.push(self.list.leaf(
                        ItemKind::DrawText {
                            text: text.clone(),
                            font: *font,
                            color,
                        },
                        Rect::new(rect.x, rect.y, *text_width, rect.height),
                    ));
                }
                // [HTML § 6.6.3 Focus](https://html.spec.whatwg.org/multipage/interaction.html#focus)
                // A focused text field shows a caret at the end of its value.
                let focused = self.dom.as_element(node).is_some_and(|e| e.focused);
                if focused && self.dom.tag_name(node) == Some("input") {
                    let x = rect.x + text_width;
                    items.push(self.list.leaf(
                        ItemKind::DrawLine {
                            from: (x, rect.y),
                            to: (x, rect.bottom()),
                            color,
                            thickness: 1.0,
                        },
                        Rect::new(x, rect.y, 1.0, rect.height),
                    ));
                }
                self.paint_outline(node, rect, items);
            }
        }
    }

    /// [CSS Backgrounds § 3.10](https://www.w3.org/TR/css-backgrounds-3/#background-color)
    fn paint_background(&mut self, node: NodeId, rect: Rect, items: &mut Vec<DisplayItemId>) {
        let Some(style) = self.style(node) else {
            return;
        };
        let Some(color) = style.background_color() else {
            return;
        };
        let radius = style.border_radius() * self.zoom();
        let kind = if radius > 0.0 {
            ItemKind::DrawRRect { radius, color }
        } else {
            ItemKind::DrawRect { color }
        };
        items.push(self.list.leaf(kind, rect));
    }

    /// The outline an element paints: its own, or the focus ring.
    fn outline_for(&self, node: NodeId) -> Option<Outline> {
        let element = self.dom.as_element(node)?;
        match self.style(node).and_then(ComputedStyle::outline) {
            Some(outline) => Some(outline),
            None if element.focused => Some(FOCUS_RING),
            None => None,
        }
    }

    /// [CSS UI § 5 Outline properties](https://www.w3.org/TR/css-ui-4/#outline-props)
    fn paint_outline(&mut self, node: NodeId, rect: Rect, items: &mut Vec<DisplayItemId>) {
        let Some(outline) = self.outline_for(node) else {
            return;
        };
        items.push(self.list.leaf(
            ItemKind::DrawOutline {
                color: outline.color,
                thickness: outline.width * self.zoom(),
            },
            rect,
        ));
    }

    /// Inline elements have no box of their own, so a line outlines the
    /// words of each outlined element it contains.
    fn paint_line_outlines(&mut self, line: &LayoutBox, items: &mut Vec<DisplayItemId>) {
        let mut outlined: Vec<(NodeId, Rect)> = Vec::new();
        for &child in &line.children {
            let Some(atom) = self.layout.get(child) else {
                continue;
            };
            if !matches!(atom.kind, BoxKind::Text { .. }) {
                continue;
            }
            let Some(element) = self.dom.parent(atom.node) else {
                continue;
            };
            if self.outline_for(element).is_none() {
                continue;
            }
            match outlined.iter_mut().find(|(node, _)| *node == element) {
                Some((_, rect)) => *rect = rect.union(&atom.rect()),
                None => outlined.push((element, atom.rect())),
            }
        }
        for (element, rect) in outlined {
            self.paint_outline(element, rect, items);
        }
    }

    /// [CSS Compositing § 3](https://www.w3.org/TR/compositing-1/)
    ///
    /// Wrap `children` in the node's clip, group and translation:
    ///
    /// ```text
    /// Transform (translate)            only when a translation is set
    ///   └─ SaveLayer (opacity, mix-blend-mode)
    ///        └─ ClipRRect (overflow: clip, border-radius)
    ///             └─ children
    /// ```
    fn paint_visual_effects(
        &mut self,
        node: NodeId,
        children: Vec<DisplayItemId>,
        rect: Rect,
    ) -> DisplayItemId {
        let zoom = self.zoom();
        let (opacity, blend, radius, should_clip, translation) = self.style(node).map_or(
            (1.0, BlendMode::Normal, 0.0, false, None),
            |style| {
                (
                    style.opacity(),
                    style.blend_mode(),
                    style.border_radius() * zoom,
                    style.clips_overflow(),
                    style.translation(),
                )
            },
        );
        let bounds = self.union_of(&children).union(&rect);

        let clip = self.list.push(
            ItemKind::ClipRRect {
                node,
                radius,
                should_clip,
            },
            if should_clip { rect } else { bounds },
            children,
        );
        let should_save = blend != BlendMode::Normal || opacity < 1.0 || should_clip;
        let layer = self.list.push(
            ItemKind::SaveLayer {
                node,
                opacity,
                blend,
                should_save,
            },
            bounds,
            vec![clip],
        );
        match translation {
            Some((dx, dy)) => self.list.push(
                ItemKind::Transform {
                    node,
                    translation: Some((dx * zoom, dy * zoom)),
                },
                bounds,
                vec![layer],
            ),
            None => layer,
        }
    }

    fn union_of(&self, items: &[DisplayItemId]) -> Rect {
        items
            .iter()
            .filter_map(|&id| self.list.get(id))
            .fold(Rect::EMPTY, |acc, item| acc.union(&item.rect))
    }
}
