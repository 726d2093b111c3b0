//! Layerization of display lists.
//!
//! [CSS Compositing § 3 Compositing groups](https://www.w3.org/TR/compositing-1/#csscompositingrules_CSS)
//!
//! The compositor splits a display list into [`CompositedLayer`]s that can
//! be rastered once and redrawn cheaply. Only the parts of the tree that do
//! not themselves need compositing are rastered into layers; the visual
//! effects above them are rebuilt into a separate draw list that draws the
//! layers.
//!
//! Layer assignment never reorders painting: an item joins the newest layer
//! it can merge with only if no newer layer overlaps it.

use std::collections::HashMap;

use kestrel_common::Rect;
use kestrel_css::{Canvas, DisplayItem, DisplayItemId, DisplayList, ItemKind};
use kestrel_dom::NodeId;
use tiny_skia::Pixmap;

use crate::fonts::FontCache;
use crate::raster::SkiaCanvas;

/// A run of display items rastered into one surface.
#[derive(Clone)]
pub struct CompositedLayer {
    items: Vec<DisplayItemId>,
    surface: Option<Pixmap>,
}

impl std::fmt::Debug for CompositedLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositedLayer")
            .field("items", &self.items)
            .field(
                "surface",
                &self.surface.as_ref().map(|s| (s.width(), s.height())),
            )
            .finish()
    }
}

impl CompositedLayer {
    fn new(item: DisplayItemId) -> Self {
        Self {
            items: vec![item],
            surface: None,
        }
    }

    /// Items in this layer, back to front.
    #[must_use]
    pub fn items(&self) -> &[DisplayItemId] {
        &self.items
    }

    /// The rastered surface, once [`raster`](Self::raster) has run.
    #[must_use]
    pub const fn surface(&self) -> Option<&Pixmap> {
        self.surface.as_ref()
    }

    /// An item can join this layer only if it shares the layer's effect
    /// chain, i.e. has the same parent as the layer's first item.
    fn can_merge(&self, list: &DisplayList, item: DisplayItemId) -> bool {
        let parent_of = |id| list.get(id).and_then(|i| i.parent);
        self.items
            .first()
            .is_some_and(|&first| parent_of(first) == parent_of(item))
    }

    /// Bounds of the items in the space of their shared parent effect,
    /// rounded out and grown by one pixel for anti-aliasing.
    #[must_use]
    pub fn composited_bounds(&self, list: &DisplayList) -> Rect {
        self.items
            .iter()
            .filter_map(|&id| list.get(id))
            .fold(Rect::EMPTY, |acc, item| acc.union(&item.rect))
            .round_out()
            .outset(1.0)
    }

    /// Bounds of the items in page space.
    #[must_use]
    pub fn absolute_bounds(&self, list: &DisplayList) -> Rect {
        self.items
            .iter()
            .fold(Rect::EMPTY, |acc, &id| acc.union(&list.absolute_bounds(id)))
    }

    /// Raster the items into a fresh surface sized to the composited bounds.
    ///
    /// An empty layer keeps no surface.
    pub fn raster(&mut self, list: &DisplayList, fonts: &FontCache) {
        let bounds = self.composited_bounds(list);
        if bounds.is_empty() {
            self.surface = None;
            return;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (width, height) = (bounds.width.max(1.0) as u32, bounds.height.max(1.0) as u32);
        self.surface = Pixmap::new(width, height);
        let Some(surface) = self.surface.as_mut() else {
            log::warn!(
                target: "kestrel::compositor",
                "could not allocate a {width}x{height} layer surface"
            );
            return;
        };
        let mut canvas = SkiaCanvas::new(surface, fonts, &[]);
        canvas.translate(-bounds.x, -bounds.y);
        for &item in &self.items {
            list.execute_item(item, &mut canvas);
        }
    }
}

/// Split a display list into composited layers.
///
/// Items are visited in preorder. An item is painted into a layer when it
/// does not need compositing itself and either has no parent or its parent
/// does. Layers are scanned newest first:
///
/// 1. a layer with the same parent takes the item;
/// 2. a layer whose absolute bounds intersect the item's stops the scan and
///    the item starts a new layer on top;
/// 3. if nothing matched, the item starts a new layer.
#[must_use]
pub fn composite(list: &DisplayList) -> Vec<CompositedLayer> {
    let mut layers: Vec<CompositedLayer> = Vec::new();
    for id in list.preorder() {
        let Some(item) = list.get(id) else {
            continue;
        };
        if item.needs_compositing {
            continue;
        }
        let parent_composites = item
            .parent
            .is_none_or(|parent| list.get(parent).is_some_and(|p| p.needs_compositing));
        if !parent_composites {
            continue;
        }

        let bounds = list.absolute_bounds(id);
        let mut placed = false;
        for layer in layers.iter_mut().rev() {
            if layer.can_merge(list, id) {
                layer.items.push(id);
                placed = true;
                break;
            }
            if layer.absolute_bounds(list).intersects(&bounds) {
                break;
            }
        }
        if !placed {
            layers.push(CompositedLayer::new(id));
        }
    }
    log::debug!(
        target: "kestrel::compositor",
        "composited {} items into {} layers",
        list.len(),
        layers.len()
    );
    layers
}

/// The kind of `item` as it should be drawn now: a `SaveLayer` whose node has a
/// paint-only update takes the updated parameters.
fn latest_kind(item: &DisplayItem, updates: Option<&HashMap<NodeId, DisplayItem>>) -> ItemKind {
    if let ItemKind::SaveLayer { node, .. } = item.kind
        && let Some(update) = updates.and_then(|u| u.get(&node))
        && matches!(update.kind, ItemKind::SaveLayer { .. })
    {
        return update.kind.clone();
    }
    item.kind.clone()
}

/// Build the draw list: one [`ItemKind::DrawCompositedLayer`] per layer,
/// wrapped in clones of the layer's ancestor effects.
///
/// Layers under the same effect share one clone of it, so the effect is
/// applied once to all of them. `updates` replaces the parameters of
/// `SaveLayer` effects changed by paint-only animations.
#[must_use]
pub fn paint_draw_list(
    layers: &[CompositedLayer],
    list: &DisplayList,
    updates: Option<&HashMap<NodeId, DisplayItem>>,
) -> DisplayList {
    let mut draw_list = DisplayList::new();
    let mut new_effects: HashMap<DisplayItemId, DisplayItemId> = HashMap::new();

    for (index, layer) in layers.iter().enumerate() {
        let Some(&first) = layer.items.first() else {
            continue;
        };
        let mut current = draw_list.leaf(
            ItemKind::DrawCompositedLayer { layer: index },
            layer.composited_bounds(list),
        );
        let mut parent = list.get(first).and_then(|item| item.parent);
        let mut attached = false;
        while let Some(effect_id) = parent {
            let Some(effect) = list.get(effect_id) else {
                break;
            };
            if let Some(&clone) = new_effects.get(&effect_id) {
                draw_list.adopt(clone, current);
                attached = true;
                break;
            }
            current = draw_list.push(latest_kind(effect, updates), effect.rect, vec![current]);
            let _ = new_effects.insert(effect_id, current);
            parent = effect.parent;
        }
        if !attached {
            draw_list.push_root(current);
        }
    }
    draw_list
}
