//! CSS Cascading and Style Computation
//!
//! This module implements style computation loosely following
//! [CSS Cascading and Inheritance Level 4](https://www.w3.org/TR/css-cascade-4/),
//! with two deliberate simplifications: rules are ordered by a small integer
//! priority instead of specificity, and only four properties inherit.
//!
//! Styles are recomputed from scratch on every style pass. The previous pass's
//! result is kept in [`StyleState`] so that changed values of properties listed
//! in `transition` can start an [`Animation`] instead of jumping.

use std::collections::HashMap;

use kestrel_common::warning::warn_once;
use kestrel_dom::{DomTree, NodeData, NodeId};

use crate::animation::Animation;
use crate::selector::{StyleRule, Stylesheet};
use crate::style::{ComputedStyle, DEFAULT_FONT_SIZE_PX, StyleMap};
use crate::values::{parse_percent, parse_px};

/// [§ 7 Inheritance](https://www.w3.org/TR/css-cascade-4/#inheriting)
///
/// Properties seeded from the parent's resolved style, with the document
/// defaults used at the root. `color` is handled separately because its
/// default depends on the color scheme.
const INHERITED_PROPERTIES: &[(&str, &str)] = &[
    ("font-size", "16px"),
    ("font-style", "normal"),
    ("font-weight", "normal"),
];

/// Per-document style results and running animations.
#[derive(Debug, Clone, Default)]
pub struct StyleState {
    styles: StyleMap,
    animations: HashMap<NodeId, HashMap<String, Animation>>,
}

/// What a style pass started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleChanges {
    /// At least one transition began.
    pub animations_started: bool,
    /// A started transition animates a property that affects geometry.
    pub affects_layout: bool,
}

/// One property advanced by [`StyleState::advance_animations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationTick {
    /// Node whose style changed.
    pub node: NodeId,
    /// The animated property.
    pub property: String,
    /// The animation reached its end value and was dropped.
    pub finished: bool,
}

impl StyleState {
    /// Create an empty state (no node has been styled yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved styles of every styled node.
    #[must_use]
    pub const fn styles(&self) -> &StyleMap {
        &self.styles
    }

    /// Resolved style of one node.
    #[must_use]
    pub fn style(&self, node: NodeId) -> Option<&ComputedStyle> {
        self.styles.get(&node)
    }

    /// Running animation for a node's property.
    #[must_use]
    pub fn animation(&self, node: NodeId, property: &str) -> Option<&Animation> {
        self.animations.get(&node)?.get(property)
    }

    /// Whether any animation is running.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        !self.animations.is_empty()
    }

    /// Advance every running animation by one frame.
    ///
    /// Each stepped property gets its new value written into the node's
    /// style. An animation that has run out writes its end value and is
    /// removed.
    pub fn advance_animations(&mut self) -> Vec<AnimationTick> {
        let mut ticks = Vec::new();
        for (&node, properties) in &mut self.animations {
            let Some(style) = self.styles.get_mut(&node) else {
                properties.clear();
                continue;
            };
            properties.retain(|property, animation| {
                let (value, finished) = match animation.animate() {
                    Some(value) => (value, false),
                    None => (animation.end_value(), true),
                };
                let _ = style.set(property, value);
                ticks.push(AnimationTick {
                    node,
                    property: property.clone(),
                    finished,
                });
                !finished
            });
        }
        self.animations.retain(|_, properties| !properties.is_empty());
        ticks
    }
}

/// Read-only inputs shared by every node of one style pass.
struct Cascade<'a> {
    tree: &'a DomTree,
    rules: Vec<&'a StyleRule>,
    dark_mode: bool,
    frame_interval: f32,
    old_styles: StyleMap,
    old_animations: HashMap<NodeId, HashMap<String, Animation>>,
}

/// [§ 6 Cascading](https://www.w3.org/TR/css-cascade-4/#cascading)
///
/// Compute styles for every node reachable from the root and store them in
/// `state`, replacing the previous pass.
///
/// `frame_interval` is the animation frame period in seconds; transition
/// durations are divided by it to size animations in frames.
pub fn compute_styles(
    tree: &DomTree,
    sheet: &Stylesheet,
    state: &mut StyleState,
    dark_mode: bool,
    frame_interval: f32,
) -> StyleChanges {
    // [Media Queries](https://www.w3.org/TR/mediaqueries-5/)
    // Rules whose media condition disagrees with the color scheme never apply.
    let rules = sheet
        .cascade_order()
        .into_iter()
        .filter(|rule| rule.media.is_none_or(|m| m.applies(dark_mode)))
        .collect();

    let mut cascade = Cascade {
        tree,
        rules,
        dark_mode,
        frame_interval,
        old_styles: std::mem::take(&mut state.styles),
        old_animations: std::mem::take(&mut state.animations),
    };

    let mut changes = StyleChanges::default();
    let mut styles = StyleMap::new();
    let mut animations = HashMap::new();
    cascade.style_node(
        tree.root(),
        None,
        &mut styles,
        &mut animations,
        &mut changes,
    );

    state.styles = styles;
    state.animations = animations;
    log::debug!(
        target: "kestrel::style",
        "styled {} nodes, {} animating",
        state.styles.len(),
        state.animations.len()
    );
    changes
}

impl Cascade<'_> {
    fn style_node(
        &mut self,
        id: NodeId,
        parent: Option<&ComputedStyle>,
        styles: &mut StyleMap,
        animations: &mut HashMap<NodeId, HashMap<String, Animation>>,
        changes: &mut StyleChanges,
    ) {
        let Some(node) = self.tree.get(id) else {
            return;
        };

        // Step 1: inherited properties.
        let mut computed = ComputedStyle::new();
        for &(property, default) in INHERITED_PROPERTIES {
            let value = parent.and_then(|p| p.get(property)).unwrap_or(default);
            let _ = computed.set(property, value);
        }
        let default_color = if self.dark_mode { "white" } else { "black" };
        let color = parent.and_then(|p| p.get("color")).unwrap_or(default_color);
        let _ = computed.set("color", color);
        let parent_font_size = parent.map_or(DEFAULT_FONT_SIZE_PX, ComputedStyle::font_size);

        if let NodeData::Element(element) = &node.data {
            // Step 2: matching rules in ascending priority.
            for rule in &self.rules {
                if !rule.selector.matches(self.tree, id) {
                    continue;
                }
                for (property, value) in &rule.declarations {
                    apply_declaration(&mut computed, property, value, parent_font_size);
                }
            }

            // Step 3: inline style wins.
            for (property, value) in &element.inline_style {
                apply_declaration(&mut computed, property, value, parent_font_size);
            }
        }

        // Step 4: transitions against the previous pass.
        if let Some(old) = self.old_styles.remove(&id) {
            let running = self.old_animations.remove(&id).unwrap_or_default();
            let node_animations = self.diff_styles(&old, &mut computed, running, changes);
            if !node_animations.is_empty() {
                let _ = animations.insert(id, node_animations);
            }
        }

        for &child in self.tree.children(id) {
            self.style_node(child, Some(&computed), styles, animations, changes);
        }
        let _ = styles.insert(id, computed);
    }

    /// [§ 3 Starting of transitions](https://www.w3.org/TR/css-transitions-1/#starting)
    ///
    /// Decide which animations the node carries after this pass. A running
    /// animation still heading to the new value keeps going and its current
    /// value stays visible; otherwise a changed property listed with the same
    /// duration in both the old and new `transition` starts a new animation.
    fn diff_styles(
        &self,
        old: &ComputedStyle,
        computed: &mut ComputedStyle,
        running: HashMap<String, Animation>,
        changes: &mut StyleChanges,
    ) -> HashMap<String, Animation> {
        let mut kept = HashMap::new();
        for (property, animation) in running {
            let still_targeted = computed
                .get(&property)
                .is_some_and(|target| animation.targets(target));
            if !still_targeted {
                continue;
            }
            if let Some(current) = old.get(&property) {
                let _ = computed.set(&property, current);
            }
            let _ = kept.insert(property, animation);
        }

        let old_transitions = old.transitions();
        for (property, duration) in computed.transitions() {
            if kept.contains_key(&property) {
                continue;
            }
            let same_duration = old_transitions
                .get(&property)
                .is_some_and(|d| (d - duration).abs() < f32::EPSILON);
            if !same_duration {
                continue;
            }
            let (Some(old_value), Some(new_value)) = (old.get(&property), computed.get(&property))
            else {
                continue;
            };
            if old_value == new_value {
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let frames = (duration / self.frame_interval).round().max(1.0) as u32;
            let Some(animation) = Animation::new(&property, old_value, new_value, frames) else {
                warn_once(
                    "CSS",
                    &format!("cannot animate '{property}' from '{old_value}' to '{new_value}'"),
                );
                continue;
            };
            let _ = computed.set(&property, animation.value());
            changes.animations_started = true;
            changes.affects_layout |= Animation::affects_layout(&property);
            let _ = kept.insert(property, animation);
        }
        kept
    }
}

/// Store one declaration, resolving `font-size` percentages against the
/// parent's size. A `font-size` we cannot resolve is dropped.
fn apply_declaration(
    computed: &mut ComputedStyle,
    property: &str,
    value: &str,
    parent_font_size: f32,
) {
    if property == "font-size" {
        let resolved = parse_px(value)
            .or_else(|| parse_percent(value).map(|p| p / 100.0 * parent_font_size));
        match resolved {
            Some(px) => {
                let _ = computed.set(property, format!("{px}px"));
            }
            None => warn_once("CSS", &format!("dropping font-size '{value}'")),
        }
        return;
    }
    let _ = computed.set(property, value);
}
