//! The accessibility tree.
//!
//! [WAI-ARIA 1.2 § 5 The Roles Model](https://www.w3.org/TR/wai-aria-1.2/#roles)
//!
//! Built from the node tree after layout. Elements without a role of their
//! own are flattened away: their accessible children are hoisted into the
//! nearest ancestor with a role.

use std::collections::HashMap;

use kestrel_common::Rect;
use kestrel_css::{LayoutTree, StyleMap};
use kestrel_dom::{DomTree, NodeData, NodeId};
use serde::Serialize;

/// `tabindex` given to elements that do not set one (or set `0`), so they
/// sort after every positive index.
pub const DEFAULT_TABINDEX: i64 = 9_999_999;

/// [HTML § 6.6.3 The tabindex attribute](https://html.spec.whatwg.org/multipage/interaction.html#attr-tabindex)
///
/// The element's position in sequential focus order. Missing, zero and
/// unparseable values map to [`DEFAULT_TABINDEX`].
#[must_use]
pub fn tabindex(dom: &DomTree, node: NodeId) -> i64 {
    let value = dom
        .as_element(node)
        .and_then(|e| e.attr("tabindex"))
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_TABINDEX);
    if value == 0 { DEFAULT_TABINDEX } else { value }
}

/// Whether an element takes part in sequential focus navigation.
///
/// Links, inputs and buttons are focusable, as is anything with a
/// non-negative `tabindex`. A negative `tabindex` opts out.
#[must_use]
pub fn is_focusable(dom: &DomTree, node: NodeId) -> bool {
    let Some(element) = dom.as_element(node) else {
        return false;
    };
    if tabindex(dom, node) < 0 {
        return false;
    }
    element.attr("tabindex").is_some() || matches!(element.tag_name.as_str(), "input" | "button" | "a")
}

/// One node of the accessibility tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessibilityNode {
    /// The DOM node this describes.
    pub node: NodeId,
    /// ARIA role, or one of the internal roles `StaticText`,
    /// `focusable text` and `focusable`.
    pub role: String,
    /// What a screen reader would announce.
    pub text: String,
    /// Page-space bounds of the node's boxes.
    pub bounds: Rect,
    /// Accessible children in document order.
    pub children: Vec<Self>,
}

impl AccessibilityNode {
    /// Build the tree for a laid-out document.
    #[must_use]
    pub fn build(dom: &DomTree, layout: &LayoutTree, styles: &StyleMap) -> Self {
        let mut bounds: HashMap<NodeId, Rect> = HashMap::new();
        for id in layout.preorder() {
            let Some(layout_box) = layout.get(id) else {
                continue;
            };
            let rect = layout.absolute_bounds(id, dom, styles);
            let entry = bounds.entry(layout_box.node).or_insert(Rect::EMPTY);
            *entry = entry.union(&rect);
        }
        let builder = Builder { dom, bounds };
        let mut root = builder.node(dom.root());
        builder.fill(&mut root);
        root
    }

    /// The deepest node whose bounds contain the point.
    #[must_use]
    pub fn hit_test(&self, x: f32, y: f32) -> Option<&Self> {
        let inner = self.children.iter().rev().find_map(|c| c.hit_test(x, y));
        inner.or_else(|| self.bounds.contains_point(x, y).then_some(self))
    }

    /// Every node in preorder.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Self> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

struct Builder<'a> {
    dom: &'a DomTree,
    bounds: HashMap<NodeId, Rect>,
}

impl Builder<'_> {
    fn node(&self, id: NodeId) -> AccessibilityNode {
        AccessibilityNode {
            node: id,
            role: self.role(id),
            text: String::new(),
            bounds: self.bounds(id),
            children: Vec::new(),
        }
    }

    /// Union of the node's boxes; for a text node, its words.
    fn bounds(&self, id: NodeId) -> Rect {
        self.bounds.get(&id).copied().unwrap_or(Rect::EMPTY)
    }

    fn role(&self, id: NodeId) -> String {
        let Some(node) = self.dom.get(id) else {
            return "none".to_string();
        };
        let role = match &node.data {
            NodeData::Text(_) => {
                let focusable_parent = node.parent.is_some_and(|p| is_focusable(self.dom, p));
                if focusable_parent { "focusable text" } else { "StaticText" }
            }
            NodeData::Element(element) => {
                if let Some(role) = element.attr("role") {
                    return role.to_string();
                }
                match element.tag_name.as_str() {
                    "a" => "link",
                    "input" => "textbox",
                    "button" => "button",
                    "html" => "document",
                    _ if is_focusable(self.dom, id) => "focusable",
                    _ => "none",
                }
            }
        };
        role.to_string()
    }

    fn fill(&self, target: &mut AccessibilityNode) {
        for &child in self.dom.children(target.node) {
            let mut node = self.node(child);
            self.fill(&mut node);
            if node.role == "none" {
                target.children.append(&mut node.children);
            } else {
                target.children.push(node);
            }
        }
        target.text = self.text(target);
    }

    fn text(&self, target: &AccessibilityNode) -> String {
        let id = target.node;
        let own_text = self.dom.as_text(id).unwrap_or_default();
        let mut text = match target.role.as_str() {
            "StaticText" => own_text.to_string(),
            "focusable text" => format!("Focusable text: {own_text}"),
            "focusable" => "Focusable element".to_string(),
            "textbox" => {
                let element = self.dom.as_element(id);
                let value = element
                    .and_then(|e| e.attr("value"))
                    .or_else(|| {
                        (element.is_some_and(|e| e.tag_name != "input"))
                            .then(|| self.dom.first_text_child(id))
                            .flatten()
                    })
                    .unwrap_or_default();
                format!("Input box: {value}")
            }
            "button" => "Button".to_string(),
            "link" => "Link".to_string(),
            "alert" => "Alert".to_string(),
            "document" => "Document".to_string(),
            _ => String::new(),
        };
        if self.dom.as_element(id).is_some_and(|e| e.focused) {
            text.push_str(" is focused");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use kestrel_common::Settings;
    use kestrel_css::{ApproximateFontMetrics, StyleState, compute_styles, default_stylesheet, layout};
    use kestrel_dom::Fragment;

    use super::*;

    fn build(fragment: &Fragment) -> (DomTree, AccessibilityNode) {
        let dom = DomTree::from_fragment(fragment);
        let mut state = StyleState::new();
        let _ = compute_styles(&dom, default_stylesheet(), &mut state, false, 0.033);
        let tree = layout(&dom, state.styles(), &ApproximateFontMetrics, &Settings::default(), 1.0);
        let a11y = AccessibilityNode::build(&dom, &tree, state.styles());
        (dom, a11y)
    }

    #[test]
    fn test_roles_and_flattening() {
        let page = Fragment::element(
            "html",
            vec![Fragment::element(
                "body",
                vec![Fragment::element(
                    "div",
                    vec![
                        Fragment::element("a", vec![Fragment::text("home")]),
                        Fragment::element("button", vec![Fragment::text("go")]),
                    ],
                )],
            )],
        );
        let (_, root) = build(&page);
        assert_eq!(root.role, "document");
        assert_eq!(root.text, "Document");
        let roles: Vec<&str> = root.children.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, ["link", "button"]);
        assert_eq!(root.children[0].children[0].text, "Focusable text: home");
        assert_eq!(root.children[1].text, "Button");
    }

    #[test]
    fn test_focused_input_text() {
        let page = Fragment::element(
            "html",
            vec![Fragment::element("body", vec![Fragment::element("input", vec![])])],
        );
        let mut dom = DomTree::from_fragment(&page);
        let input = dom.iter_all().find(|&n| dom.tag_name(n) == Some("input")).unwrap();
        let element = dom.as_element_mut(input).unwrap();
        let _ = element.attrs.insert("value".to_string(), "hi".to_string());
        element.focused = true;
        let mut state = StyleState::new();
        let _ = compute_styles(&dom, default_stylesheet(), &mut state, false, 0.033);
        let tree = layout(&dom, state.styles(), &ApproximateFontMetrics, &Settings::default(), 1.0);
        let root = AccessibilityNode::build(&dom, &tree, state.styles());
        assert_eq!(root.children[0].text, "Input box: hi is focused");
        assert!(!root.children[0].bounds.is_empty());
    }

    #[test]
    fn test_tabindex_rules() {
        let page = Fragment::element(
            "html",
            vec![
                Fragment::element("a", vec![]),
                Fragment::element("div", vec![]),
            ],
        );
        let mut dom = DomTree::from_fragment(&page);
        let children = dom.children(dom.root()).to_vec();
        assert!(is_focusable(&dom, children[0]));
        assert!(!is_focusable(&dom, children[1]));
        let _ = dom
            .as_element_mut(children[0])
            .unwrap()
            .attrs
            .insert("tabindex".to_string(), "-1".to_string());
        let _ = dom
            .as_element_mut(children[1])
            .unwrap()
            .attrs
            .insert("tabindex".to_string(), "0".to_string());
        assert!(!is_focusable(&dom, children[0]));
        assert!(is_focusable(&dom, children[1]));
        assert_eq!(tabindex(&dom, children[1]), DEFAULT_TABINDEX);
    }
}
