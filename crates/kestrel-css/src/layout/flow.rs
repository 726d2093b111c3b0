//! The layout algorithm: block stacking and greedy line breaking.
//!
//! Boxes are created top-down and positioned in the same walk: a box's
//! `x`, `y` and `width` depend only on its parent and previous sibling, which
//! are always finished first, and its `height` is set once its children are
//! done.

use kestrel_common::Settings;
use kestrel_common::warning::warn_once;
use kestrel_dom::{DomTree, NodeData, NodeId};

use super::{BoxId, BoxKind, FontMetrics, FontSpec, LayoutBox, LayoutTree};
use crate::style::{ComputedStyle, StyleMap};

/// Tags that make their parent lay out in block mode.
///
/// [WHATWG HTML § 15.3.3 Flow content](https://html.spec.whatwg.org/multipage/rendering.html#flow-content-3)
pub const BLOCK_ELEMENTS: &[&str] = &[
    "html", "body", "article", "section", "nav", "aside", "h1", "h2", "h3", "h4", "h5", "h6",
    "hgroup", "header", "footer", "address", "p", "hr", "pre", "blockquote", "ol", "ul", "menu",
    "li", "dl", "dt", "dd", "figure", "figcaption", "main", "div", "table", "form", "fieldset",
    "legend", "details", "summary",
];

/// Leading applied to the tallest ascent and descent on a line.
const LINE_LEADING: f32 = 1.25;

/// Lay out the document.
///
/// Pure: the result depends only on the tree, the styles, the metrics
/// provider, the settings and the zoom factor. Malformed `width`/`height`
/// values are ignored and never abort layout.
#[must_use]
pub fn layout(
    tree: &DomTree,
    styles: &StyleMap,
    metrics: &dyn FontMetrics,
    settings: &Settings,
    zoom: f32,
) -> LayoutTree {
    let mut builder = LayoutBuilder {
        dom: tree,
        styles,
        metrics,
        settings,
        zoom,
        boxes: Vec::new(),
    };
    builder.layout_document();
    let tree = LayoutTree {
        boxes: builder.boxes,
        zoom,
    };
    log::debug!(
        target: "kestrel::layout",
        "laid out {} boxes, document height {}",
        tree.boxes.len(),
        tree.height()
    );
    tree
}

/// Block or inline formatting for a node's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Block,
    Inline,
}

struct LayoutBuilder<'a> {
    dom: &'a DomTree,
    styles: &'a StyleMap,
    metrics: &'a dyn FontMetrics,
    settings: &'a Settings,
    zoom: f32,
    boxes: Vec<LayoutBox>,
}

impl<'a> LayoutBuilder<'a> {
    fn push(
        &mut self,
        kind: BoxKind,
        node: NodeId,
        parent: Option<BoxId>,
        previous: Option<BoxId>,
    ) -> BoxId {
        let id = self.boxes.len();
        self.boxes.push(LayoutBox {
            kind,
            node,
            parent,
            previous,
            children: Vec::new(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        });
        if let Some(parent) = parent {
            self.boxes[parent].children.push(id);
        }
        id
    }

    fn style(&self, node: NodeId) -> Option<&'a ComputedStyle> {
        self.styles.get(&node)
    }

    fn font(&self, node: NodeId) -> FontSpec {
        self.style(node)
            .map_or_else(|| ComputedStyle::new().font(self.zoom), |s| s.font(self.zoom))
    }

    /// Convert CSS pixels to device pixels.
    fn dpx(&self, css_px: f32) -> f32 {
        css_px * self.zoom
    }

    fn layout_document(&mut self) {
        let root = self.dom.root();
        let document = self.push(BoxKind::Document, root, None, None);
        let h_step = self.dpx(self.settings.h_step);
        let v_step = self.dpx(self.settings.v_step);
        {
            let doc = &mut self.boxes[document];
            doc.x = h_step;
            doc.y = v_step;
            doc.width = self.settings.viewport_width - 2.0 * h_step;
        }
        let kind = self.block_kind(root);
        let child = self.push(kind, root, Some(document), None);
        self.layout_block(child);
        self.boxes[document].height = self.boxes[child].height + 2.0 * v_step;
    }

    fn mode(&self, node: NodeId) -> Mode {
        let Some(element) = self.dom.as_element(node) else {
            return Mode::Inline;
        };
        let children = self.dom.children(node);
        let has_block_child = children.iter().any(|&child| {
            self.dom
                .tag_name(child)
                .is_some_and(|tag| BLOCK_ELEMENTS.contains(&tag))
        });
        if has_block_child {
            Mode::Block
        } else if !children.is_empty() || element.tag_name == "input" {
            Mode::Inline
        } else {
            Mode::Block
        }
    }

    fn block_kind(&self, node: NodeId) -> BoxKind {
        match self.mode(node) {
            Mode::Block => BoxKind::Block,
            Mode::Inline => BoxKind::Inline,
        }
    }

    /// Position a `Block` or `Inline` box, lay out its content, then size it.
    fn layout_block(&mut self, id: BoxId) {
        let (node, parent, previous) = {
            let b = &self.boxes[id];
            (b.node, b.parent, b.previous)
        };
        let (parent_x, parent_y, parent_width) = parent.map_or((0.0, 0.0, 0.0), |p| {
            let p = &self.boxes[p];
            (p.x, p.y, p.width)
        });
        let y = previous.map_or(parent_y, |prev| {
            let prev = &self.boxes[prev];
            prev.y + prev.height
        });
        let style = self.style(node);
        let width = style
            .and_then(ComputedStyle::width)
            .map_or(parent_width, |w| self.dpx(w));
        let explicit_height = style.and_then(ComputedStyle::height).map(|h| self.dpx(h));
        warn_malformed(style, "width");
        warn_malformed(style, "height");
        {
            let b = &mut self.boxes[id];
            b.x = parent_x;
            b.y = y;
            b.width = width;
        }

        if self.boxes[id].kind == BoxKind::Block {
            let mut previous = None;
            let children: Vec<NodeId> = self.dom.children(node).to_vec();
            for child in children {
                let kind = self.block_kind(child);
                previous = Some(self.push(kind, child, Some(id), previous));
            }
            for child in self.boxes[id].children.clone() {
                self.layout_block(child);
            }
        } else {
            let mut cursor_x = 0.0;
            self.new_line(id, &mut cursor_x);
            self.recurse(id, node, &mut cursor_x);
            for line in self.boxes[id].children.clone() {
                self.layout_line(line);
            }
        }

        let content_height: f32 = self.boxes[id]
            .children
            .iter()
            .map(|&c| self.boxes[c].height)
            .sum();
        self.boxes[id].height = explicit_height.unwrap_or(content_height);
    }

    fn new_line(&mut self, block: BoxId, cursor_x: &mut f32) {
        *cursor_x = 0.0;
        let last_line = self.boxes[block].children.last().copied();
        let node = self.boxes[block].node;
        let _ = self.push(BoxKind::Line, node, Some(block), last_line);
    }

    /// The current line, starting a new one first if `width` does not fit in
    /// what is left of it.
    fn line_for(&mut self, block: BoxId, width: f32, cursor_x: &mut f32) -> BoxId {
        let line = self.current_line(block);
        let line_has_content = !self.boxes[line].children.is_empty();
        if line_has_content && *cursor_x + width > self.boxes[block].width {
            self.new_line(block, cursor_x);
            return self.current_line(block);
        }
        line
    }

    fn current_line(&self, block: BoxId) -> BoxId {
        // `layout_block` opens a line before recursing, so there is always one.
        self.boxes[block].children.last().copied().unwrap_or(block)
    }

    fn recurse(&mut self, block: BoxId, node: NodeId, cursor_x: &mut f32) {
        let dom = self.dom;
        match dom.get(node).map(|n| &n.data) {
            Some(NodeData::Text(text)) => {
                let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
                for word in words {
                    self.word(block, node, word, cursor_x);
                }
            }
            Some(NodeData::Element(element)) => match element.tag_name.as_str() {
                "br" => self.new_line(block, cursor_x),
                "input" | "button" => self.input(block, node, cursor_x),
                _ => {
                    for &child in dom.children(node) {
                        self.recurse(block, child, cursor_x);
                    }
                }
            },
            None => {}
        }
    }

    fn word(&mut self, block: BoxId, node: NodeId, word: String, cursor_x: &mut f32) {
        let font = self.font(node);
        let width = self.metrics.measure(&word, &font);
        let line = self.line_for(block, width, cursor_x);
        let previous = self.boxes[line].children.last().copied();
        let _ = self.push(BoxKind::Text { word, font }, node, Some(line), previous);
        *cursor_x += width + self.metrics.measure(" ", &font);
    }

    fn input(&mut self, block: BoxId, node: NodeId, cursor_x: &mut f32) {
        let font = self.font(node);
        let width = self.dpx(self.settings.input_width);
        let line = self.line_for(block, width, cursor_x);
        let previous = self.boxes[line].children.last().copied();
        let text = self.input_text(node);
        let text_width = self.metrics.measure(&text, &font);
        let kind = BoxKind::Input {
            font,
            text,
            text_width,
        };
        let _ = self.push(kind, node, Some(line), previous);
        *cursor_x += width + self.metrics.measure(" ", &font);
    }

    /// An input shows its `value`; a button shows its single text child.
    fn input_text(&self, node: NodeId) -> String {
        let Some(element) = self.dom.as_element(node) else {
            return String::new();
        };
        if element.tag_name == "input" {
            return element.attr("value").unwrap_or_default().to_string();
        }
        let children = self.dom.children(node);
        match children {
            [only] => self
                .dom
                .as_text(*only)
                .map(str::to_string)
                .unwrap_or_default(),
            [] => String::new(),
            _ => {
                warn_once("Layout", "ignoring markup inside <button>");
                String::new()
            }
        }
    }

    /// Position a line and its atoms.
    ///
    /// [§ 10.8 Line height calculations](https://www.w3.org/TR/CSS2/visudet.html#line-height)
    fn layout_line(&mut self, line: BoxId) {
        let (parent, previous) = {
            let b = &self.boxes[line];
            (b.parent, b.previous)
        };
        let Some(parent) = parent else {
            return;
        };
        let (x, parent_y, width) = {
            let p = &self.boxes[parent];
            (p.x, p.y, p.width)
        };
        let y = previous.map_or(parent_y, |prev| {
            let prev = &self.boxes[prev];
            prev.y + prev.height
        });
        {
            let b = &mut self.boxes[line];
            b.x = x;
            b.y = y;
            b.width = width;
        }

        let atoms = self.boxes[line].children.clone();
        if atoms.is_empty() {
            self.boxes[line].height = 0.0;
            return;
        }
        for &atom in &atoms {
            self.layout_atom(atom, x);
        }

        let mut max_ascent: f32 = 0.0;
        let mut max_descent: f32 = 0.0;
        for &atom in &atoms {
            let font = atom_font(&self.boxes[atom]);
            max_ascent = max_ascent.max(self.metrics.ascent(&font));
            max_descent = max_descent.max(self.metrics.descent(&font));
        }
        let baseline = LINE_LEADING.mul_add(max_ascent, y);
        for &atom in &atoms {
            let font = atom_font(&self.boxes[atom]);
            self.boxes[atom].y = baseline - self.metrics.ascent(&font);
        }
        self.boxes[line].height = LINE_LEADING * (max_ascent + max_descent);
    }

    /// Size an atom and chain its `x` off the previous atom's right edge plus
    /// one space in the previous atom's font.
    fn layout_atom(&mut self, atom: BoxId, line_x: f32) {
        let (kind, node, previous) = {
            let b = &self.boxes[atom];
            (b.kind.clone(), b.node, b.previous)
        };
        let x = previous.map_or(line_x, |prev| {
            let prev = &self.boxes[prev];
            let space = self.metrics.measure(" ", &atom_font(prev));
            prev.x + prev.width + space
        });
        let (width, height) = match &kind {
            BoxKind::Text { word, font } => {
                (self.metrics.measure(word, font), self.metrics.line_spacing(font))
            }
            BoxKind::Input { font, .. } => {
                let explicit = self
                    .style(node)
                    .and_then(ComputedStyle::height)
                    .map(|h| self.dpx(h));
                (
                    self.dpx(self.settings.input_width),
                    explicit.unwrap_or_else(|| self.metrics.line_spacing(font)),
                )
            }
            _ => (0.0, 0.0),
        };
        let b = &mut self.boxes[atom];
        b.x = x;
        b.width = width;
        b.height = height;
    }
}

fn atom_font(layout_box: &LayoutBox) -> FontSpec {
    match &layout_box.kind {
        BoxKind::Text { font, .. } | BoxKind::Input { font, .. } => *font,
        _ => FontSpec::default(),
    }
}

/// Report a declared size we could not read. The box falls back to its
/// container default.
fn warn_malformed(style: Option<&ComputedStyle>, property: &str) {
    let Some(value) = style.and_then(|s| s.get(property)) else {
        return;
    };
    if value != "auto" && crate::values::parse_px(value).is_none() {
        warn_once("Layout", &format!("ignoring {property}: {value}"));
    }
}
