//! A tab: one document, its rendering state, and everything that mutates it.
//!
//! [HTML § 7.3 Browsing contexts](https://html.spec.whatwg.org/multipage/document-sequences.html#windows)
//!
//! A tab lives on its own [`TaskRunner`](crate::task::TaskRunner) thread.
//! Every entry point here runs inside a task, so the tab never needs a lock
//! of its own. Rendering is lazy: mutations only set dirty flags and ask the
//! compositor for an animation frame; [`Tab::run_animation_frame`] brings the
//! pipeline up to date and commits the result.
//!
//! ```text
//! needs_style ──► needs_layout ──► needs_accessibility
//!                              └─► needs_paint
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kestrel_common::Settings;
use kestrel_css::{
    Animation, DisplayItem, DisplayList, ItemKind, LayoutTree, Selector, StyleMap, StyleState,
    Stylesheet, compute_styles, default_stylesheet, layout, paint,
};
use kestrel_dom::{DomTree, ElementData, Fragment, NodeId, PropertyMap};
use url::Url;

use crate::accessibility::{AccessibilityNode, is_focusable, tabindex};
use crate::browser::Compositor;
use crate::commit::{CommitData, clamp_scroll};
use crate::error::{HostError, LoadError};
use crate::fonts::FontCache;
use crate::host::{CallbackId, DomEvent, ScriptEngine, ScriptHost};
use crate::load::{ContentSecurityPolicy, Document};
use crate::task::TaskQueue;

/// Zoom step applied by one [`Tab::zoom_by`].
const ZOOM_STEP: f32 = 1.1;

/// Identifies a tab within its browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub usize);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// A navigation the tab wants the embedder to perform.
///
/// Fetching is external: activating a link or submitting a form only
/// produces this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    /// The tab that asked.
    pub tab: TabId,
    /// Target URL, resolved against the document.
    pub url: Url,
    /// `application/x-www-form-urlencoded` body for a form submission.
    pub body: Option<String>,
}

/// What [`Tab::load`] did not use.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Linked stylesheets and scripts that were blocked or failed.
    pub skipped: Vec<LoadError>,
}

/// One document and its rendering pipeline.
pub struct Tab {
    id: TabId,
    compositor: Arc<Compositor>,
    queue: TaskQueue<Self>,
    settings: Settings,
    fonts: Arc<FontCache>,
    engine: Option<Box<dyn ScriptEngine>>,

    url: Option<Url>,
    csp: ContentSecurityPolicy,
    dom: DomTree,
    rules: Stylesheet,
    style: StyleState,
    layout: LayoutTree,
    display_list: DisplayList,
    /// Nodes whose `SaveLayer` was isolated in the last full commit.
    layered_nodes: HashSet<NodeId>,
    accessibility: Option<AccessibilityNode>,
    accessibility_changed: bool,

    scroll: f32,
    scroll_changed_in_tab: bool,
    focus: Option<NodeId>,
    needs_focus_scroll: bool,
    zoom: f32,
    dark_mode: bool,

    needs_style: bool,
    needs_layout: bool,
    needs_accessibility: bool,
    needs_paint: bool,
    needs_raf_callbacks: bool,
    /// The display list was rebuilt for something other than an opacity
    /// step since the last full commit.
    needs_full_commit: bool,
}

impl fmt::Debug for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tab")
            .field("id", &self.id)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("scroll", &self.scroll)
            .field("focus", &self.focus)
            .field("zoom", &self.zoom)
            .field("dark_mode", &self.dark_mode)
            .finish_non_exhaustive()
    }
}

impl Tab {
    /// Create a tab showing an empty document.
    ///
    /// Called on the tab's own thread by the browser.
    #[must_use]
    pub fn new(
        id: TabId,
        compositor: Arc<Compositor>,
        queue: TaskQueue<Self>,
        settings: Settings,
        fonts: Arc<FontCache>,
        engine: Option<Box<dyn ScriptEngine>>,
    ) -> Self {
        Self {
            id,
            compositor,
            queue,
            zoom: settings.zoom,
            dark_mode: settings.dark_mode,
            settings,
            fonts,
            engine,
            url: None,
            csp: ContentSecurityPolicy::default(),
            dom: DomTree::new(),
            rules: default_stylesheet().clone(),
            style: StyleState::new(),
            layout: LayoutTree::default(),
            display_list: DisplayList::new(),
            layered_nodes: HashSet::new(),
            accessibility: None,
            accessibility_changed: false,
            scroll: 0.0,
            scroll_changed_in_tab: false,
            focus: None,
            needs_focus_scroll: false,
            needs_style: true,
            needs_layout: false,
            needs_accessibility: false,
            needs_paint: false,
            needs_raf_callbacks: false,
            needs_full_commit: false,
        }
    }

    /// This tab's id.
    #[must_use]
    pub const fn id(&self) -> TabId {
        self.id
    }

    /// The loaded document's URL.
    #[must_use]
    pub const fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// The node tree.
    #[must_use]
    pub const fn dom(&self) -> &DomTree {
        &self.dom
    }

    /// Resolved styles from the last style pass.
    #[must_use]
    pub const fn styles(&self) -> &StyleMap {
        self.style.styles()
    }

    /// Style results and running animations.
    #[must_use]
    pub const fn style_state(&self) -> &StyleState {
        &self.style
    }

    /// The last layout.
    #[must_use]
    pub const fn layout_tree(&self) -> &LayoutTree {
        &self.layout
    }

    /// The last display list.
    #[must_use]
    pub const fn display_list(&self) -> &DisplayList {
        &self.display_list
    }

    /// The last accessibility tree.
    #[must_use]
    pub const fn accessibility_tree(&self) -> Option<&AccessibilityNode> {
        self.accessibility.as_ref()
    }

    /// The focused element.
    #[must_use]
    pub const fn focus(&self) -> Option<NodeId> {
        self.focus
    }

    /// Vertical scroll offset in device pixels.
    #[must_use]
    pub const fn scroll(&self) -> f32 {
        self.scroll
    }

    /// Current zoom factor.
    #[must_use]
    pub const fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Whether the dark color scheme is in effect.
    #[must_use]
    pub const fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    /// Replace the document.
    ///
    /// Linked resources the document's policy blocks, or that failed to
    /// fetch, are skipped and reported. Admitted scripts are queued to run
    /// after this task, in document order.
    pub fn load(&mut self, document: Document) -> LoadReport {
        log::info!(target: "kestrel::tab", "{} loading {}", self.id, document.url);
        kestrel_common::warning::clear_warnings();
        let resources = document.resolve();
        self.csp = document.csp();
        self.url = Some(document.url);
        self.dom = document.tree;
        self.rules = resources.rules;
        self.style = StyleState::new();
        self.focus = None;
        self.needs_focus_scroll = false;
        self.scroll = 0.0;
        self.scroll_changed_in_tab = true;

        for (url, source) in resources.scripts {
            self.queue
                .schedule_task(move |tab: &mut Self| tab.run_script(&url, &source));
        }
        self.set_needs_render();
        LoadReport {
            skipped: resources.skipped,
        }
    }

    /// Swap in a script engine for subsequent scripts and events.
    pub fn set_script_engine(&mut self, engine: Option<Box<dyn ScriptEngine>>) {
        self.engine = engine;
    }

    fn run_script(&mut self, url: &Url, source: &str) {
        log::debug!(target: "kestrel::tab", "{} running {url}", self.id);
        if let Some(Err(err)) = self.with_engine(|engine, tab| engine.run(url.as_str(), source, tab)) {
            log::warn!(target: "kestrel::tab", "script {url} crashed: {err}");
        }
    }

    fn dispatch_timeout(&mut self, callback: CallbackId) {
        let _ = self.with_engine(|engine, tab| engine.dispatch_timeout(callback, tab));
    }

    /// Run `f` with the engine taken out of the tab, so the engine can call
    /// back into the tab as its host.
    fn with_engine<R>(
        &mut self,
        f: impl FnOnce(&mut dyn ScriptEngine, &mut Self) -> R,
    ) -> Option<R> {
        let mut engine = self.engine.take()?;
        let result = f(engine.as_mut(), self);
        if self.engine.is_none() {
            self.engine = Some(engine);
        }
        Some(result)
    }

    /// Dispatch an event to script; `true` means "do the default action".
    fn dispatch_event(&mut self, event: DomEvent, target: NodeId) -> bool {
        self.with_engine(|engine, tab| engine.dispatch_event(event, target, tab))
            .unwrap_or(true)
    }

    /// Mark style dirty and ask for a frame.
    pub fn set_needs_render(&mut self) {
        self.needs_style = true;
        self.compositor.set_needs_animation_frame(self.id);
    }

    /// Mark layout dirty and ask for a frame.
    pub fn set_needs_layout(&mut self) {
        self.needs_layout = true;
        self.compositor.set_needs_animation_frame(self.id);
    }

    /// Mark the display list dirty and ask for a frame.
    pub fn set_needs_paint(&mut self) {
        self.needs_paint = true;
        self.needs_full_commit = true;
        self.compositor.set_needs_animation_frame(self.id);
    }

    /// Bring style, layout, accessibility and paint up to date, running only
    /// the stages whose inputs changed.
    pub fn render(&mut self) {
        if self.needs_style {
            let changes = compute_styles(
                &self.dom,
                &self.rules,
                &mut self.style,
                self.dark_mode,
                self.settings.frame_interval_secs(),
            );
            if changes.animations_started {
                log::debug!(target: "kestrel::tab", "{} started transitions", self.id);
            }
            self.needs_style = false;
            self.needs_layout = true;
        }
        if self.needs_layout {
            self.layout = layout(
                &self.dom,
                self.style.styles(),
                self.fonts.as_ref(),
                &self.settings,
                self.zoom,
            );
            self.needs_layout = false;
            self.needs_accessibility = true;
            self.needs_paint = true;
            self.needs_full_commit = true;
        }
        if self.needs_accessibility {
            self.accessibility = Some(AccessibilityNode::build(
                &self.dom,
                &self.layout,
                self.style.styles(),
            ));
            self.accessibility_changed = true;
            self.needs_accessibility = false;
        }
        if self.needs_paint {
            self.display_list = paint(&self.layout, &self.dom, self.style.styles());
            self.needs_paint = false;
        }
    }

    /// [HTML § 8.1.7.3 Update the rendering](https://html.spec.whatwg.org/multipage/webappapis.html#update-the-rendering)
    ///
    /// Produce one frame and commit it. `scroll` is the compositor's scroll
    /// offset; it wins unless the tab moved the scroll itself since the last
    /// commit.
    pub fn run_animation_frame(&mut self, scroll: f32) {
        if !self.scroll_changed_in_tab {
            self.scroll = scroll;
        }
        if std::mem::take(&mut self.needs_raf_callbacks) {
            let _ = self.with_engine(|engine, tab| engine.run_animation_frame(tab));
        }

        let mut opacity_nodes = Vec::new();
        for tick in self.style.advance_animations() {
            match tick.property.as_str() {
                "opacity" => {
                    self.needs_paint = true;
                    opacity_nodes.push(tick.node);
                }
                property if Animation::affects_layout(property) => self.needs_layout = true,
                _ => {
                    self.needs_paint = true;
                    self.needs_full_commit = true;
                }
            }
        }

        self.render();

        let composited_updates = if std::mem::take(&mut self.needs_full_commit) {
            None
        } else {
            self.composited_updates(&opacity_nodes)
        };

        let viewport_height = self.settings.viewport_height;
        let height = self.layout.height();
        let clamped = clamp_scroll(self.scroll, height, viewport_height);
        if (clamped - self.scroll).abs() > f32::EPSILON {
            self.scroll_changed_in_tab = true;
        }
        self.scroll = clamped;

        if std::mem::take(&mut self.needs_focus_scroll)
            && let Some(focus) = self.focus
        {
            self.scroll_to(focus);
        }

        if self.style.is_animating() || self.needs_raf_callbacks {
            self.compositor.set_needs_animation_frame(self.id);
        }

        let data = CommitData {
            url: self.url.clone(),
            scroll: self.scroll_changed_in_tab.then_some(self.scroll),
            height,
            display_list: if composited_updates.is_none() {
                self.display_list.clone()
            } else {
                DisplayList::new()
            },
            composited_updates,
            accessibility_tree: if std::mem::take(&mut self.accessibility_changed) {
                self.accessibility.clone()
            } else {
                None
            },
            focus: self.focus,
        };
        if data.composited_updates.is_none() {
            self.layered_nodes = self.isolated_layers();
        }
        self.compositor.commit(self.id, data);
        self.scroll_changed_in_tab = false;
    }

    fn isolated_layers(&self) -> HashSet<NodeId> {
        self.display_list
            .items()
            .iter()
            .filter_map(|item| match item.kind {
                ItemKind::SaveLayer {
                    node,
                    should_save: true,
                    ..
                } => Some(node),
                _ => None,
            })
            .collect()
    }

    /// The new `SaveLayer` of every node whose opacity changed, or `None`
    /// if one of them was not isolated in the committed list and the list
    /// must be recomposited.
    fn composited_updates(&self, nodes: &[NodeId]) -> Option<HashMap<NodeId, DisplayItem>> {
        let mut updates = HashMap::new();
        for &node in nodes {
            if !self.layered_nodes.contains(&node) {
                return None;
            }
            let item = self
                .display_list
                .save_layer_for(node)
                .and_then(|id| self.display_list.get(id))?;
            let _ = updates.insert(node, item.clone());
        }
        Some(updates)
    }

    /// Scroll so the first box of `node` is in view, leaving one scroll step
    /// above it.
    fn scroll_to(&mut self, node: NodeId) {
        let Some(y) = self
            .layout
            .box_for_node(node)
            .and_then(|id| self.layout.get(id))
            .map(|b| b.y)
        else {
            return;
        };
        let viewport_height = self.settings.viewport_height;
        if self.scroll < y && y < self.scroll + viewport_height {
            return;
        }
        let target = y - self.settings.scroll_step;
        self.scroll = clamp_scroll(target, self.layout.height(), viewport_height);
        self.scroll_changed_in_tab = true;
    }

    /// Scroll the document by `delta` device pixels.
    pub fn scroll_by(&mut self, delta: f32) {
        self.render();
        self.scroll = clamp_scroll(
            self.scroll + delta,
            self.layout.height(),
            self.settings.viewport_height,
        );
        self.scroll_changed_in_tab = true;
        self.compositor.set_needs_animation_frame(self.id);
    }

    /// Give focus to `node`, or clear it.
    pub fn focus_element(&mut self, node: Option<NodeId>) {
        if node.is_some() && node != self.focus {
            self.needs_focus_scroll = true;
        }
        if let Some(old) = self.focus
            && let Some(element) = self.dom.as_element_mut(old)
        {
            element.focused = false;
        }
        self.focus = node.filter(|&n| self.dom.contains(n));
        if let Some(new) = self.focus
            && let Some(element) = self.dom.as_element_mut(new)
        {
            element.focused = true;
        }
        self.set_needs_render();
    }

    /// [UI Events § 5.2 click](https://www.w3.org/TR/uievents/#event-type-click)
    ///
    /// A click at viewport coordinates. Script sees the click first; unless
    /// it prevents the default, the nearest focusable ancestor of the hit
    /// node is focused and activated.
    pub fn click(&mut self, x: f32, y: f32) {
        self.render();
        self.focus_element(None);
        let Some(hit) = self
            .layout
            .hit_test(x, y + self.scroll, &self.dom, self.style.styles())
        else {
            return;
        };
        if !self.dispatch_event(DomEvent::Click, hit) {
            return;
        }
        let target = std::iter::once(hit)
            .chain(self.dom.ancestors(hit))
            .find(|&node| is_focusable(&self.dom, node));
        if let Some(node) = target {
            self.focus_element(Some(node));
            self.activate_element(node);
        }
    }

    /// Type a character into the focused text field.
    pub fn key_press(&mut self, ch: char) {
        let Some(focus) = self.focus else {
            return;
        };
        if self.dom.tag_name(focus) != Some("input") {
            return;
        }
        if self.dom.as_element(focus).is_some_and(|e| e.attr("value").is_none()) {
            self.activate_element(focus);
        }
        if !self.dispatch_event(DomEvent::KeyDown, focus) {
            return;
        }
        if let Some(element) = self.dom.as_element_mut(focus) {
            element.attrs.entry("value".to_string()).or_default().push(ch);
        }
        self.set_needs_render();
    }

    /// Activate the focused element as if it were clicked.
    pub fn enter(&mut self) {
        let Some(focus) = self.focus else {
            return;
        };
        if !self.dispatch_event(DomEvent::Click, focus) {
            return;
        }
        self.activate_element(focus);
    }

    /// [HTML § 6.6.3 Sequential focus navigation](https://html.spec.whatwg.org/multipage/interaction.html#sequential-focus-navigation)
    ///
    /// Move focus to the next focusable element in `tabindex` order, then
    /// tree order. Past the last one, focus is cleared.
    pub fn advance_focus(&mut self) {
        let mut focusable: Vec<NodeId> = self
            .dom
            .iter_all()
            .filter(|&node| is_focusable(&self.dom, node))
            .collect();
        focusable.sort_by_key(|&node| tabindex(&self.dom, node));
        let next = match self
            .focus
            .and_then(|focus| focusable.iter().position(|&n| n == focus))
        {
            Some(index) => focusable.get(index + 1).copied(),
            None => focusable.first().copied(),
        };
        self.focus_element(next);
    }

    /// [HTML § 6.3 Activation behavior](https://html.spec.whatwg.org/multipage/interaction.html#activation-behaviour)
    fn activate_element(&mut self, node: NodeId) {
        let Some(tag) = self.dom.tag_name(node).map(str::to_string) else {
            return;
        };
        match tag.as_str() {
            "input" => {
                if let Some(element) = self.dom.as_element_mut(node) {
                    let _ = element.attrs.insert("value".to_string(), String::new());
                }
                self.set_needs_render();
            }
            "a" => {
                if let Some(href) = self.attr(node, "href") {
                    self.navigate(&href, None);
                }
            }
            "button" => {
                let form = std::iter::once(node).chain(self.dom.ancestors(node)).find(|&n| {
                    self.dom.tag_name(n) == Some("form") && self.attr(n, "action").is_some()
                });
                if let Some(form) = form {
                    self.submit_form(form);
                }
            }
            _ => {}
        }
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<String> {
        self.dom
            .as_element(node)
            .and_then(|e| e.attr(name))
            .map(str::to_string)
    }

    /// [HTML § 4.10.21.3 Form submission algorithm](https://html.spec.whatwg.org/multipage/form-control-infrastructure.html#form-submission-algorithm)
    fn submit_form(&mut self, form: NodeId) {
        if !self.dispatch_event(DomEvent::Submit, form) {
            return;
        }
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        for node in self.dom.descendants(form) {
            let Some(element) = self.dom.as_element(node) else {
                continue;
            };
            if element.tag_name != "input" {
                continue;
            }
            if let Some(name) = element.attr("name") {
                let _ = body.append_pair(name, element.attr("value").unwrap_or_default());
            }
        }
        let body = body.finish();
        if let Some(action) = self.attr(form, "action") {
            self.navigate(&action, Some(body));
        }
    }

    fn navigate(&self, href: &str, body: Option<String>) {
        let resolved = match &self.url {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        match resolved {
            Ok(url) => self.compositor.request_navigation(NavigationRequest {
                tab: self.id,
                url,
                body,
            }),
            Err(err) => log::warn!(target: "kestrel::tab", "cannot navigate to '{href}': {err}"),
        }
    }

    /// Zoom in (`true`) or out by one step. The scroll offset scales with
    /// the page.
    pub fn zoom_by(&mut self, increase: bool) {
        let factor = if increase { ZOOM_STEP } else { ZOOM_STEP.recip() };
        self.zoom *= factor;
        self.scroll *= factor;
        self.scroll_changed_in_tab = true;
        self.set_needs_render();
    }

    /// Return to the configured zoom.
    pub fn reset_zoom(&mut self) {
        self.scroll *= self.settings.zoom / self.zoom;
        self.zoom = self.settings.zoom;
        self.scroll_changed_in_tab = true;
        self.set_needs_render();
    }

    /// [Media Queries § 12.5 prefers-color-scheme](https://www.w3.org/TR/mediaqueries-5/#prefers-color-scheme)
    pub fn set_dark_mode(&mut self, dark_mode: bool) {
        self.dark_mode = dark_mode;
        self.set_needs_render();
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut ElementData, HostError> {
        if !self.dom.contains(node) {
            return Err(HostError::StaleNode(node));
        }
        self.dom
            .as_element_mut(node)
            .ok_or(HostError::NotAnElement(node))
    }
}

impl ScriptHost for Tab {
    fn query_selector_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.dom
            .iter_all()
            .filter(|&node| self.dom.as_element(node).is_some() && selector.matches(&self.dom, node))
            .collect()
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, HostError> {
        if !self.dom.contains(node) {
            return Err(HostError::StaleNode(node));
        }
        let element = self
            .dom
            .as_element(node)
            .ok_or(HostError::NotAnElement(node))?;
        Ok(element.attr(name).map(str::to_string))
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), HostError> {
        let element = self.element_mut(node)?;
        let _ = element.attrs.insert(name.to_string(), value.to_string());
        self.set_needs_render();
        Ok(())
    }

    fn set_inner_content(&mut self, node: NodeId, content: &[Fragment]) -> Result<(), HostError> {
        let _ = self.element_mut(node)?;
        let children: Vec<NodeId> = content.iter().map(|f| self.dom.instantiate(f)).collect();
        self.dom.replace_children(node, &children);
        if let Some(focus) = self.focus
            && !self.dom.contains(focus)
        {
            self.focus = None;
        }
        self.set_needs_render();
        Ok(())
    }

    fn set_inline_style(&mut self, node: NodeId, declarations: PropertyMap) -> Result<(), HostError> {
        let element = self.element_mut(node)?;
        element.inline_style = declarations;
        self.set_needs_render();
        Ok(())
    }

    fn set_timeout(&mut self, callback: CallbackId, delay: Duration) {
        let queue = self.queue.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-timeout", self.id))
            .spawn(move || {
                thread::sleep(delay);
                queue.schedule_task(move |tab: &mut Self| tab.dispatch_timeout(callback));
            });
        if let Err(err) = spawned {
            log::warn!(target: "kestrel::tab", "could not start timer: {err}");
        }
    }

    fn request_animation_frame(&mut self) {
        self.needs_raf_callbacks = true;
        self.compositor.set_needs_animation_frame(self.id);
    }

    fn check_request(&self, href: &str) -> Result<Url, HostError> {
        let base = self.url.as_ref().ok_or(HostError::NoDocument)?;
        let url = base.join(href).map_err(|source| HostError::InvalidUrl {
            href: href.to_string(),
            source,
        })?;
        if !self.csp.allows(&url) {
            return Err(HostError::BlockedByCsp { url });
        }
        if url.origin() != base.origin() {
            return Err(HostError::CrossOrigin { url });
        }
        Ok(url)
    }

    fn log(&self, message: &str) {
        log::info!(target: "kestrel::console", "{}: {message}", self.id);
    }
}
