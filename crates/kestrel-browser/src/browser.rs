//! The browser: tab threads plus the compositor that owns the window.
//!
//! Two kinds of thread cooperate:
//!
//! ```text
//!  embedder / input thread           tab thread (one per tab)
//!  ───────────────────────           ────────────────────────
//!  Browser::click ──schedule_task──► Tab::click
//!  animation-timer ─schedule_task──► Tab::run_animation_frame
//!                                        │ render()
//!  Compositor ◄─────commit(CommitData)───┘
//!  composite_raster_and_draw
//! ```
//!
//! All compositor state sits behind one mutex. Tabs never see it; they only
//! hand over [`CommitData`] snapshots. Commits from a tab that is not
//! active are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use kestrel_common::Settings;
use kestrel_css::{Canvas, ColorValue, DisplayItem, DisplayList};
use kestrel_dom::NodeId;
use parking_lot::{Condvar, Mutex};
use tiny_skia::Pixmap;
use url::Url;

use crate::accessibility::AccessibilityNode;
use crate::commit::{CommitData, clamp_scroll};
use crate::compositor::{CompositedLayer, composite, paint_draw_list};
use crate::error::BrowserError;
use crate::fonts::FontCache;
use crate::host::ScriptEngine;
use crate::load::Document;
use crate::raster::{SkiaCanvas, clear};
use crate::tab::{LoadReport, NavigationRequest, Tab, TabId};
use crate::task::{TaskQueue, TaskRunner};

#[derive(Default)]
struct CompositorState {
    active_tab: Option<TabId>,
    tabs: HashMap<TabId, TaskQueue<Tab>>,
    url: Option<Url>,
    scroll: f32,
    height: f32,
    display_list: DisplayList,
    composited_updates: HashMap<NodeId, DisplayItem>,
    accessibility_tree: Option<AccessibilityNode>,
    focus: Option<NodeId>,
    layers: Vec<CompositedLayer>,
    draw_list: DisplayList,
    dark_mode: bool,
    needs_composite: bool,
    needs_raster: bool,
    needs_draw: bool,
    needs_animation_frame: bool,
    /// When the armed frame timer fires; `None` while disarmed.
    timer_deadline: Option<Instant>,
    timer_quit: bool,
    navigations: Vec<NavigationRequest>,
    commits: u64,
}

impl CompositorState {
    fn set_needs_composite(&mut self) {
        self.needs_composite = true;
        self.needs_raster = true;
        self.needs_draw = true;
    }
}

/// The browser-thread side of the commit protocol.
///
/// Holds the active tab's last committed frame, the composited layers built
/// from it, and the dirty flags that say which of composite, raster and
/// draw must run next.
pub struct Compositor {
    state: Mutex<CompositorState>,
    committed: Condvar,
    timer_wake: Condvar,
    fonts: Arc<FontCache>,
    settings: Settings,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Compositor")
            .field("active_tab", &state.active_tab)
            .field("scroll", &state.scroll)
            .field("height", &state.height)
            .field("layers", &state.layers.len())
            .field("commits", &state.commits)
            .finish_non_exhaustive()
    }
}

impl Compositor {
    /// Create a compositor with no tabs.
    #[must_use]
    pub fn new(settings: Settings, fonts: Arc<FontCache>) -> Self {
        let state = CompositorState {
            dark_mode: settings.dark_mode,
            ..CompositorState::default()
        };
        Self {
            state: Mutex::new(state),
            committed: Condvar::new(),
            timer_wake: Condvar::new(),
            fonts,
            settings,
        }
    }

    /// Accept a frame from `tab`.
    ///
    /// Dropped unless `tab` is active. A commit without composited updates
    /// replaces the display list and forces a full composite; one with
    /// updates keeps the current layers and only redraws.
    pub fn commit(&self, tab: TabId, data: CommitData) {
        {
            let mut state = self.state.lock();
            if state.active_tab != Some(tab) {
                log::debug!(target: "kestrel::commit", "dropping commit from inactive {tab}");
                return;
            }
            state.url = data.url;
            if let Some(scroll) = data.scroll {
                state.scroll = scroll;
            }
            state.height = data.height;
            match data.composited_updates {
                None => {
                    state.display_list = data.display_list;
                    state.composited_updates.clear();
                    state.set_needs_composite();
                }
                Some(updates) => {
                    state.composited_updates.extend(updates);
                    state.needs_draw = true;
                }
            }
            if let Some(tree) = data.accessibility_tree {
                state.accessibility_tree = Some(tree);
            }
            state.focus = data.focus;
            state.commits += 1;
            log::debug!(
                target: "kestrel::commit",
                "{tab} commit #{} (composite: {})",
                state.commits,
                state.needs_composite
            );
        }
        let _ = self.committed.notify_all();
        self.schedule_animation_frame();
    }

    /// Ask for an animation frame on behalf of `tab`. Ignored unless `tab`
    /// is active.
    pub fn set_needs_animation_frame(&self, tab: TabId) {
        {
            let mut state = self.state.lock();
            if state.active_tab != Some(tab) {
                return;
            }
            state.needs_animation_frame = true;
        }
        self.schedule_animation_frame();
    }

    /// Arm the frame timer if a frame is needed and no timer is pending.
    ///
    /// When the timer fires it schedules [`Tab::run_animation_frame`] on
    /// whichever tab is active at that moment, with the current scroll, and
    /// then disarms itself.
    pub fn schedule_animation_frame(&self) {
        let mut state = self.state.lock();
        if !state.needs_animation_frame || state.timer_deadline.is_some() || state.timer_quit {
            return;
        }
        state.timer_deadline = Some(Instant::now() + self.settings.refresh_interval());
        let _ = self.timer_wake.notify_one();
    }

    /// Body of the `animation-timer` thread. Sleeps until the armed
    /// deadline, fires, and waits for the next one until told to stop.
    fn run_animation_timer(&self) {
        let mut state = self.state.lock();
        while !state.timer_quit {
            let deadline = state.timer_deadline;
            match deadline {
                None => self.timer_wake.wait(&mut state),
                Some(deadline) if Instant::now() < deadline => {
                    let _ = self.timer_wake.wait_until(&mut state, deadline);
                }
                Some(_) => Self::fire_animation_timer(&mut state),
            }
        }
        log::trace!(target: "kestrel::commit", "animation timer stopped");
    }

    fn fire_animation_timer(state: &mut CompositorState) {
        let scroll = state.scroll;
        if let Some(queue) = state.active_tab.and_then(|tab| state.tabs.get(&tab)) {
            queue.schedule_task(move |tab: &mut Tab| tab.run_animation_frame(scroll));
            state.needs_animation_frame = false;
        }
        state.timer_deadline = None;
    }

    fn set_timer_quit(&self, quit: bool) {
        self.state.lock().timer_quit = quit;
        let _ = self.timer_wake.notify_all();
    }

    pub(crate) fn request_navigation(&self, request: NavigationRequest) {
        log::info!(target: "kestrel::commit", "{} navigates to {}", request.tab, request.url);
        self.state.lock().navigations.push(request);
    }

    /// Composite, raster and draw whatever is dirty onto `surface`.
    ///
    /// Returns whether anything was drawn.
    pub fn composite_raster_and_draw(&self, surface: &mut Pixmap) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.needs_composite && !state.needs_raster && !state.needs_draw {
            return false;
        }
        if state.needs_composite {
            state.layers = composite(&state.display_list);
        }
        if state.needs_raster {
            for layer in &mut state.layers {
                layer.raster(&state.display_list, &self.fonts);
            }
        }
        if state.needs_draw {
            state.draw_list = paint_draw_list(
                &state.layers,
                &state.display_list,
                Some(&state.composited_updates),
            );
            let background = if state.dark_mode {
                ColorValue::BLACK
            } else {
                ColorValue::WHITE
            };
            clear(surface, background);
            let mut canvas = SkiaCanvas::new(surface, &self.fonts, &state.layers);
            canvas.translate(0.0, -state.scroll);
            state.draw_list.execute(&mut canvas);
        }
        state.needs_composite = false;
        state.needs_raster = false;
        state.needs_draw = false;
        true
    }

    /// Number of commits accepted so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.state.lock().commits
    }

    /// Block until more than `seen` commits have been accepted, or until
    /// `timeout` passes. Returns whether a new commit arrived.
    #[must_use]
    pub fn wait_for_commit(&self, seen: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.commits <= seen {
            if self.committed.wait_until(&mut state, deadline).timed_out() {
                return state.commits > seen;
            }
        }
        true
    }

    /// The active tab.
    #[must_use]
    pub fn active_tab(&self) -> Option<TabId> {
        self.state.lock().active_tab
    }

    /// Scroll offset of the active tab.
    #[must_use]
    pub fn scroll(&self) -> f32 {
        self.state.lock().scroll
    }

    /// Document height from the last commit.
    #[must_use]
    pub fn height(&self) -> f32 {
        self.state.lock().height
    }

    /// URL from the last commit.
    #[must_use]
    pub fn url(&self) -> Option<Url> {
        self.state.lock().url.clone()
    }

    /// Focused node from the last commit.
    #[must_use]
    pub fn focus(&self) -> Option<NodeId> {
        self.state.lock().focus
    }

    /// The last committed display list.
    #[must_use]
    pub fn display_list(&self) -> DisplayList {
        self.state.lock().display_list.clone()
    }

    /// The draw list from the last draw.
    #[must_use]
    pub fn draw_list(&self) -> DisplayList {
        self.state.lock().draw_list.clone()
    }

    /// Item lists of the current layers.
    #[must_use]
    pub fn layer_items(&self) -> Vec<Vec<usize>> {
        self.state
            .lock()
            .layers
            .iter()
            .map(|layer| layer.items().to_vec())
            .collect()
    }

    /// The last committed accessibility tree.
    #[must_use]
    pub fn accessibility_tree(&self) -> Option<AccessibilityNode> {
        self.state.lock().accessibility_tree.clone()
    }

    /// Navigations requested by tabs since the last call.
    #[must_use]
    pub fn take_navigations(&self) -> Vec<NavigationRequest> {
        std::mem::take(&mut self.state.lock().navigations)
    }
}

/// A window's worth of tabs sharing one compositor.
///
/// Input methods route to the active tab as tasks, except scrolling, which
/// the compositor applies immediately and the tab adopts on its next frame.
pub struct Browser {
    compositor: Arc<Compositor>,
    tabs: Vec<TaskRunner<Tab>>,
    timer: Option<JoinHandle<()>>,
    settings: Settings,
    fonts: Arc<FontCache>,
    dark_mode: bool,
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("compositor", &self.compositor)
            .field("tabs", &self.tabs.len())
            .field("dark_mode", &self.dark_mode)
            .finish_non_exhaustive()
    }
}

impl Browser {
    /// Create a browser using the system fonts.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self::with_fonts(settings, FontCache::load_system())
    }

    /// Create a browser with the given fonts.
    #[must_use]
    pub fn with_fonts(settings: Settings, fonts: FontCache) -> Self {
        let fonts = Arc::new(fonts);
        Self {
            compositor: Arc::new(Compositor::new(settings.clone(), Arc::clone(&fonts))),
            tabs: Vec::new(),
            timer: None,
            dark_mode: settings.dark_mode,
            settings,
            fonts,
        }
    }

    /// The compositor.
    #[must_use]
    pub const fn compositor(&self) -> &Arc<Compositor> {
        &self.compositor
    }

    /// The settings every tab was created with.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Open a tab on its own thread. The first tab becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::Spawn`] if the thread cannot be created.
    pub fn new_tab(&mut self, engine: Option<Box<dyn ScriptEngine>>) -> Result<TabId, BrowserError> {
        self.start_animation_timer()?;
        let id = TabId(self.tabs.len());
        let compositor = Arc::clone(&self.compositor);
        let settings = self.settings.clone();
        let fonts = Arc::clone(&self.fonts);
        let runner = TaskRunner::spawn(&id.to_string(), move |queue| {
            Tab::new(id, compositor, queue, settings, fonts, engine)
        })?;
        let _ = self
            .compositor
            .state
            .lock()
            .tabs
            .insert(id, runner.queue().clone());
        self.tabs.push(runner);
        log::debug!(target: "kestrel::browser", "opened {id}");
        if self.compositor.active_tab().is_none() {
            self.set_active_tab(id);
        }
        Ok(id)
    }

    fn start_animation_timer(&mut self) -> Result<(), BrowserError> {
        if self.timer.is_some() {
            return Ok(());
        }
        self.compositor.set_timer_quit(false);
        let compositor = Arc::clone(&self.compositor);
        self.timer = Some(
            thread::Builder::new()
                .name("animation-timer".to_string())
                .spawn(move || compositor.run_animation_timer())?,
        );
        Ok(())
    }

    /// Make `tab` the one the compositor shows.
    ///
    /// The compositor forgets the previous tab's frame; the tab re-renders
    /// because it is told the current color scheme. A timer that is already
    /// armed stays armed and fires for `tab`.
    pub fn set_active_tab(&self, tab: TabId) {
        {
            let mut state = self.compositor.state.lock();
            if !state.tabs.contains_key(&tab) {
                return;
            }
            state.active_tab = Some(tab);
            state.scroll = 0.0;
            state.url = None;
            state.height = 0.0;
            state.display_list = DisplayList::new();
            state.composited_updates.clear();
            state.accessibility_tree = None;
            state.focus = None;
            state.set_needs_composite();
            state.needs_animation_frame = true;
        }
        let dark_mode = self.dark_mode;
        self.schedule(move |tab| tab.set_dark_mode(dark_mode));
        self.compositor.schedule_animation_frame();
    }

    fn queue_for(&self, tab: TabId) -> Option<TaskQueue<Tab>> {
        self.compositor.state.lock().tabs.get(&tab).cloned()
    }

    fn active_queue(&self) -> Option<TaskQueue<Tab>> {
        self.compositor.active_tab().and_then(|tab| self.queue_for(tab))
    }

    /// Schedule a task on the active tab, if there is one.
    pub fn schedule(&self, task: impl FnOnce(&mut Tab) + Send + 'static) {
        match self.active_queue() {
            Some(queue) => queue.schedule_task(task),
            None => log::debug!(target: "kestrel::browser", "no active tab, task dropped"),
        }
    }

    /// Run `f` on `tab`'s thread and wait for its result.
    ///
    /// # Errors
    ///
    /// [`BrowserError::NoActiveTab`] for an unknown tab,
    /// [`BrowserError::TabGone`] if the tab's thread stopped first.
    pub fn with_tab<R: Send + 'static>(
        &self,
        tab: TabId,
        f: impl FnOnce(&mut Tab) -> R + Send + 'static,
    ) -> Result<R, BrowserError> {
        let queue = self.queue_for(tab).ok_or(BrowserError::NoActiveTab)?;
        let (tx, rx) = mpsc::channel();
        queue.schedule_task(move |tab: &mut Tab| {
            let _ = tx.send(f(tab));
        });
        rx.recv().map_err(|_| BrowserError::TabGone)
    }

    /// Run `f` on the active tab's thread and wait for its result.
    ///
    /// # Errors
    ///
    /// As [`Browser::with_tab`].
    pub fn with_active_tab<R: Send + 'static>(
        &self,
        f: impl FnOnce(&mut Tab) -> R + Send + 'static,
    ) -> Result<R, BrowserError> {
        let tab = self.compositor.active_tab().ok_or(BrowserError::NoActiveTab)?;
        self.with_tab(tab, f)
    }

    /// Load a document into the active tab and wait for the load to finish.
    ///
    /// # Errors
    ///
    /// As [`Browser::with_tab`].
    pub fn load(&self, document: Document) -> Result<LoadReport, BrowserError> {
        self.with_active_tab(move |tab| tab.load(document))
    }

    /// Forward a click at viewport coordinates.
    pub fn click(&self, x: f32, y: f32) {
        self.schedule(move |tab| tab.click(x, y));
    }

    /// Forward a typed character.
    pub fn key_press(&self, ch: char) {
        self.schedule(move |tab| tab.key_press(ch));
    }

    /// Forward the Enter key.
    pub fn enter(&self) {
        self.schedule(Tab::enter);
    }

    /// Forward the Tab key.
    pub fn advance_focus(&self) {
        self.schedule(Tab::advance_focus);
    }

    /// Scroll on the compositor thread: the new offset is drawn at once and
    /// the tab picks it up on its next animation frame.
    pub fn scroll_by(&self, delta: f32) {
        {
            let mut state = self.compositor.state.lock();
            if state.active_tab.is_none() {
                return;
            }
            state.scroll = clamp_scroll(
                state.scroll + delta,
                state.height,
                self.settings.viewport_height,
            );
            state.needs_draw = true;
            state.needs_animation_frame = true;
        }
        self.compositor.schedule_animation_frame();
    }

    /// Switch between the light and dark color schemes.
    pub fn toggle_dark_mode(&mut self) {
        self.dark_mode = !self.dark_mode;
        let dark_mode = self.dark_mode;
        {
            let mut state = self.compositor.state.lock();
            state.dark_mode = dark_mode;
            state.needs_draw = true;
        }
        self.schedule(move |tab| tab.set_dark_mode(dark_mode));
    }

    /// Whether the dark color scheme is on.
    #[must_use]
    pub const fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    /// Zoom the active tab in or out by one step.
    pub fn zoom_by(&self, increase: bool) {
        self.schedule(move |tab| tab.zoom_by(increase));
    }

    /// Reset the active tab's zoom.
    pub fn reset_zoom(&self) {
        self.schedule(Tab::reset_zoom);
    }

    /// Ask the active tab for a frame even if nothing is dirty.
    pub fn request_frame(&self) {
        if let Some(tab) = self.compositor.active_tab() {
            self.compositor.set_needs_animation_frame(tab);
        }
    }

    /// Wait for the next commit (up to `timeout`), then composite, raster
    /// and draw onto `surface`. Returns whether anything was drawn.
    pub fn render_frame(&self, surface: &mut Pixmap, timeout: Duration) -> bool {
        let seen = self.compositor.commit_count();
        self.request_frame();
        if !self.compositor.wait_for_commit(seen, timeout) {
            log::debug!(target: "kestrel::browser", "no commit within {timeout:?}");
        }
        self.compositor.composite_raster_and_draw(surface)
    }

    /// A surface the size of the viewport.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new_surface(&self) -> Option<Pixmap> {
        Pixmap::new(
            self.settings.viewport_width.ceil() as u32,
            self.settings.viewport_height.ceil() as u32,
        )
    }

    /// Stop the frame timer and every tab thread.
    pub fn shutdown(&mut self) {
        self.compositor.set_timer_quit(true);
        if let Some(timer) = self.timer.take()
            && timer.join().is_err()
        {
            log::warn!(target: "kestrel::browser", "animation timer panicked");
        }
        self.compositor.state.lock().tabs.clear();
        for runner in &mut self.tabs {
            runner.quit();
        }
        self.tabs.clear();
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.shutdown();
    }
}
