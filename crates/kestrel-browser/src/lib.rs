//! Threaded browser shell for the Kestrel pipeline.
//!
//! # Scope
//!
//! This crate provides:
//! - **Tabs** - one worker thread per document, running style, layout and
//!   paint lazily behind dirty flags
//! - **Commit Protocol** - tabs hand frames to the compositor as
//!   [`CommitData`] snapshots; stale commits are dropped
//! - **Compositing** - display lists split into rastered layers plus a draw
//!   list of effects, with paint-only opacity updates
//! - **Software Rendering** - tiny-skia raster with fontdue glyphs
//! - **Accessibility** - a role tree rebuilt after every layout
//! - **Script Host** - the [`ScriptHost`]/[`ScriptEngine`] seam for an
//!   external script engine
//!
//! # Not Yet Implemented
//!
//! - Network fetching (documents arrive pre-parsed)
//! - Browser chrome (tab strip, address bar)
//! - GPU rasterization

pub mod accessibility;
pub mod browser;
pub mod commit;
pub mod compositor;
pub mod error;
pub mod fonts;
pub mod host;
pub mod load;
pub mod raster;
pub mod tab;
pub mod task;

pub use kestrel_css as css;
pub use kestrel_dom as dom;

pub use accessibility::AccessibilityNode;
pub use browser::{Browser, Compositor};
pub use commit::{CommitData, clamp_scroll};
pub use compositor::{CompositedLayer, composite, paint_draw_list};
pub use error::{BrowserError, FetchError, HostError, LoadError, ScriptError};
pub use fonts::FontCache;
pub use host::{CallbackId, DomEvent, ScriptEngine, ScriptHost};
pub use load::{ContentSecurityPolicy, Document, LinkedScript, LinkedStylesheet, Resources};
pub use raster::SkiaCanvas;
pub use tab::{LoadReport, NavigationRequest, Tab, TabId};
pub use task::{TaskQueue, TaskRunner};
