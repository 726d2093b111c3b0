//! The seam between a tab and its script engine.
//!
//! [§ 8.1.6 JavaScript execution context](https://html.spec.whatwg.org/multipage/webappapis.html)
//!
//! The engine itself is an external collaborator behind [`ScriptEngine`].
//! Everything it may do to the page goes through [`ScriptHost`], which the
//! tab implements. Node handles passed across the seam are plain
//! [`NodeId`]s; a handle whose node was removed fails with
//! [`HostError::StaleNode`] instead of reaching a reused slot.

use std::time::Duration;

use kestrel_css::Selector;
use kestrel_dom::{Fragment, NodeId, PropertyMap};
use url::Url;

use crate::error::{HostError, ScriptError};

/// Identifies a callback registered with `setTimeout`. Chosen by the engine.
pub type CallbackId = u64;

/// [UI Events](https://www.w3.org/TR/uievents/) dispatched to script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEvent {
    /// `click`
    Click,
    /// `keydown`
    KeyDown,
    /// `submit`
    Submit,
}

impl DomEvent {
    /// The event type string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::KeyDown => "keydown",
            Self::Submit => "submit",
        }
    }
}

/// The page operations available to script.
pub trait ScriptHost {
    /// [§ 4.2.6 Mixin ParentNode](https://dom.spec.whatwg.org/#dom-parentnode-queryselectorall)
    ///
    /// Every element matching `selector`, in tree order.
    fn query_selector_all(&self, selector: &Selector) -> Vec<NodeId>;

    /// [§ 4.9 getAttribute](https://dom.spec.whatwg.org/#dom-element-getattribute)
    ///
    /// # Errors
    ///
    /// [`HostError::StaleNode`] or [`HostError::NotAnElement`] for a bad
    /// handle.
    fn get_attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, HostError>;

    /// [§ 4.9 setAttribute](https://dom.spec.whatwg.org/#dom-element-setattribute)
    ///
    /// # Errors
    ///
    /// [`HostError::StaleNode`] or [`HostError::NotAnElement`] for a bad
    /// handle.
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), HostError>;

    /// The `innerHTML` setter: replace the element's children with freshly
    /// parsed content. The old children are released, so handles to them go
    /// stale.
    ///
    /// # Errors
    ///
    /// [`HostError::StaleNode`] or [`HostError::NotAnElement`] for a bad
    /// handle.
    fn set_inner_content(&mut self, node: NodeId, content: &[Fragment]) -> Result<(), HostError>;

    /// Replace the element's inline style declarations (the `style`
    /// attribute).
    ///
    /// # Errors
    ///
    /// [`HostError::StaleNode`] or [`HostError::NotAnElement`] for a bad
    /// handle.
    fn set_inline_style(&mut self, node: NodeId, declarations: PropertyMap) -> Result<(), HostError>;

    /// [§ 8.6 Timers](https://html.spec.whatwg.org/multipage/timers-and-user-prompts.html#timers)
    ///
    /// Run `callback` on the tab's thread after `delay`.
    fn set_timeout(&mut self, callback: CallbackId, delay: Duration);

    /// [§ 8.10 Animation frames](https://html.spec.whatwg.org/multipage/imagebitmap-and-animations.html#animation-frames)
    ///
    /// Ask for [`ScriptEngine::run_animation_frame`] on the next frame.
    fn request_animation_frame(&mut self);

    /// Check an `XMLHttpRequest` target before the embedder fetches it.
    /// Returns the URL resolved against the document.
    ///
    /// # Errors
    ///
    /// [`HostError::BlockedByCsp`] when the document's policy forbids the
    /// origin, [`HostError::CrossOrigin`] when it differs from the
    /// document's.
    fn check_request(&self, href: &str) -> Result<Url, HostError>;

    /// `console.log`
    fn log(&self, message: &str);
}

/// A script engine driving one document.
///
/// Owned by the tab and moved onto its thread, hence `Send`.
pub trait ScriptEngine: Send {
    /// Evaluate a script.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError`] if the script fails to compile or throws.
    fn run(&mut self, url: &str, source: &str, host: &mut dyn ScriptHost) -> Result<(), ScriptError>;

    /// Dispatch an event to listeners on `target` and its ancestors.
    ///
    /// Returns `false` if a listener called `preventDefault()`.
    fn dispatch_event(&mut self, event: DomEvent, target: NodeId, host: &mut dyn ScriptHost) -> bool;

    /// Run the callbacks registered with `requestAnimationFrame`.
    fn run_animation_frame(&mut self, host: &mut dyn ScriptHost);

    /// Run a `setTimeout` callback that has come due.
    fn dispatch_timeout(&mut self, callback: CallbackId, host: &mut dyn ScriptHost);
}
