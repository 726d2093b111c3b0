//! JSON scene files.
//!
//! A scene stands in for the fetch and parse steps: it carries the parsed
//! document, its rules, and a list of input actions to replay.
//!
//! ```json
//! {
//!   "url": "http://kestrel.test/",
//!   "document": { "tag": "html", "children": ["hello"] },
//!   "stylesheet": [ { "selector": { "tag": "html" }, "declarations": { "color": "red" } } ],
//!   "actions": [ { "click": [20, 30] }, { "type": "abc" }, "tab", "enter" ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use kestrel_browser::{Browser, Document};
use kestrel_css::Stylesheet;
use kestrel_dom::{DomTree, Fragment};
use serde::Deserialize;
use url::Url;

fn default_url() -> String {
    "about:blank".to_string()
}

/// A document plus the input to replay against it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    /// Document URL; relative links resolve against it.
    #[serde(default = "default_url")]
    pub url: String,
    /// Response headers, e.g. `Content-Security-Policy`.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// The parsed node tree.
    pub document: Fragment,
    /// Author rules.
    #[serde(default)]
    pub stylesheet: Stylesheet,
    /// Input replayed after loading, in order.
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// One input event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Click at viewport coordinates.
    Click(f32, f32),
    /// Type each character in turn.
    Type(String),
    /// Scroll by a number of pixels.
    Scroll(f32),
    /// Press Tab.
    Tab,
    /// Press Enter.
    Enter,
    /// Toggle the color scheme.
    ToggleDark,
    /// Zoom in (`true`) or out.
    Zoom(bool),
}

impl Scene {
    /// Read and parse a scene file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid scene.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read scene '{}'", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse scene '{}'", path.display()))
    }

    /// Build the document a tab loads.
    ///
    /// # Errors
    ///
    /// Fails if `url` does not parse.
    pub fn document(&self) -> anyhow::Result<Document> {
        let url = Url::parse(&self.url).with_context(|| format!("invalid scene url '{}'", self.url))?;
        let mut document = Document::new(url, DomTree::from_fragment(&self.document))
            .with_stylesheet(self.stylesheet.clone());
        for (name, value) in &self.headers {
            document = document.with_header(name, value);
        }
        Ok(document)
    }
}

impl Action {
    /// Forward the action to the browser's active tab.
    pub fn apply(&self, browser: &mut Browser) {
        log::debug!(target: "kestrel::cli", "replaying {self:?}");
        match self {
            Self::Click(x, y) => browser.click(*x, *y),
            Self::Type(text) => text.chars().for_each(|ch| browser.key_press(ch)),
            Self::Scroll(delta) => browser.scroll_by(*delta),
            Self::Tab => browser.advance_focus(),
            Self::Enter => browser.enter(),
            Self::ToggleDark => browser.toggle_dark_mode(),
            Self::Zoom(increase) => browser.zoom_by(*increase),
        }
    }
}
