//! User-Agent Stylesheet
//!
//! [WHATWG HTML § 15 Rendering](https://html.spec.whatwg.org/multipage/rendering.html)
//!
//! "User agents are expected to have a default style sheet that presents elements
//! of HTML documents in ways consistent with general user expectations."
//!
//! The default rules come first in the cascade, so any author rule of equal
//! priority overrides them.

use std::sync::OnceLock;

use crate::selector::{MediaQuery, Selector, StyleRule, Stylesheet};

/// Return the default stylesheet, building it only once.
///
/// [CSS Cascading § 6.1](https://www.w3.org/TR/css-cascade-4/#cascade-sort)
#[must_use]
pub fn default_stylesheet() -> &'static Stylesheet {
    static STYLESHEET: OnceLock<Stylesheet> = OnceLock::new();
    STYLESHEET.get_or_init(build)
}

fn build() -> Stylesheet {
    let tag = Selector::tag;
    [
        StyleRule::new(tag("pre"), &[("background-color", "gray")]),
        StyleRule::new(tag("a"), &[("color", "blue")]),
        // [§ 15.3.8 Text-level semantics](https://html.spec.whatwg.org/multipage/rendering.html#text-level-semantics)
        StyleRule::new(tag("i"), &[("font-style", "italic")]),
        StyleRule::new(tag("em"), &[("font-style", "italic")]),
        StyleRule::new(tag("b"), &[("font-weight", "bold")]),
        StyleRule::new(tag("strong"), &[("font-weight", "bold")]),
        StyleRule::new(tag("small"), &[("font-size", "90%")]),
        StyleRule::new(tag("big"), &[("font-size", "110%")]),
        // [§ 15.5.12 Form controls](https://html.spec.whatwg.org/multipage/rendering.html#the-input-element-as-a-form-control)
        StyleRule::new(
            tag("input"),
            &[
                ("font-size", "16px"),
                ("font-weight", "normal"),
                ("font-style", "normal"),
                ("background-color", "lightblue"),
            ],
        ),
        StyleRule::new(
            tag("button"),
            &[
                ("font-size", "16px"),
                ("font-weight", "normal"),
                ("font-style", "normal"),
                ("background-color", "orange"),
            ],
        ),
        // [Media Queries § 12.5 prefers-color-scheme](https://www.w3.org/TR/mediaqueries-5/#prefers-color-scheme)
        StyleRule::new(tag("a"), &[("color", "lightblue")]).with_media(MediaQuery::Dark),
        StyleRule::new(tag("input"), &[("background-color", "blue")])
            .with_media(MediaQuery::Dark),
        StyleRule::new(tag("button"), &[("background-color", "orangered")])
            .with_media(MediaQuery::Dark),
    ]
    .into_iter()
    .collect()
}
