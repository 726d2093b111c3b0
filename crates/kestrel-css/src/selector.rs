//! Selectors, style rules and stylesheets.
//!
//! Rules arrive already parsed: the stylesheet parser produces an ordered list
//! of (optional media condition, selector, declaration map). Cascade order is
//! a simple integer priority derived from the selector's shape, not full CSS
//! specificity. Ties keep their stylesheet order.

use kestrel_common::warning::warn_once;
use kestrel_dom::{DomTree, NodeId, PropertyMap};
use serde::{Deserialize, Serialize};

/// A selector over element tag names, ancestry and focus.
///
/// Deserializes from the externally tagged form produced by the parser
/// collaborator, for example `{"descendant": [{"tag": "div"}, {"tag": "p"}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Selector {
    /// [§ 5.1 Type selector](https://www.w3.org/TR/selectors-4/#type-selectors)
    Tag(String),
    /// [§ 16.1 Descendant combinator](https://www.w3.org/TR/selectors-4/#descendant-combinators)
    ///
    /// `(ancestor, descendant)`
    Descendant(Box<Selector>, Box<Selector>),
    /// [§ 3.6 Pseudo-classes](https://www.w3.org/TR/selectors-4/#pseudo-classes)
    ///
    /// `(name, base)`. Only `focus` is understood.
    Pseudoclass(String, Box<Selector>),
}

impl Selector {
    /// `tag`
    #[must_use]
    pub fn tag(tag: &str) -> Self {
        Self::Tag(tag.to_ascii_lowercase())
    }

    /// `ancestor descendant`
    #[must_use]
    pub fn descendant(ancestor: Self, descendant: Self) -> Self {
        Self::Descendant(Box::new(ancestor), Box::new(descendant))
    }

    /// `base:name`
    #[must_use]
    pub fn pseudoclass(name: &str, base: Self) -> Self {
        Self::Pseudoclass(name.to_string(), Box::new(base))
    }

    /// Cascade priority: a tag counts 1, a descendant combinator sums its
    /// parts, a pseudo-class inherits its base's priority.
    #[must_use]
    pub fn priority(&self) -> u32 {
        match self {
            Self::Tag(_) => 1,
            Self::Descendant(ancestor, descendant) => ancestor.priority() + descendant.priority(),
            Self::Pseudoclass(_, base) => base.priority(),
        }
    }

    /// Whether `node` matches. Text nodes never match.
    #[must_use]
    pub fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        match self {
            Self::Tag(tag) => tree.tag_name(node) == Some(tag.as_str()),
            Self::Descendant(ancestor, descendant) => {
                descendant.matches(tree, node)
                    && tree.ancestors(node).any(|a| ancestor.matches(tree, a))
            }
            Self::Pseudoclass(name, base) => {
                if !base.matches(tree, node) {
                    return false;
                }
                if name == "focus" {
                    tree.as_element(node).is_some_and(|e| e.focused)
                } else {
                    warn_once("CSS", &format!("unknown pseudo-class ':{name}'"));
                    false
                }
            }
        }
    }
}

/// [Media Queries Level 5 § 12.5 prefers-color-scheme](https://www.w3.org/TR/mediaqueries-5/#prefers-color-scheme)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaQuery {
    /// `(prefers-color-scheme: dark)`
    Dark,
    /// `(prefers-color-scheme: light)`
    Light,
}

impl MediaQuery {
    /// Whether the condition holds for the current color scheme.
    #[must_use]
    pub const fn applies(self, dark_mode: bool) -> bool {
        match self {
            Self::Dark => dark_mode,
            Self::Light => !dark_mode,
        }
    }
}

/// One rule of a stylesheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRule {
    /// Optional media condition guarding the rule.
    #[serde(default)]
    pub media: Option<MediaQuery>,
    /// Which elements the rule applies to.
    pub selector: Selector,
    /// Property name → declared value.
    pub declarations: PropertyMap,
}

impl StyleRule {
    /// A rule with no media condition.
    #[must_use]
    pub fn new(selector: Selector, declarations: &[(&str, &str)]) -> Self {
        Self {
            media: None,
            selector,
            declarations: declarations
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    /// Guard this rule with a media condition.
    #[must_use]
    pub const fn with_media(mut self, media: MediaQuery) -> Self {
        self.media = Some(media);
        self
    }

    /// Priority of the rule's selector.
    #[must_use]
    pub fn priority(&self) -> u32 {
        self.selector.priority()
    }
}

/// An insertion-ordered list of rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stylesheet {
    rules: Vec<StyleRule>,
}

impl Stylesheet {
    /// Create an empty stylesheet.
    #[must_use]
    pub const fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule.
    pub fn push(&mut self, rule: StyleRule) {
        self.rules.push(rule);
    }

    /// Append every rule of `other`, after the existing ones.
    pub fn extend(&mut self, other: Self) {
        self.rules.extend(other.rules);
    }

    /// Rules in insertion order.
    #[must_use]
    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    /// Rules in cascade order: ascending priority, stable for ties.
    #[must_use]
    pub fn cascade_order(&self) -> Vec<&StyleRule> {
        let mut sorted: Vec<&StyleRule> = self.rules.iter().collect();
        sorted.sort_by_key(|rule| rule.priority());
        sorted
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<StyleRule> for Stylesheet {
    fn from_iter<I: IntoIterator<Item = StyleRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
