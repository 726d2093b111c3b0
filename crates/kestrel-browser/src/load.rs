//! Documents handed to a tab, and the policy for their subresources.
//!
//! Fetching and parsing are done by the embedder. A [`Document`] arrives
//! with its node tree and stylesheet already parsed, plus the outcome of
//! fetching each linked stylesheet and script. The tab decides which of
//! those it may use.

use std::collections::HashMap;

use kestrel_css::{Stylesheet, default_stylesheet};
use kestrel_dom::DomTree;
use url::{Origin, Url};

use crate::error::{FetchError, LoadError};

/// A `<link rel=stylesheet>` and the result of fetching and parsing it.
#[derive(Debug, Clone)]
pub struct LinkedStylesheet {
    /// The `href` as written in the document.
    pub href: String,
    /// Parsed rules, or why they are missing.
    pub rules: Result<Stylesheet, FetchError>,
}

/// A `<script src>` and the result of fetching it.
#[derive(Debug, Clone)]
pub struct LinkedScript {
    /// The `src` as written in the document.
    pub href: String,
    /// Source text, or why it is missing.
    pub source: Result<String, FetchError>,
}

/// A parsed document and its fetched subresources.
#[derive(Debug, Clone)]
pub struct Document {
    /// Where the document came from.
    pub url: Url,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// The node tree.
    pub tree: DomTree,
    /// Rules from the document's own `<style>` elements.
    pub stylesheet: Stylesheet,
    /// Linked stylesheets, in document order.
    pub stylesheets: Vec<LinkedStylesheet>,
    /// Linked scripts, in document order.
    pub scripts: Vec<LinkedScript>,
}

impl Document {
    /// A document with no headers, rules or subresources.
    #[must_use]
    pub fn new(url: Url, tree: DomTree) -> Self {
        Self {
            url,
            headers: HashMap::new(),
            tree,
            stylesheet: Stylesheet::new(),
            stylesheets: Vec::new(),
            scripts: Vec::new(),
        }
    }

    /// Add a response header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let _ = self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the document's own rules.
    #[must_use]
    pub fn with_stylesheet(mut self, stylesheet: Stylesheet) -> Self {
        self.stylesheet = stylesheet;
        self
    }

    /// Append a linked stylesheet.
    #[must_use]
    pub fn with_linked_stylesheet(
        mut self,
        href: &str,
        rules: Result<Stylesheet, FetchError>,
    ) -> Self {
        self.stylesheets.push(LinkedStylesheet {
            href: href.to_string(),
            rules,
        });
        self
    }

    /// Append a linked script.
    #[must_use]
    pub fn with_script(mut self, href: &str, source: Result<String, FetchError>) -> Self {
        self.scripts.push(LinkedScript {
            href: href.to_string(),
            source,
        });
        self
    }

    /// A response header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The policy from the `Content-Security-Policy` header.
    #[must_use]
    pub fn csp(&self) -> ContentSecurityPolicy {
        self.header("content-security-policy")
            .map_or_else(ContentSecurityPolicy::default, ContentSecurityPolicy::parse)
    }

    /// Resolve `href` against the document and check it against `csp`.
    fn admit(&self, href: &str, csp: &ContentSecurityPolicy) -> Result<Url, LoadError> {
        let url = self.url.join(href).map_err(|source| LoadError::InvalidUrl {
            href: href.to_string(),
            source,
        })?;
        if !csp.allows(&url) {
            return Err(LoadError::BlockedByCsp { url });
        }
        Ok(url)
    }

    /// Assemble the rules and scripts the tab may use.
    ///
    /// The cascade sees the browser's default rules, then the document's
    /// own, then each admitted linked sheet. Blocked or failed resources are
    /// reported in `skipped` and otherwise ignored.
    #[must_use]
    pub fn resolve(&self) -> Resources {
        let csp = self.csp();
        let mut skipped = Vec::new();

        let mut rules = default_stylesheet().clone();
        rules.extend(self.stylesheet.clone());
        for link in &self.stylesheets {
            let admitted = self.admit(&link.href, &csp).and_then(|url| match &link.rules {
                Ok(sheet) => Ok(sheet.clone()),
                Err(source) => Err(LoadError::Fetch {
                    url,
                    source: source.clone(),
                }),
            });
            match admitted {
                Ok(sheet) => rules.extend(sheet),
                Err(err) => skipped.push(err),
            }
        }

        let mut scripts = Vec::new();
        for script in &self.scripts {
            let admitted = self.admit(&script.href, &csp).and_then(|url| match &script.source {
                Ok(source) => Ok((url, source.clone())),
                Err(source) => Err(LoadError::Fetch {
                    url,
                    source: source.clone(),
                }),
            });
            match admitted {
                Ok(script) => scripts.push(script),
                Err(err) => skipped.push(err),
            }
        }

        for err in &skipped {
            log::warn!(target: "kestrel::load", "skipping resource: {err}");
        }
        Resources {
            rules,
            scripts,
            skipped,
        }
    }
}

/// What [`Document::resolve`] admitted.
#[derive(Debug, Clone)]
pub struct Resources {
    /// Every rule the cascade should see.
    pub rules: Stylesheet,
    /// Scripts to run, in document order.
    pub scripts: Vec<(Url, String)>,
    /// Resources that were not used.
    pub skipped: Vec<LoadError>,
}

/// [CSP Level 3 § 6.1.3 default-src](https://www.w3.org/TR/CSP3/#directive-default-src)
///
/// Only the `default-src` directive with a list of origins is understood.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    allowed_origins: Option<Vec<Origin>>,
}

impl ContentSecurityPolicy {
    /// Parse a header value such as `default-src http://a.test http://b.test`.
    ///
    /// Any other directive leaves every origin allowed. Origins that do not
    /// parse as URLs are ignored.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut words = header.split_whitespace();
        if words.next() != Some("default-src") {
            return Self::default();
        }
        let origins = words
            .filter_map(|origin| match Url::parse(origin) {
                Ok(url) => Some(url.origin()),
                Err(err) => {
                    log::warn!(target: "kestrel::load", "ignoring CSP origin '{origin}': {err}");
                    None
                }
            })
            .collect();
        Self {
            allowed_origins: Some(origins),
        }
    }

    /// Whether a request to `url` is allowed.
    #[must_use]
    pub fn allows(&self, url: &Url) -> bool {
        self.allowed_origins
            .as_ref()
            .is_none_or(|origins| origins.contains(&url.origin()))
    }
}

#[cfg(test)]
mod tests {
    use kestrel_css::{Selector, StyleRule};
    use kestrel_dom::Fragment;

    use super::*;

    fn document() -> Document {
        let tree = DomTree::from_fragment(&Fragment::element("html", vec![]));
        Document::new(Url::parse("http://site.test/dir/page.html").unwrap(), tree)
    }

    fn sheet() -> Stylesheet {
        [StyleRule::new(Selector::tag("p"), &[("color", "red")])]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_csp_parse_and_allow() {
        let csp = ContentSecurityPolicy::parse("default-src http://site.test");
        assert!(csp.allows(&Url::parse("http://site.test/a.css").unwrap()));
        assert!(!csp.allows(&Url::parse("http://evil.test/a.css").unwrap()));
        let open = ContentSecurityPolicy::parse("script-src 'self'");
        assert!(open.allows(&Url::parse("http://evil.test/a.js").unwrap()));
    }

    #[test]
    fn test_resolve_skips_blocked_and_failed() {
        let doc = document()
            .with_header("Content-Security-Policy", "default-src http://site.test")
            .with_linked_stylesheet("style.css", Ok(sheet()))
            .with_linked_stylesheet("http://cdn.test/x.css", Ok(sheet()))
            .with_script("missing.js", Err(FetchError("404".to_string())))
            .with_script("/app.js", Ok("run()".to_string()));
        let resources = doc.resolve();
        assert_eq!(
            resources.rules.len(),
            default_stylesheet().len() + 1
        );
        assert_eq!(resources.scripts.len(), 1);
        assert_eq!(resources.scripts[0].0.as_str(), "http://site.test/app.js");
        assert_eq!(resources.skipped.len(), 2);
        assert!(matches!(resources.skipped[0], LoadError::BlockedByCsp { .. }));
        assert!(matches!(resources.skipped[1], LoadError::Fetch { .. }));
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let doc = document().with_header("X-Thing", "1");
        assert_eq!(doc.header("x-thing"), Some("1"));
    }
}
