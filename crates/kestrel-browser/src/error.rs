//! Error types for document loading and the script host.

use kestrel_dom::NodeId;
use thiserror::Error;
use url::Url;

/// A secondary resource could not be fetched by the embedder.
///
/// The network is an external collaborator; this carries its message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FetchError(pub String);

/// Why a linked stylesheet or script was skipped while loading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The reference does not resolve against the document URL.
    #[error("cannot resolve '{href}': {source}")]
    InvalidUrl {
        /// The reference as written in the document.
        href: String,
        /// Parse failure.
        source: url::ParseError,
    },
    /// The document's `Content-Security-Policy` does not allow the origin.
    #[error("blocked {url} due to CSP")]
    BlockedByCsp {
        /// The resolved URL.
        url: Url,
    },
    /// The embedder could not fetch the resource.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        /// The resolved URL.
        url: Url,
        /// Fetch failure.
        source: FetchError,
    },
}

/// Errors returned to script through [`crate::host::ScriptHost`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// The handle refers to a node that has been removed.
    #[error("node {0} no longer exists")]
    StaleNode(NodeId),
    /// The handle refers to a text node where an element is required.
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),
    /// No document has been loaded yet.
    #[error("no document loaded")]
    NoDocument,
    /// The requested URL does not parse.
    #[error("cannot resolve '{href}': {source}")]
    InvalidUrl {
        /// The URL as passed by script.
        href: String,
        /// Parse failure.
        source: url::ParseError,
    },
    /// The document's `Content-Security-Policy` does not allow the origin.
    #[error("request to {url} blocked by CSP")]
    BlockedByCsp {
        /// The resolved URL.
        url: Url,
    },
    /// The request leaves the document's origin.
    #[error("cross-origin request to {url} not allowed")]
    CrossOrigin {
        /// The resolved URL.
        url: Url,
    },
}

/// Errors from the browser's tab management.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// A tab thread could not be spawned.
    #[error("failed to spawn tab thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// No tab has been opened yet.
    #[error("no active tab")]
    NoActiveTab,
    /// The tab's thread stopped before answering.
    #[error("tab thread is gone")]
    TabGone,
}

/// A script threw or failed to compile.
///
/// The script engine is an external collaborator; this carries its message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("script error: {0}")]
pub struct ScriptError(pub String);
