//! Error types for DOM port operations

use thiserror::Error;

/// DOM backend error enumeration
#[derive(Debug, Error, Clone)]
pub enum DomError {
    /// CSS selector could not be parsed
    #[error("Invalid CSS selector: {0}")]
    SelectorSyntax(String),

    /// XPath expression could not be parsed or evaluated
    #[error("Invalid XPath expression: {0}")]
    XPathSyntax(String),

    /// The node handle refers to a node that is no longer connected
    #[error("Node is detached: {0}")]
    Detached(String),

    /// The node handle is unknown to the backend
    #[error("Unknown node handle: {0}")]
    UnknownNode(String),

    /// Operation is not applicable to this node kind
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DomError {
    /// Query errors collapse to "no match" at the strategy boundary;
    /// everything else surfaces upward.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            DomError::SelectorSyntax(_) | DomError::XPathSyntax(_)
        )
    }
}
