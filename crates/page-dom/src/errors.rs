//! Error types for the document layer

use ethoscan_core_types::NodeId;
use thiserror::Error;

/// Selector parse failure.
///
/// Lookups never surface these; a selector that fails to parse simply
/// matches nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Selector is empty or whitespace
    #[error("empty selector")]
    Empty,

    /// Rejected by the CSS selector parser
    #[error("invalid selector '{selector}': {reason}")]
    Invalid { selector: String, reason: String },
}

/// Document mutation failure
#[derive(Debug, Error, Clone)]
pub enum DomError {
    /// Handle does not belong to this document
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Operation requires an element node
    #[error("not an element: {0}")]
    NotElement(NodeId),

    /// Sibling insertion against a node without a parent
    #[error("node has no parent: {0}")]
    Orphan(NodeId),

    /// Node ended up outside the live document
    #[error("node is not attached to the document: {0}")]
    Detached(NodeId),

    /// Insertion would make a node its own ancestor
    #[error("hierarchy request error: {0}")]
    Hierarchy(String),
}
