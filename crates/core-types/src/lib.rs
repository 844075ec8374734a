//! Shared vocabulary for the Ethoscan anchor engine.
//!
//! These types are consumed by the page-dom seam, the anchor locator and the
//! CLI runtime. Serde support is gated behind the `serde-full` feature so the
//! engine crates stay lean.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error raised when parsing one of the shared vocabulary types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown insertion strategy '{0}'")]
    UnknownStrategy(String),

    #[error("unknown confidence tier '{0}'")]
    UnknownConfidence(String),
}

/// Supported explorer sites.
///
/// Identifiers that do not name a supported explorer are kept verbatim in
/// [`SiteId::Other`] so that resolution can still fall through to generic
/// page regions.
#[cfg_attr(
    feature = "serde-full",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SiteId {
    Etherscan,
    Blockscout,
    Debank,
    Other(String),
}

impl SiteId {
    /// Every site that has a compiled-in profile.
    pub const SUPPORTED: [SiteId; 3] = [SiteId::Etherscan, SiteId::Blockscout, SiteId::Debank];

    /// Parse a site identifier. Never fails; unrecognised identifiers become
    /// [`SiteId::Other`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "etherscan" => SiteId::Etherscan,
            "blockscout" => SiteId::Blockscout,
            "debank" => SiteId::Debank,
            _ => SiteId::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SiteId::Etherscan => "etherscan",
            SiteId::Blockscout => "blockscout",
            SiteId::Debank => "debank",
            SiteId::Other(raw) => raw,
        }
    }
}

impl From<&str> for SiteId {
    fn from(value: &str) -> Self {
        SiteId::parse(value)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where injected content is mounted relative to the anchor node.
#[cfg_attr(
    feature = "serde-full",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InsertionStrategy {
    /// Immediately before the anchor, as a sibling
    Before,
    /// Immediately after the anchor, as a sibling
    After,
    /// As the anchor's first child
    Prepend,
    /// As the anchor's last child
    Append,
}

impl InsertionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            InsertionStrategy::Before => "before",
            InsertionStrategy::After => "after",
            InsertionStrategy::Prepend => "prepend",
            InsertionStrategy::Append => "append",
        }
    }

    /// Whether the widget becomes a sibling (rather than a child) of the anchor.
    pub fn is_sibling(&self) -> bool {
        matches!(self, InsertionStrategy::Before | InsertionStrategy::After)
    }
}

impl FromStr for InsertionStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(InsertionStrategy::Before),
            "after" => Ok(InsertionStrategy::After),
            "prepend" => Ok(InsertionStrategy::Prepend),
            "append" => Ok(InsertionStrategy::Append),
            other => Err(CoreError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for InsertionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How deliberately an anchor was matched.
///
/// - High: a configured candidate rule matched and validated
/// - Medium: the profile's explicit fallback selector matched
/// - Low: a generic document region matched
#[cfg_attr(
    feature = "serde-full",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn name(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl FromStr for Confidence {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Confidence::High),
            "medium" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            other => Err(CoreError::UnknownConfidence(other.to_string())),
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque handle to a node in a live document.
///
/// A handle does not keep the node alive and says nothing about whether the
/// node is still attached; ask the document.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Rendered bounding box in CSS pixels.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Both dimensions are non-zero.
    pub fn has_area(&self) -> bool {
        self.width != 0.0 && self.height != 0.0
    }
}

/// Computed `display` value, reduced to what placement decisions need.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Display {
    None,
    Block,
    Inline,
    InlineBlock,
    Flex,
    Grid,
    Contents,
    Other(String),
}

impl Display {
    /// Parse a CSS `display` keyword. Unknown keywords are preserved.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "none" => Display::None,
            "block" => Display::Block,
            "inline" => Display::Inline,
            "inline-block" => Display::InlineBlock,
            "flex" | "inline-flex" => Display::Flex,
            "grid" | "inline-grid" => Display::Grid,
            "contents" => Display::Contents,
            other => Display::Other(other.to_string()),
        }
    }
}

/// Computed `visibility` value.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
    Collapse,
}

impl Visibility {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "visible" => Some(Visibility::Visible),
            "hidden" => Some(Visibility::Hidden),
            "collapse" => Some(Visibility::Collapse),
            _ => None,
        }
    }
}

/// The slice of a node's computed style that the visibility checks read.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,
    pub visibility: Visibility,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            visibility: Visibility::Visible,
        }
    }
}

impl ComputedStyle {
    /// Neither `display:none` nor `visibility:hidden`.
    pub fn is_rendered(&self) -> bool {
        self.display != Display::None && self.visibility != Visibility::Hidden
    }
}
