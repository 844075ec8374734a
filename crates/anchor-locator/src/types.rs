//! Profile and result types for anchor resolution

use std::fmt;

use ethoscan_core_types::{Confidence, InsertionStrategy, NodeId, SiteId};
use ethoscan_page_dom::NodeView;
use serde::{Serialize, Serializer};

use crate::errors::LocatorError;

/// Default number of injection attempts per page
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A named, pure predicate over a candidate node.
///
/// Validators run after the structural match and the visibility check, and
/// may only read the node.
#[derive(Clone, Copy)]
pub struct NodePredicate {
    name: &'static str,
    check: fn(&NodeView<'_>) -> bool,
}

impl NodePredicate {
    pub const fn new(name: &'static str, check: fn(&NodeView<'_>) -> bool) -> Self {
        Self { name, check }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn test(&self, node: &NodeView<'_>) -> bool {
        (self.check)(node)
    }
}

impl fmt::Debug for NodePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodePredicate").field(&self.name).finish()
    }
}

impl Serialize for NodePredicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// One candidate anchor selector and where to mount relative to it
#[derive(Debug, Clone, Serialize)]
pub struct SelectorRule {
    pub query: String,
    pub strategy: InsertionStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<NodePredicate>,
}

impl SelectorRule {
    pub fn new(query: impl Into<String>, strategy: InsertionStrategy) -> Self {
        Self {
            query: query.into(),
            strategy,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: NodePredicate) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Per-site anchoring configuration
#[derive(Debug, Clone, Serialize)]
pub struct SiteProfile {
    pub site: SiteId,
    /// Tried in order; the first valid one wins
    pub candidates: Vec<SelectorRule>,
    /// Last site-specific attempt, always mounted with `prepend`
    pub fallback_selector: Option<String>,
    /// Wait for late-rendered content instead of checking once
    pub wait_for_dynamic_content: bool,
    /// Attempt limit for the injector on a single page
    pub max_retries: u32,
}

impl SiteProfile {
    /// Empty profile: no candidates, no fallback, no waits.
    pub fn new(site: SiteId) -> Self {
        Self {
            site,
            candidates: Vec::new(),
            fallback_selector: None,
            wait_for_dynamic_content: false,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn candidate(mut self, rule: SelectorRule) -> Self {
        self.candidates.push(rule);
        self
    }

    pub fn fallback(mut self, selector: impl Into<String>) -> Self {
        self.fallback_selector = Some(selector.into());
        self
    }

    pub fn wait_for_dynamic_content(mut self, wait: bool) -> Self {
        self.wait_for_dynamic_content = wait;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Where an injected widget should be mounted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorPoint {
    pub node: NodeId,
    pub strategy: InsertionStrategy,
    pub confidence: Confidence,
    /// Selector that produced the node
    pub selector: String,
}

/// Outcome of one resolution pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "anchor", rename_all = "snake_case")]
pub enum Resolution {
    Found(AnchorPoint),
    NoAnchor,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn anchor(&self) -> Option<&AnchorPoint> {
        match self {
            Resolution::Found(anchor) => Some(anchor),
            Resolution::NoAnchor => None,
        }
    }

    pub fn into_option(self) -> Option<AnchorPoint> {
        match self {
            Resolution::Found(anchor) => Some(anchor),
            Resolution::NoAnchor => None,
        }
    }

    /// Convert to a `Result`, naming `site` in the exhaustion error.
    pub fn into_result(self, site: &SiteId) -> Result<AnchorPoint, LocatorError> {
        self.into_option()
            .ok_or_else(|| LocatorError::Exhausted(site.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_empty(node: &NodeView<'_>) -> bool {
        !node.normalized_text().is_empty()
    }

    #[test]
    fn test_profile_builder_defaults() {
        let profile = SiteProfile::new(SiteId::parse("siteX"));
        assert!(profile.candidates.is_empty());
        assert!(profile.fallback_selector.is_none());
        assert!(!profile.wait_for_dynamic_content);
        assert_eq!(profile.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_rule_serializes_validator_name() {
        let rule = SelectorRule::new(".a", InsertionStrategy::After)
            .with_validator(NodePredicate::new("non_empty", non_empty));
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["query"], ".a");
        assert_eq!(json["validator"], "non_empty");
        assert_eq!(format!("{:?}", rule.validator.unwrap()), "NodePredicate(\"non_empty\")");
    }

    #[test]
    fn test_resolution_into_result() {
        let site = SiteId::Debank;
        let err = Resolution::NoAnchor.into_result(&site).unwrap_err();
        assert_eq!(err, LocatorError::Exhausted("debank".into()));
    }
}
