//! Anchor resolver with confidence-ranked fallback chain

use std::sync::Arc;

use async_trait::async_trait;
use ethoscan_core_types::{Confidence, InsertionStrategy, NodeId, SiteId};
use ethoscan_page_dom::{NodeView, PageDom};
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::registry::profile_for;
use crate::trace::{Outcome, ResolutionObserver, Stage, TraceEvent, TracingObserver};
use crate::types::{AnchorPoint, Resolution, SelectorRule, SiteProfile};
use crate::visibility::check_anchor_point;
use crate::waiting::{MutationWait, WaitStrategy};

/// Page regions tried when every site-specific rule failed, in order
pub const GENERIC_REGIONS: [&str; 2] = ["main", "body"];

/// Anchor resolver trait
#[async_trait]
pub trait AnchorResolver: Send + Sync {
    /// Resolve an anchor using the registered profile for `site`
    async fn resolve(&self, dom: &dyn PageDom, site: &SiteId) -> Resolution;

    /// Resolve an anchor using an explicit profile
    async fn resolve_with_profile(&self, dom: &dyn PageDom, profile: &SiteProfile)
        -> Resolution;
}

/// Default anchor resolver implementation.
///
/// Stages run strictly in order and the first valid node wins:
/// site candidates (`High`), the site fallback (`Medium`, always `prepend`),
/// then [`GENERIC_REGIONS`] (`Low`, always `prepend`, never waited for).
/// The resolver holds no per-call state, so one instance can serve many
/// concurrent passes.
pub struct DefaultAnchorResolver {
    wait: Arc<dyn WaitStrategy>,
    observer: Arc<dyn ResolutionObserver>,
}

impl Default for DefaultAnchorResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultAnchorResolver {
    pub fn new() -> Self {
        Self {
            wait: Arc::new(MutationWait::default()),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_wait(mut self, wait: Arc<dyn WaitStrategy>) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResolutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn emit(
        &self,
        profile: &SiteProfile,
        stage: Stage,
        index: usize,
        selector: &str,
        outcome: Outcome,
    ) {
        self.observer.on_event(&TraceEvent {
            site: profile.site.to_string(),
            stage,
            index,
            selector: selector.to_string(),
            outcome,
        });
    }

    /// Find `selector`, waiting for dynamic content when asked to.
    async fn lookup(
        &self,
        dom: &dyn PageDom,
        selector: &str,
        wait: bool,
    ) -> Result<NodeId, LocatorError> {
        if wait {
            self.wait.wait_for(dom, selector).await
        } else {
            dom.query_selector(selector)
                .ok_or_else(|| LocatorError::NoMatch(selector.to_string()))
        }
    }

    fn validate(dom: &dyn PageDom, selector: &str, node: NodeId) -> Result<NodeId, LocatorError> {
        check_anchor_point(dom, node).map_err(|issue| LocatorError::InvalidCandidate {
            selector: selector.to_string(),
            reason: issue.to_string(),
        })?;
        Ok(node)
    }

    async fn evaluate_rule(
        &self,
        dom: &dyn PageDom,
        profile: &SiteProfile,
        rule: &SelectorRule,
    ) -> Result<NodeId, LocatorError> {
        let node = self
            .lookup(dom, &rule.query, profile.wait_for_dynamic_content)
            .await?;
        let node = Self::validate(dom, &rule.query, node)?;
        if let Some(validator) = &rule.validator {
            if !validator.test(&NodeView::new(dom, node)) {
                return Err(LocatorError::Rejected {
                    selector: rule.query.clone(),
                    validator: validator.name(),
                });
            }
        }
        Ok(node)
    }

    fn found(
        &self,
        profile: &SiteProfile,
        stage: Stage,
        index: usize,
        anchor: AnchorPoint,
    ) -> Resolution {
        self.emit(profile, stage, index, &anchor.selector, Outcome::Matched);
        Resolution::Found(anchor)
    }
}

fn anchor_point(
    node: NodeId,
    selector: &str,
    strategy: InsertionStrategy,
    confidence: Confidence,
) -> AnchorPoint {
    AnchorPoint {
        node,
        strategy,
        confidence,
        selector: selector.to_string(),
    }
}

#[async_trait]
impl AnchorResolver for DefaultAnchorResolver {
    async fn resolve(&self, dom: &dyn PageDom, site: &SiteId) -> Resolution {
        let profile = profile_for(site);
        self.resolve_with_profile(dom, &profile).await
    }

    async fn resolve_with_profile(&self, dom: &dyn PageDom, profile: &SiteProfile) -> Resolution {
        debug!(
            site = %profile.site,
            candidates = profile.candidates.len(),
            wait = profile.wait_for_dynamic_content,
            "Resolving anchor point"
        );

        for (index, rule) in profile.candidates.iter().enumerate() {
            match self.evaluate_rule(dom, profile, rule).await {
                Ok(node) => {
                    let point = anchor_point(node, &rule.query, rule.strategy, Confidence::High);
                    return self.found(profile, Stage::Candidate, index, point);
                }
                Err(err) => {
                    let outcome = Outcome::from(&err);
                    self.emit(profile, Stage::Candidate, index, &rule.query, outcome);
                }
            }
        }

        if let Some(selector) = &profile.fallback_selector {
            let result = self
                .lookup(dom, selector, profile.wait_for_dynamic_content)
                .await
                .and_then(|node| Self::validate(dom, selector, node));
            match result {
                Ok(node) => {
                    info!(site = %profile.site, %selector, "Using site fallback anchor");
                    let point =
                        anchor_point(node, selector, InsertionStrategy::Prepend, Confidence::Medium);
                    return self.found(profile, Stage::Fallback, 0, point);
                }
                Err(err) => {
                    self.emit(profile, Stage::Fallback, 0, selector, Outcome::from(&err))
                }
            }
        }

        for (index, region) in GENERIC_REGIONS.iter().enumerate() {
            let result = self
                .lookup(dom, region, false)
                .await
                .and_then(|node| Self::validate(dom, region, node));
            match result {
                Ok(node) => {
                    warn!(site = %profile.site, region, "Using generic anchor");
                    let point =
                        anchor_point(node, region, InsertionStrategy::Prepend, Confidence::Low);
                    return self.found(profile, Stage::Generic, index, point);
                }
                Err(err) => {
                    self.emit(profile, Stage::Generic, index, region, Outcome::from(&err))
                }
            }
        }

        warn!(site = %profile.site, "No anchor point found");
        Resolution::NoAnchor
    }
}
