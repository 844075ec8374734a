//! Widget injection with retries
//!
//! The injector is the consumer side of anchor resolution: it resolves with
//! the site's profile, retries while nothing is found, drops results for
//! addresses the user has navigated away from, and hands the anchor to a
//! [`WidgetRenderer`].

use std::sync::Arc;
use std::time::Duration;

use ethoscan_anchor_locator::{
    profile_for, AnchorPoint, AnchorResolver, DefaultAnchorResolver, MutationWait,
};
use ethoscan_core_types::{InsertionStrategy, NodeId, SiteId};
use ethoscan_page_dom::{DomError, PageDocument, PageDom};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{EthoscanConfig, ExplorerSettings};
use crate::errors::Result;
use crate::navigation::{NavigationEvent, SharedSession};

pub const WIDGET_CLASS: &str = "ethoscan-widget";
pub const WIDGET_ID_ATTR: &str = "data-ethoscan-id";

/// Mounts widgets at resolved anchors
pub trait WidgetRenderer: Send + Sync {
    /// Mount a widget for `address` at `anchor`, replacing older widgets.
    fn render(
        &self,
        anchor: &AnchorPoint,
        address: &str,
    ) -> std::result::Result<Vec<NodeId>, DomError>;
}

/// Renders a placeholder widget into an in-memory document
pub struct MarkupRenderer {
    document: Arc<PageDocument>,
}

impl MarkupRenderer {
    pub fn new(document: Arc<PageDocument>) -> Self {
        Self { document }
    }

    fn build_widget(&self, address: &str) -> std::result::Result<NodeId, DomError> {
        let doc = &self.document;
        let address = address.to_ascii_lowercase();
        let widget = doc.create_element(
            "div",
            &[("class", WIDGET_CLASS), (WIDGET_ID_ATTR, address.as_str())],
        );

        let header = doc.create_element("div", &[("class", "ethoscan-widget__header")]);
        let title = doc.create_element("span", &[("class", "ethoscan-widget__title")]);
        let title_text = doc.create_text("Ethos Reputation");
        doc.append_child(title, title_text)?;
        doc.append_child(header, title)?;

        let content = doc.create_element("div", &[("class", "ethoscan-widget__content")]);
        let label = doc.create_element("span", &[("class", "ethoscan-widget__address")]);
        let label_text = doc.create_text(&address);
        doc.append_child(label, label_text)?;
        doc.append_child(content, label)?;

        doc.append_child(widget, header)?;
        doc.append_child(widget, content)?;
        Ok(widget)
    }

    /// Widget mounted earlier that contains `node`, if any.
    fn enclosing_widget(&self, node: NodeId) -> Option<NodeId> {
        let selector = format!(".{WIDGET_CLASS}");
        let mut current = Some(node);
        while let Some(id) = current {
            if self.document.matches(id, &selector) {
                return Some(id);
            }
            current = self.document.parent_element(id);
        }
        None
    }

    fn remove_widgets_except(&self, keep: NodeId) -> usize {
        let mut removed = 0;
        for widget in self.document.query_selector_all(&format!(".{WIDGET_CLASS}")) {
            if widget != keep && matches!(self.document.remove(widget), Ok(true)) {
                removed += 1;
            }
        }
        removed
    }
}

impl WidgetRenderer for MarkupRenderer {
    fn render(
        &self,
        anchor: &AnchorPoint,
        address: &str,
    ) -> std::result::Result<Vec<NodeId>, DomError> {
        let widget = self.build_widget(address)?;
        match self.enclosing_widget(anchor.node) {
            // The anchor is our own earlier widget; take its place.
            Some(previous) => {
                debug!(%previous, "Anchor lies inside a mounted widget, replacing it in place");
                self.document
                    .insert(previous, InsertionStrategy::Before, &[widget])?;
            }
            None => self.document.insert(anchor.node, anchor.strategy, &[widget])?,
        }
        if !self.document.is_connected(widget) {
            return Err(DomError::Detached(anchor.node));
        }
        let removed = self.remove_widgets_except(widget);
        if removed > 0 {
            debug!(removed, "Removed existing widgets");
        }
        Ok(vec![widget])
    }
}

/// What an injection attempt ended with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InjectionOutcome {
    Mounted {
        anchor: AnchorPoint,
        attempts: u32,
        widget: Vec<NodeId>,
    },
    /// Every attempt ended without an anchor
    NoAnchor { attempts: u32 },
    /// The site is switched off in the settings
    Disabled { site: SiteId },
    /// The user navigated elsewhere before the widget could be mounted
    Stale { address: String },
}

/// Resolves anchors for navigations and mounts widgets at them
pub struct AnchorInjector {
    resolver: Arc<dyn AnchorResolver>,
    renderer: Arc<dyn WidgetRenderer>,
    explorers: ExplorerSettings,
    backoff: Duration,
}

impl AnchorInjector {
    pub fn new(
        resolver: Arc<dyn AnchorResolver>,
        renderer: Arc<dyn WidgetRenderer>,
        explorers: ExplorerSettings,
        backoff: Duration,
    ) -> Self {
        Self {
            resolver,
            renderer,
            explorers,
            backoff,
        }
    }

    /// Build an injector with the default resolver tuned by `config`.
    pub fn from_config(config: &EthoscanConfig, renderer: Arc<dyn WidgetRenderer>) -> Self {
        let resolver = DefaultAnchorResolver::new()
            .with_wait(Arc::new(MutationWait::new(config.wait_timeout())));
        Self::new(
            Arc::new(resolver),
            renderer,
            config.explorers.clone(),
            config.retry_backoff(),
        )
    }

    /// Resolve and mount a widget for `event`.
    ///
    /// Resolution is retried up to the profile's `max_retries` while it finds
    /// nothing. `session` is consulted before each attempt and again before
    /// mounting, so a superseded navigation never renders.
    pub async fn inject(
        &self,
        dom: &dyn PageDom,
        event: &NavigationEvent,
        session: &SharedSession,
    ) -> Result<InjectionOutcome> {
        if !self.explorers.is_enabled(&event.site) {
            info!(site = %event.site, "Explorer disabled, skipping injection");
            return Ok(InjectionOutcome::Disabled {
                site: event.site.clone(),
            });
        }

        let profile = profile_for(&event.site);
        let max_attempts = profile.max_retries.max(1);
        let stale = || InjectionOutcome::Stale {
            address: event.address.clone(),
        };

        for attempt in 1..=max_attempts {
            if !session.lock().is_current(&event.address) {
                return Ok(stale());
            }

            let resolution = self.resolver.resolve_with_profile(dom, &profile).await;
            match resolution.into_result(&event.site) {
                Ok(anchor) => {
                    if !session.lock().is_current(&event.address) {
                        debug!(address = %event.address, "Discarding anchor for stale navigation");
                        return Ok(stale());
                    }
                    let widget = self.renderer.render(&anchor, &event.address)?;
                    info!(
                        site = %event.site,
                        address = %event.address,
                        confidence = %anchor.confidence,
                        strategy = %anchor.strategy,
                        attempt,
                        "Widget mounted"
                    );
                    return Ok(InjectionOutcome::Mounted {
                        anchor,
                        attempts: attempt,
                        widget,
                    });
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(
                        site = %event.site,
                        attempt,
                        max_attempts,
                        backoff_ms = self.backoff.as_millis() as u64,
                        error = %err,
                        "No anchor point found, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => {
                    warn!(site = %event.site, attempts = attempt, error = %err, "Giving up on widget injection");
                    return Ok(InjectionOutcome::NoAnchor { attempts: attempt });
                }
            }
        }

        Ok(InjectionOutcome::NoAnchor {
            attempts: max_attempts,
        })
    }
}
