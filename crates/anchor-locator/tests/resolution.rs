//! End-to-end resolution scenarios against in-memory pages

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ethoscan_anchor_locator::{
    lookup, AnchorResolver, DefaultAnchorResolver, MutationWait, NodePredicate, NoopObserver,
    Outcome, RecordingObserver, Resolution, SelectorRule, SiteProfile, Stage,
};
use ethoscan_core_types::{ComputedStyle, Confidence, InsertionStrategy, NodeId, Rect, SiteId};
use ethoscan_page_dom::{MutationBatch, NodeView, PageDocument, PageDom};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Delegates to a document and counts selector lookups.
struct CountingDom {
    inner: Arc<PageDocument>,
    lookups: Mutex<HashMap<String, usize>>,
}

impl CountingDom {
    fn new(inner: Arc<PageDocument>) -> Self {
        Self {
            inner,
            lookups: Mutex::new(HashMap::new()),
        }
    }

    fn lookups(&self, selector: &str) -> usize {
        self.lookups.lock().get(selector).copied().unwrap_or(0)
    }
}

impl PageDom for CountingDom {
    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        *self.lookups.lock().entry(selector.to_string()).or_default() += 1;
        self.inner.query_selector(selector)
    }

    fn query_selector_in(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        self.inner.query_selector_in(scope, selector)
    }

    fn matches(&self, node: NodeId, selector: &str) -> bool {
        self.inner.matches(node, selector)
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.inner.is_connected(node)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.inner.parent_element(node)
    }

    fn computed_style(&self, node: NodeId) -> Option<ComputedStyle> {
        self.inner.computed_style(node)
    }

    fn bounding_box(&self, node: NodeId) -> Rect {
        self.inner.bounding_box(node)
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.inner.tag_name(node)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner.attribute(node, name)
    }

    fn text_content(&self, node: NodeId) -> String {
        self.inner.text_content(node)
    }

    fn body(&self) -> Option<NodeId> {
        self.inner.body()
    }

    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationBatch> {
        self.inner.subscribe_mutations()
    }

    fn observer_count(&self) -> usize {
        self.inner.observer_count()
    }
}

fn page(body: &str) -> Arc<PageDocument> {
    Arc::new(PageDocument::from_html(&format!(
        "<html><head></head><body>{body}</body></html>"
    )))
}

fn quiet_resolver() -> DefaultAnchorResolver {
    DefaultAnchorResolver::new().with_observer(Arc::new(NoopObserver))
}

#[tokio::test]
async fn scenario_a_custom_profile_second_candidate() {
    let doc = page("<main class=\"content\">feed</main>");
    let profile = SiteProfile::new(SiteId::parse("siteX"))
        .candidate(SelectorRule::new(".missing", InsertionStrategy::After))
        .candidate(SelectorRule::new("main.content", InsertionStrategy::Append));

    let resolution = quiet_resolver()
        .resolve_with_profile(doc.as_ref(), &profile)
        .await;

    let anchor = resolution.anchor().expect("anchor");
    assert_eq!(anchor.strategy, InsertionStrategy::Append);
    assert_eq!(anchor.confidence, Confidence::High);
    assert_eq!(Some(anchor.node), doc.query_selector("main.content"));
}

#[tokio::test]
async fn scenario_b_unknown_site_uses_primary_region() {
    let doc = page("<main>feed</main><footer>links</footer>");
    let resolution = quiet_resolver()
        .resolve(doc.as_ref(), &SiteId::parse("unknown.xyz"))
        .await;

    let anchor = resolution.anchor().expect("anchor");
    assert_eq!(anchor.strategy, InsertionStrategy::Prepend);
    assert_eq!(anchor.confidence, Confidence::Low);
    assert_eq!(Some(anchor.node), doc.query_selector("main"));
}

#[tokio::test]
async fn scenario_c_known_site_falls_back_to_body() {
    let doc = page(
        "<div class=\"container py-3\" style=\"display:none\"><h1>Address 0xabc</h1></div>\
         <section class=\"container-xxl\" style=\"visibility:hidden\">x</section>",
    );
    let observer = Arc::new(RecordingObserver::new());
    let resolver = DefaultAnchorResolver::new().with_observer(observer.clone());

    let resolution = resolver.resolve(doc.as_ref(), &SiteId::Etherscan).await;

    let anchor = resolution.anchor().expect("anchor");
    assert_eq!(anchor.strategy, InsertionStrategy::Prepend);
    assert_eq!(anchor.confidence, Confidence::Low);
    assert_eq!(Some(anchor.node), doc.body());

    let stages: Vec<_> = observer
        .events()
        .iter()
        .map(|event| (event.stage, event.outcome.clone()))
        .collect();
    assert_eq!(stages.len(), 6);
    assert_eq!(stages[3], (Stage::Fallback, Outcome::NotFound));
    assert_eq!(stages[4], (Stage::Generic, Outcome::NotFound));
    assert_eq!(stages[5], (Stage::Generic, Outcome::Matched));
}

#[tokio::test]
async fn scenario_d_known_site_with_nothing_visible() {
    let doc = Arc::new(PageDocument::from_html(
        "<html><body style=\"display:none\"><main id=\"content\">x</main></body></html>",
    ));
    let resolution = quiet_resolver()
        .resolve(doc.as_ref(), &SiteId::Etherscan)
        .await;
    assert_eq!(resolution, Resolution::NoAnchor);
    assert!(resolution.into_result(&SiteId::Etherscan).is_err());
}

#[tokio::test]
async fn first_candidate_stops_later_lookups() {
    let doc = page(
        "<div class=\"container py-3\"><h1>Address 0xabc</h1></div>\
         <main id=\"content\">x</main>",
    );
    let counting = CountingDom::new(doc);
    let resolution = quiet_resolver()
        .resolve(&counting, &SiteId::Etherscan)
        .await;

    assert_eq!(resolution.anchor().map(|a| a.confidence), Some(Confidence::High));
    assert_eq!(counting.lookups(".container.py-3"), 1);
    assert_eq!(counting.lookups("section.container-xxl"), 0);
    assert_eq!(counting.lookups("main#content"), 0);
    assert_eq!(counting.lookups("main"), 0);
    assert_eq!(counting.lookups("body"), 0);
}

#[tokio::test]
async fn fallback_wins_with_medium_confidence() {
    let doc = page("<main id=\"content\">overview</main>");
    let counting = CountingDom::new(doc);
    let resolution = quiet_resolver()
        .resolve(&counting, &SiteId::Etherscan)
        .await;

    let anchor = resolution.anchor().expect("anchor");
    assert_eq!(anchor.confidence, Confidence::Medium);
    assert_eq!(anchor.strategy, InsertionStrategy::Prepend);
    assert_eq!(anchor.selector, "main#content");
    assert_eq!(counting.lookups("main"), 0);
}

#[tokio::test]
async fn primary_region_outranks_body() {
    let doc = page("<main>feed</main>");
    let resolution = quiet_resolver()
        .resolve(doc.as_ref(), &SiteId::parse("siteX"))
        .await;
    assert_eq!(resolution.anchor().map(|a| a.selector.as_str()), Some("main"));
}

#[tokio::test]
async fn hidden_ancestor_skips_candidate() {
    let doc = page(
        "<style>.shell { display: none }</style>\
         <div class=\"shell\"><div class=\"target\">x</div></div>\
         <div class=\"backup\">y</div>",
    );
    let profile = SiteProfile::new(SiteId::parse("siteX"))
        .candidate(SelectorRule::new(".target", InsertionStrategy::After))
        .candidate(SelectorRule::new(".backup", InsertionStrategy::Before));

    let resolution = quiet_resolver()
        .resolve_with_profile(doc.as_ref(), &profile)
        .await;
    let anchor = resolution.anchor().expect("anchor");
    assert_eq!(anchor.selector, ".backup");
    assert_eq!(anchor.strategy, InsertionStrategy::Before);
}

fn never(_: &NodeView<'_>) -> bool {
    false
}

#[tokio::test]
async fn validator_rejection_moves_to_next_candidate() {
    let doc = page("<div class=\"a\">x</div><div class=\"b\">y</div>");
    let profile = SiteProfile::new(SiteId::parse("siteX"))
        .candidate(
            SelectorRule::new(".a", InsertionStrategy::After)
                .with_validator(NodePredicate::new("never", never)),
        )
        .candidate(SelectorRule::new(".b", InsertionStrategy::After));
    let observer = Arc::new(RecordingObserver::new());
    let resolver = DefaultAnchorResolver::new().with_observer(observer.clone());

    let resolution = resolver.resolve_with_profile(doc.as_ref(), &profile).await;

    assert_eq!(resolution.anchor().map(|a| a.selector.as_str()), Some(".b"));
    let events = observer.events();
    assert_eq!(events[0].outcome, Outcome::Rejected { validator: "never" });
    assert_eq!(events[1].outcome, Outcome::Matched);
}

#[tokio::test]
async fn fallback_ignores_rule_validators() {
    let doc = page("<main>x</main>");
    let profile = lookup("blockscout");
    let resolver = quiet_resolver().with_wait(Arc::new(MutationWait::new(Duration::from_millis(5))));
    let resolution = resolver.resolve_with_profile(doc.as_ref(), &profile).await;
    let anchor = resolution.anchor().expect("anchor");
    assert_eq!(anchor.confidence, Confidence::Medium);
    assert_eq!(anchor.selector, "main");
}

#[tokio::test]
async fn repeated_resolution_is_idempotent() {
    let doc = page("<div class=\"address-entity\">0x1111111111111111111111111111111111111111</div>");
    let resolver = quiet_resolver();
    let first = resolver.resolve(doc.as_ref(), &SiteId::Blockscout).await;
    let second = resolver.resolve(doc.as_ref(), &SiteId::Blockscout).await;
    assert!(first.is_found());
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn dynamic_candidate_is_awaited() {
    let doc = page("<main>loading</main>");
    let writer = Arc::clone(&doc);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1200)).await;
        let main = writer.query_selector("main").expect("main");
        writer
            .insert_html(
                main,
                InsertionStrategy::Prepend,
                "<div class=\"ProfileHeader_wrap\">0xabc</div>",
            )
            .expect("insert");
    });

    let start = Instant::now();
    let resolution = quiet_resolver().resolve(doc.as_ref(), &SiteId::Debank).await;
    let anchor = resolution.anchor().expect("anchor");
    assert_eq!(anchor.confidence, Confidence::High);
    assert_eq!(anchor.strategy, InsertionStrategy::Append);
    assert_eq!(start.elapsed(), Duration::from_millis(1200));
    assert_eq!(doc.observer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn dynamic_waits_time_out_per_rule() {
    let doc = page("<main>idle</main>");
    let start = Instant::now();
    let resolution = quiet_resolver().resolve(doc.as_ref(), &SiteId::Blockscout).await;
    // Two candidates wait out their full timeout before the fallback matches.
    assert_eq!(start.elapsed(), Duration::from_millis(6000));
    assert_eq!(resolution.anchor().map(|a| a.confidence), Some(Confidence::Medium));
    assert_eq!(doc.observer_count(), 0);
}

#[tokio::test]
async fn malformed_selector_is_no_match() {
    let doc = page("<main>x</main>");
    let profile = SiteProfile::new(SiteId::parse("siteX"))
        .candidate(SelectorRule::new("div[", InsertionStrategy::After));
    let observer = Arc::new(RecordingObserver::new());
    let resolver = DefaultAnchorResolver::new().with_observer(observer.clone());
    let resolution = resolver.resolve_with_profile(doc.as_ref(), &profile).await;
    assert_eq!(resolution.anchor().map(|a| a.confidence), Some(Confidence::Low));
    assert_eq!(observer.events()[0].outcome, Outcome::NotFound);
}
