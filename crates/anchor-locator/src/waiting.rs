//! Dynamic waits for late-rendered anchors
//!
//! Explorer pages often render their header after the initial load. A wait
//! checks once, then registers a mutation observer and re-checks on every
//! batch until a visible match appears or the deadline passes. Whichever
//! completes first wins; the other branch is dropped, which unregisters the
//! observer and cancels the timer.

use std::time::Duration;

use async_trait::async_trait;
use ethoscan_core_types::NodeId;
use ethoscan_page_dom::PageDom;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::errors::LocatorError;
use crate::visibility::validate_anchor_point;

/// Default dynamic wait timeout
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Waiting strategy trait
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// Wait until `selector` matches a valid anchor node
    async fn wait_for(&self, dom: &dyn PageDom, selector: &str) -> Result<NodeId, LocatorError>;

    /// Upper bound of a single wait
    fn timeout(&self) -> Duration;
}

/// Default waiting strategy: mutation-driven re-checks with a fixed timeout
#[derive(Debug, Clone, Copy)]
pub struct MutationWait {
    pub timeout: Duration,
}

impl Default for MutationWait {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl MutationWait {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl WaitStrategy for MutationWait {
    async fn wait_for(&self, dom: &dyn PageDom, selector: &str) -> Result<NodeId, LocatorError> {
        wait_for_element(dom, selector, self.timeout).await
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn find_valid(dom: &dyn PageDom, selector: &str) -> Option<NodeId> {
    dom.query_selector(selector)
        .filter(|node| validate_anchor_point(dom, *node))
}

/// Resolve the first visible match for `selector`, waiting up to `timeout`
/// for DOM mutations to produce one.
///
/// Returns immediately when a valid match already exists. On timeout the
/// result is [`LocatorError::Timeout`], delivered no earlier than `timeout`
/// after the call.
pub async fn wait_for_element(
    dom: &dyn PageDom,
    selector: &str,
    timeout: Duration,
) -> Result<NodeId, LocatorError> {
    let deadline = Instant::now() + timeout;

    if let Some(node) = find_valid(dom, selector) {
        return Ok(node);
    }

    let mut mutations = dom.subscribe_mutations();
    // A mutation may have landed between the first check and subscribing.
    if let Some(node) = find_valid(dom, selector) {
        return Ok(node);
    }

    debug!(selector, timeout_ms = timeout.as_millis() as u64, "Waiting for dynamic content");

    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => {
                debug!(selector, "Dynamic wait timed out");
                return Err(LocatorError::Timeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            batch = mutations.recv() => match batch {
                Ok(batch) => {
                    trace!(selector, sequence = batch.sequence, "Mutation batch");
                }
                // Missed batches still mean the document changed.
                Err(RecvError::Lagged(skipped)) => {
                    trace!(selector, skipped, "Mutation observer lagged");
                }
                Err(RecvError::Closed) => {
                    // No further mutations can arrive; only the timer is left.
                    (&mut sleep).await;
                    return Err(LocatorError::Timeout {
                        selector: selector.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            },
        }

        if let Some(node) = find_valid(dom, selector) {
            debug!(selector, %node, "Dynamic content appeared");
            return Ok(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethoscan_core_types::InsertionStrategy;
    use ethoscan_page_dom::PageDocument;
    use std::sync::Arc;

    fn page() -> Arc<PageDocument> {
        Arc::new(PageDocument::from_html(
            "<html><body><main id=\"root\">loading</main></body></html>",
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_match_returns_without_waiting() {
        let doc = page();
        let start = Instant::now();
        let node = wait_for_element(doc.as_ref(), "main", DEFAULT_WAIT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(Some(node), doc.query_selector("#root"));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(doc.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_inserted_before_timeout() {
        let doc = page();
        let writer = Arc::clone(&doc);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let root = writer.query_selector("#root").unwrap();
            writer
                .insert_html(root, InsertionStrategy::Append, "<div class=\"late\">hello</div>")
                .unwrap();
        });

        let start = Instant::now();
        let node = wait_for_element(doc.as_ref(), ".late", DEFAULT_WAIT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(Some(node), doc.query_selector(".late"));
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(doc.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_at_boundary() {
        let doc = page();
        let start = Instant::now();
        let result = wait_for_element(doc.as_ref(), ".never", Duration::from_millis(3000)).await;
        assert!(matches!(result, Err(LocatorError::Timeout { timeout_ms: 3000, .. })));
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
        assert_eq!(doc.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invisible_match_keeps_waiting() {
        let doc = page();
        let writer = Arc::clone(&doc);
        tokio::spawn(async move {
            let root = writer.query_selector("#root").unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let nodes = writer
                .insert_html(
                    root,
                    InsertionStrategy::Append,
                    "<div class=\"late\" style=\"display:none\">hello</div>",
                )
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.remove_attribute(nodes[0], "style").unwrap();
        });

        let start = Instant::now();
        let node = wait_for_element(doc.as_ref(), ".late", DEFAULT_WAIT_TIMEOUT).await;
        assert!(node.is_ok());
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_malformed_selector_times_out() {
        let doc = page();
        let result = wait_for_element(doc.as_ref(), "div[", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(LocatorError::Timeout { .. })));
    }

    #[test]
    fn test_default_strategy_timeout() {
        assert_eq!(MutationWait::default().timeout(), Duration::from_millis(3000));
        let node = tokio_test::block_on(
            MutationWait::new(Duration::from_millis(10)).wait_for(page().as_ref(), "body"),
        );
        assert!(node.is_ok());
    }
}
