//! The document seam consumed by the anchor engine

use ethoscan_core_types::{ComputedStyle, NodeId, Rect};
use tokio::sync::broadcast;

use crate::mutation::MutationBatch;

/// Read-only view of a live page.
///
/// Implementations must never panic or error on bad input: an unparsable
/// selector or a stale handle simply yields "nothing".
pub trait PageDom: Send + Sync {
    /// First element in document order matching `selector`.
    fn query_selector(&self, selector: &str) -> Option<NodeId>;

    /// First descendant of `scope` matching `selector`.
    fn query_selector_in(&self, scope: NodeId, selector: &str) -> Option<NodeId>;

    /// Whether `node` itself matches `selector`.
    fn matches(&self, node: NodeId, selector: &str) -> bool;

    /// Attached to the live document (reachable from the document root).
    fn is_connected(&self, node: NodeId) -> bool;

    fn parent_element(&self, node: NodeId) -> Option<NodeId>;

    /// `None` for non-elements and unknown handles.
    fn computed_style(&self, node: NodeId) -> Option<ComputedStyle>;

    /// Rendered box; zero-sized when the node generates no box.
    fn bounding_box(&self, node: NodeId) -> Rect;

    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn text_content(&self, node: NodeId) -> String;

    /// The `body` element, when present.
    fn body(&self) -> Option<NodeId>;

    /// Register a mutation observer. Dropping the receiver unregisters it.
    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationBatch>;

    /// Number of currently registered mutation observers.
    fn observer_count(&self) -> usize;
}

/// A node paired with the document it belongs to.
///
/// Per-rule validators receive this so that they can inspect the candidate
/// without holding any document lock.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    dom: &'a dyn PageDom,
    node: NodeId,
}

impl<'a> NodeView<'a> {
    pub fn new(dom: &'a dyn PageDom, node: NodeId) -> Self {
        Self { dom, node }
    }

    pub fn id(&self) -> NodeId {
        self.node
    }

    pub fn dom(&self) -> &'a dyn PageDom {
        self.dom
    }

    pub fn tag_name(&self) -> Option<String> {
        self.dom.tag_name(self.node)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.dom.attribute(self.node, name)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .map_or(false, |value| value.split_ascii_whitespace().any(|c| c == class))
    }

    pub fn text(&self) -> String {
        self.dom.text_content(self.node)
    }

    /// Text with runs of whitespace collapsed to single spaces.
    pub fn normalized_text(&self) -> String {
        self.text().split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn matches(&self, selector: &str) -> bool {
        self.dom.matches(self.node, selector)
    }

    pub fn find(&self, selector: &str) -> Option<NodeView<'a>> {
        self.dom
            .query_selector_in(self.node, selector)
            .map(|node| NodeView::new(self.dom, node))
    }

    pub fn parent(&self) -> Option<NodeView<'a>> {
        self.dom
            .parent_element(self.node)
            .map(|node| NodeView::new(self.dom, node))
    }
}

impl std::fmt::Debug for NodeView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeView")
            .field("node", &self.node)
            .field("tag", &self.tag_name())
            .finish()
    }
}
