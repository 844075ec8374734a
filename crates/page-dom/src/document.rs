//! In-memory, thread-safe page document

use std::sync::atomic::{AtomicU64, Ordering};

use ethoscan_core_types::{ComputedStyle, InsertionStrategy, NodeId, Rect};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::dom::PageDom;
use crate::errors::DomError;
use crate::mutation::{MutationBatch, MutationRecord, MUTATION_CHANNEL_CAPACITY};
use crate::query::parse_selector;
use crate::style::{StyleResolver, StyleSheet, DEFAULT_VIEWPORT};
use crate::tree::{DomTree, DOCUMENT_NODE};

struct DocumentState {
    tree: DomTree,
    sheet: StyleSheet,
    viewport: (f64, f64),
}

impl DocumentState {
    fn resolver(&self) -> StyleResolver<'_> {
        StyleResolver::new(&self.tree, &self.sheet, self.viewport)
    }

    fn document_element(&self) -> Option<NodeId> {
        self.tree.child_element_by_tag(DOCUMENT_NODE, "html")
    }

    fn body(&self) -> Option<NodeId> {
        self.document_element()
            .and_then(|html| self.tree.child_element_by_tag(html, "body"))
    }

    fn query_all(&self, scope: NodeId, selector: &str, limit: usize) -> Vec<NodeId> {
        match parse_selector(selector) {
            Ok(parsed) => self.tree.select(scope, &parsed, limit),
            Err(err) => {
                debug!(selector, error = %err, "selector rejected; treating as no match");
                Vec::new()
            }
        }
    }
}

/// A page held in memory.
///
/// The parsed tree is not `Sync`, so every access takes the state lock.
/// Writes publish a [`MutationBatch`] to every subscribed observer after the
/// lock is released.
pub struct PageDocument {
    state: Mutex<DocumentState>,
    mutations: broadcast::Sender<MutationBatch>,
    sequence: AtomicU64,
}

impl Default for PageDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PageDocument {
    /// Blank document with `html`, `head` and `body`.
    pub fn new() -> Self {
        Self::from_html("")
    }

    /// Parse `source` as a full HTML document. `<style>` blocks become the
    /// document's style sheet.
    pub fn from_html(source: &str) -> Self {
        let tree = DomTree::parse_document(source);
        let mut sheet = StyleSheet::new();
        for css in &tree.style_texts(DOCUMENT_NODE) {
            sheet.add_css(css);
        }
        debug!(
            nodes = tree.len(),
            style_rules = sheet.len(),
            "parsed page document"
        );
        let (mutations, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(DocumentState {
                tree,
                sheet,
                viewport: DEFAULT_VIEWPORT,
            }),
            mutations,
            sequence: AtomicU64::new(0),
        }
    }

    fn publish(&self, records: Vec<MutationRecord>) {
        if records.is_empty() {
            return;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(sequence, records = records.len(), "publishing mutation batch");
        // No observers is not an error.
        let _ = self.mutations.send(MutationBatch { sequence, records });
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.state.lock().document_element()
    }

    pub fn head(&self) -> Option<NodeId> {
        let state = self.state.lock();
        state
            .document_element()
            .and_then(|html| state.tree.child_element_by_tag(html, "head"))
    }

    pub fn set_viewport(&self, width: f64, height: f64) {
        self.state.lock().viewport = (width, height);
    }

    /// Append CSS rules to the document's style sheet.
    pub fn add_stylesheet(&self, css: &str) {
        self.state.lock().sheet.add_css(css);
        let target = self.document_element().unwrap_or(DOCUMENT_NODE);
        self.publish(vec![MutationRecord::child_list(target, Vec::new(), Vec::new())]);
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.state.lock().tree.create_element(tag, attrs)
    }

    /// Create a detached text node.
    pub fn create_text(&self, text: &str) -> NodeId {
        self.state.lock().tree.create_text(text)
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.state.lock().tree.append_child(parent, child)?;
        self.publish(vec![MutationRecord::child_list(parent, vec![child], Vec::new())]);
        Ok(())
    }

    /// Mount `nodes` relative to `anchor` following `strategy`.
    pub fn insert(
        &self,
        anchor: NodeId,
        strategy: InsertionStrategy,
        nodes: &[NodeId],
    ) -> Result<(), DomError> {
        let target = {
            let mut state = self.state.lock();
            let tree = &mut state.tree;
            if !tree.is_element(anchor) {
                return Err(DomError::NotElement(anchor));
            }
            if strategy.is_sibling() {
                let (parent, _) = tree
                    .index_in_parent(anchor)
                    .ok_or(DomError::Orphan(anchor))?;
                for (offset, node) in nodes.iter().enumerate() {
                    tree.detach(*node)?;
                    let (_, index) = tree
                        .index_in_parent(anchor)
                        .ok_or(DomError::Orphan(anchor))?;
                    // Inserting at the anchor's index shifts the anchor right,
                    // so `before` keeps the nodes in order without an offset.
                    let at = match strategy {
                        InsertionStrategy::After => index + 1 + offset,
                        _ => index,
                    };
                    tree.insert_child(parent, *node, at)?;
                }
                parent
            } else {
                for (offset, node) in nodes.iter().enumerate() {
                    let at = match strategy {
                        InsertionStrategy::Prepend => offset,
                        _ => usize::MAX,
                    };
                    tree.insert_child(anchor, *node, at)?;
                }
                anchor
            }
        };
        self.publish(vec![MutationRecord::child_list(
            target,
            nodes.to_vec(),
            Vec::new(),
        )]);
        Ok(())
    }

    /// Parse `markup` as a fragment and mount it relative to `anchor`.
    pub fn insert_html(
        &self,
        anchor: NodeId,
        strategy: InsertionStrategy,
        markup: &str,
    ) -> Result<Vec<NodeId>, DomError> {
        let nodes = {
            let mut state = self.state.lock();
            let (nodes, styles) = state.tree.import_fragment(markup);
            for css in &styles {
                state.sheet.add_css(css);
            }
            nodes
        };
        self.insert(anchor, strategy, &nodes)?;
        Ok(nodes)
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.state.lock().tree.set_attr(node, name, value)?;
        self.publish(vec![MutationRecord::attribute(node, name)]);
        Ok(())
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<bool, DomError> {
        let removed = self.state.lock().tree.remove_attr(node, name)?;
        if removed {
            self.publish(vec![MutationRecord::attribute(node, name)]);
        }
        Ok(removed)
    }

    /// Detach `node`. Its handle stays valid but is no longer connected.
    pub fn remove(&self, node: NodeId) -> Result<bool, DomError> {
        let parent = self.state.lock().tree.detach(node)?;
        match parent {
            Some(parent) => {
                self.publish(vec![MutationRecord::child_list(parent, Vec::new(), vec![node])]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Detach every element matching `selector`; returns how many were
    /// removed. A malformed selector removes nothing.
    pub fn remove_matching(&self, selector: &str) -> usize {
        let mut records = Vec::new();
        {
            let mut state = self.state.lock();
            let matched = state.query_all(DOCUMENT_NODE, selector, usize::MAX);
            for node in matched {
                // An earlier removal may already have detached an ancestor.
                if !state.tree.is_connected(node) {
                    continue;
                }
                if let Ok(Some(parent)) = state.tree.detach(node) {
                    records.push(MutationRecord::child_list(parent, Vec::new(), vec![node]));
                }
            }
        }
        let removed = records.len();
        if removed > 0 {
            self.publish(records);
        }
        removed
    }

    /// All elements matching `selector`, in document order.
    pub fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
        self.state
            .lock()
            .query_all(DOCUMENT_NODE, selector, usize::MAX)
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        self.state.lock().tree.outer_html(node)
    }

    /// Serialise the whole document.
    pub fn to_html(&self) -> String {
        self.outer_html(DOCUMENT_NODE)
    }

    /// Short CSS-like label: `tag#id.class1.class2`.
    pub fn describe(&self, node: NodeId) -> String {
        let state = self.state.lock();
        describe_node(&state.tree, node)
    }

    /// Ancestor chain from `html` down to `node`, joined with ` > `.
    pub fn path(&self, node: NodeId) -> String {
        let state = self.state.lock();
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            if state.tree.local_name(id).is_none() {
                break;
            }
            chain.push(describe_node(&state.tree, id));
            current = state.tree.parent_element(id);
        }
        chain.reverse();
        chain.join(" > ")
    }
}

fn describe_node(tree: &DomTree, node: NodeId) -> String {
    let Some(tag) = tree.local_name(node) else {
        return node.to_string();
    };
    let mut label = tag.to_string();
    if let Some(id) = tree.attr(node, "id").filter(|id| !id.is_empty()) {
        label.push('#');
        label.push_str(id);
    }
    if let Some(class) = tree.attr(node, "class") {
        for class in class.split_ascii_whitespace() {
            label.push('.');
            label.push_str(class);
        }
    }
    label
}

impl PageDom for PageDocument {
    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        self.query_selector_in(DOCUMENT_NODE, selector)
    }

    fn query_selector_in(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        self.state
            .lock()
            .query_all(scope, selector, 1)
            .into_iter()
            .next()
    }

    fn matches(&self, node: NodeId, selector: &str) -> bool {
        parse_selector(selector)
            .map(|parsed| self.state.lock().tree.matches(node, &parsed))
            .unwrap_or(false)
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.state.lock().tree.is_connected(node)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.state.lock().tree.parent_element(node)
    }

    fn computed_style(&self, node: NodeId) -> Option<ComputedStyle> {
        self.state.lock().resolver().computed_style(node)
    }

    fn bounding_box(&self, node: NodeId) -> Rect {
        self.state.lock().resolver().bounding_box(node)
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.state.lock().tree.local_name(node).map(str::to_string)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state.lock().tree.attr(node, name).map(str::to_string)
    }

    fn text_content(&self, node: NodeId) -> String {
        self.state.lock().tree.text_content(node)
    }

    fn body(&self) -> Option<NodeId> {
        self.state.lock().body()
    }

    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationBatch> {
        self.mutations.subscribe()
    }

    fn observer_count(&self) -> usize {
        self.mutations.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethoscan_core_types::{Display, Visibility};

    const PAGE: &str = r#"
        <html><head><style>
            .collapsed { display: none }
            .ghost { visibility: hidden }
            #summary { height: 0 }
        </style></head>
        <body>
            <main class="content"><h1>Address 0xabc</h1><div id="first">one</div><div>two</div></main>
            <section class="collapsed"><p class="inner">hidden text</p></section>
            <section class="ghost"><p class="inner-ghost">ghost text</p></section>
            <div id="summary">zero height</div>
            <div id="empty"></div>
            <a href="/name-services/domains/vitalik.eth">vitalik.eth</a>
        </body></html>
    "#;

    #[test]
    fn test_query_selector_document_order() {
        let doc = PageDocument::from_html(PAGE);
        let first = doc.query_selector("main > div:first-of-type").unwrap();
        assert_eq!(doc.attribute(first, "id").as_deref(), Some("first"));

        let div = doc.query_selector("main > div").unwrap();
        assert_eq!(doc.attribute(div, "id").as_deref(), Some("first"));
        assert_eq!(doc.query_selector_all("main div").len(), 2);

        let link = doc
            .query_selector(r#"a[href*="/name-services/domains/"]"#)
            .unwrap();
        assert_eq!(doc.text_content(link), "vitalik.eth");
        assert!(doc.query_selector("main > h1:first-child").is_some());
        assert!(doc.query_selector("h1 + div#first").is_some());
        assert!(doc.query_selector("h1 ~ div:last-child").is_some());
        assert!(doc.query_selector("div:not(#first):not(#summary):not(#empty)").is_some());
    }

    #[test]
    fn test_malformed_selector_matches_nothing() {
        let doc = PageDocument::from_html(PAGE);
        assert!(doc.query_selector("main >").is_none());
        assert!(doc.query_selector("[[").is_none());
        assert!(!doc.matches(DOCUMENT_NODE, "]"));
        assert!(doc.query_selector_all("###").is_empty());
    }

    #[test]
    fn test_computed_style_cascade() {
        let doc = PageDocument::from_html(PAGE);
        let collapsed = doc.query_selector("section.collapsed").unwrap();
        assert_eq!(doc.computed_style(collapsed).unwrap().display, Display::None);

        let ghost_child = doc.query_selector(".inner-ghost").unwrap();
        assert_eq!(
            doc.computed_style(ghost_child).unwrap().visibility,
            Visibility::Hidden
        );

        let main = doc.query_selector("main").unwrap();
        let style = doc.computed_style(main).unwrap();
        assert!(style.is_rendered());

        let head = doc.head().unwrap();
        assert_eq!(doc.computed_style(head).unwrap().display, Display::None);
    }

    #[test]
    fn test_bounding_boxes() {
        let doc = PageDocument::from_html(PAGE);
        let main = doc.query_selector("main").unwrap();
        assert!(doc.bounding_box(main).has_area());

        let inner = doc.query_selector(".inner").unwrap();
        assert!(!doc.bounding_box(inner).has_area());

        let summary = doc.query_selector("#summary").unwrap();
        assert!(!doc.bounding_box(summary).has_area());

        let empty = doc.query_selector("#empty").unwrap();
        assert!(!doc.bounding_box(empty).has_area());

        let body = doc.body().unwrap();
        assert_eq!(doc.bounding_box(body), Rect::new(0.0, 0.0, 1280.0, 720.0));
    }

    #[test]
    fn test_deeply_nested_page_is_measured() {
        let depth = 20_000;
        let source = format!(
            "<html><body><main>{}<span class=\"leaf\">deep</span>{}</main></body></html>",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );
        let doc = PageDocument::from_html(&source);
        let leaf = doc.query_selector(".leaf").unwrap();
        let style = doc.computed_style(leaf).unwrap();
        assert_eq!(style.visibility, Visibility::Visible);
        assert!(doc.bounding_box(leaf).has_area());

        let main = doc.query_selector("main").unwrap();
        assert!(doc.bounding_box(main).has_area());
        assert!(doc.to_html().contains("<span class=\"leaf\">deep</span>"));
    }

    #[test]
    fn test_insert_strategies() {
        let doc = PageDocument::from_html("<main><p id=\"anchor\">x</p></main>");
        let anchor = doc.query_selector("#anchor").unwrap();

        doc.insert_html(anchor, InsertionStrategy::Before, "<i>before</i>")
            .unwrap();
        doc.insert_html(anchor, InsertionStrategy::After, "<i>after</i>")
            .unwrap();
        doc.insert_html(anchor, InsertionStrategy::Prepend, "<b>pre</b>")
            .unwrap();
        doc.insert_html(anchor, InsertionStrategy::Append, "<b>app</b>")
            .unwrap();

        let main = doc.query_selector("main").unwrap();
        assert_eq!(
            doc.outer_html(main),
            "<main><i>before</i><p id=\"anchor\"><b>pre</b>x<b>app</b></p><i>after</i></main>"
        );
    }

    #[test]
    fn test_sibling_insert_requires_parent() {
        let doc = PageDocument::new();
        let orphan = doc.create_element("div", &[]);
        let widget = doc.create_element("span", &[]);
        assert!(matches!(
            doc.insert(orphan, InsertionStrategy::After, &[widget]),
            Err(DomError::Orphan(_))
        ));
    }

    #[test]
    fn test_remove_detaches_and_publishes() {
        let doc = PageDocument::from_html(PAGE);
        let mut rx = doc.subscribe_mutations();
        assert_eq!(doc.observer_count(), 1);

        let main = doc.query_selector("main").unwrap();
        assert!(doc.remove(main).unwrap());
        assert!(!doc.is_connected(main));
        assert!(doc.query_selector("main").is_none());
        assert!(!doc.bounding_box(main).has_area());

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.sequence, 1);
        assert_eq!(batch.records[0].removed, vec![main]);

        drop(rx);
        assert_eq!(doc.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_attribute_change_reaches_observer() {
        let doc = std::sync::Arc::new(PageDocument::from_html(PAGE));
        let mut rx = doc.subscribe_mutations();
        let writer = std::sync::Arc::clone(&doc);
        let main = doc.query_selector("main").unwrap();
        tokio::spawn(async move {
            writer.set_attribute(main, "Data-State", "ready").unwrap();
        });

        let batch = tokio_test::assert_ok!(rx.recv().await);
        assert_eq!(batch.records[0], MutationRecord::attribute(main, "data-state"));
        assert_eq!(doc.attribute(main, "data-state").as_deref(), Some("ready"));
    }

    #[test]
    fn test_remove_matching_counts() {
        let doc = PageDocument::from_html("<div class=\"w\"><div class=\"w\"></div></div><div class=\"w\"></div>");
        assert_eq!(doc.remove_matching(".w"), 2);
        assert!(doc.query_selector(".w").is_none());
        assert_eq!(doc.remove_matching("(("), 0);
    }

    #[test]
    fn test_path_and_describe() {
        let doc = PageDocument::from_html(PAGE);
        let main = doc.query_selector("main.content").unwrap();
        assert_eq!(doc.describe(main), "main.content");
        assert_eq!(doc.path(main), "html > body > main.content");
    }
}
