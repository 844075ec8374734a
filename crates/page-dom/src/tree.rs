//! Live node tree backed by `scraper::Html`
//!
//! Handles are indices into a table kept next to the parsed tree. Removed
//! nodes stay in the underlying arena, so a handle never dangles, but they
//! are no longer reachable from the document node. Every walk here is
//! iterative so that deeply nested pages cannot exhaust the stack.

use std::collections::HashMap;

use ego_tree::{NodeMut, NodeRef};
use ethoscan_core_types::NodeId;
use html5ever::tendril::StrTendril as AttrValue;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node, Selector, StrTendril};

use crate::errors::DomError;

/// The document node always has handle 0.
pub const DOCUMENT_NODE: NodeId = NodeId(0);

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

type TreeId = ego_tree::NodeId;

pub struct DomTree {
    html: Html,
    handles: Vec<TreeId>,
    index: HashMap<TreeId, NodeId>,
}

impl DomTree {
    /// Parse a full document. The parser always synthesises `html`, `head`
    /// and `body`.
    pub fn parse_document(source: &str) -> Self {
        let html = Html::parse_document(source);
        let ids: Vec<TreeId> = html.tree.nodes().map(|node| node.id()).collect();
        let mut tree = Self {
            html,
            handles: Vec::with_capacity(ids.len()),
            index: HashMap::with_capacity(ids.len()),
        };
        // Insert order starts at the root, which becomes DOCUMENT_NODE.
        for id in ids {
            tree.register(id);
        }
        tree
    }

    fn register(&mut self, id: TreeId) -> NodeId {
        let handle = NodeId(self.handles.len());
        self.handles.push(id);
        self.index.insert(id, handle);
        handle
    }

    fn handle(&self, id: TreeId) -> Option<NodeId> {
        self.index.get(&id).copied()
    }

    fn node(&self, node: NodeId) -> Option<NodeRef<'_, Node>> {
        let id = *self.handles.get(node.0)?;
        self.html.tree.get(id)
    }

    fn node_mut(&mut self, node: NodeId) -> Result<NodeMut<'_, Node>, DomError> {
        let id = *self.handles.get(node.0).ok_or(DomError::UnknownNode(node))?;
        self.html.tree.get_mut(id).ok_or(DomError::UnknownNode(node))
    }

    fn orphan(&mut self, value: Node) -> NodeId {
        let id = self.html.tree.orphan(value).id();
        self.register(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.len() <= 1
    }

    /// Create a detached element. Tag and attribute names are lower-cased.
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let name = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from(tag.to_ascii_lowercase().as_str()),
        );
        let attrs = attrs
            .iter()
            .map(|(name, value)| attribute(name, value))
            .collect();
        self.orphan(Node::Element(Element::new(name, attrs)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.orphan(Node::Text(Text {
            text: StrTendril::from_slice(text),
        }))
    }

    /// Parse `source` as a fragment and copy its nodes into this tree,
    /// detached. Returns the top-level nodes and the text of every `<style>`
    /// element, in document order.
    pub fn import_fragment(&mut self, source: &str) -> (Vec<NodeId>, Vec<String>) {
        let fragment = Html::parse_fragment(source);
        let mut top = Vec::new();
        let mut styles = Vec::new();

        let mut pending: Vec<(TreeId, Option<NodeId>)> = fragment
            .root_element()
            .children()
            .map(|child| (child.id(), None))
            .collect();
        pending.reverse();

        while let Some((source_id, parent)) = pending.pop() {
            let Some(source_node) = fragment.tree.get(source_id) else {
                continue;
            };
            if !matches!(source_node.value(), Node::Element(_) | Node::Text(_)) {
                continue;
            }
            if let Some(style) = ElementRef::wrap(source_node).filter(|el| el.value().name() == "style")
            {
                styles.push(style.text().collect());
            }

            let copy = self.orphan(source_node.value().clone());
            match parent {
                // Freshly created nodes cannot form a cycle.
                Some(parent) => {
                    let _ = self.append_child(parent, copy);
                }
                None => top.push(copy),
            }

            let children: Vec<TreeId> = source_node.children().map(|child| child.id()).collect();
            pending.extend(children.into_iter().rev().map(|child| (child, Some(copy))));
        }
        (top, styles)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|node| {
                node.children()
                    .filter_map(|child| self.handle(child.id()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?
            .parent()
            .and_then(|parent| self.handle(parent.id()))
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|parent| self.is_element(*parent))
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.node(node).map_or(false, |node| node.value().is_element())
    }

    pub fn element_ref(&self, node: NodeId) -> Option<ElementRef<'_>> {
        ElementRef::wrap(self.node(node)?)
    }

    pub fn local_name(&self, node: NodeId) -> Option<&str> {
        self.node(node)?.value().as_element().map(|el| el.name())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.node(node)?
            .value()
            .as_element()?
            .attr(&name.to_ascii_lowercase())
    }

    /// Text of a text node.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.node(node)?.value().as_text().map(|text| &**text)
    }

    /// Reachable from the document node.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let root = self.html.tree.root().id();
        match self.node(node) {
            Some(node) => node.id() == root || node.ancestors().any(|a| a.id() == root),
            None => false,
        }
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Detach `node` from its parent, if any.
    pub fn detach(&mut self, node: NodeId) -> Result<Option<NodeId>, DomError> {
        let parent = self.parent(node);
        self.node_mut(node)?.detach();
        Ok(parent)
    }

    /// Insert `child` under `parent` at `index` (clamped), detaching it first.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<(), DomError> {
        let parent_id = *self
            .handles
            .get(parent.0)
            .ok_or(DomError::UnknownNode(parent))?;
        let child_id = *self.handles.get(child.0).ok_or(DomError::UnknownNode(child))?;
        if self.text(parent).is_some() {
            return Err(DomError::NotElement(parent));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::Hierarchy(format!(
                "{child} cannot be inserted under its own descendant {parent}"
            )));
        }

        self.detach(child)?;
        let following = self.children(parent).get(index).copied();
        match following.and_then(|sibling| self.handles.get(sibling.0).copied()) {
            Some(sibling_id) => {
                if let Some(mut sibling) = self.html.tree.get_mut(sibling_id) {
                    sibling.insert_id_before(child_id);
                }
            }
            None => {
                if let Some(mut parent) = self.html.tree.get_mut(parent_id) {
                    parent.append_id(child_id);
                }
            }
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_child(parent, child, usize::MAX)
    }

    /// Position of `node` among its parent's children.
    pub fn index_in_parent(&self, node: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(node)?;
        let index = self.children(parent).iter().position(|c| *c == node)?;
        Some((parent, index))
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let name = name.to_ascii_lowercase();
        self.rewrite_attrs(node, |attrs| {
            match attrs.iter_mut().find(|(key, _)| *key == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => attrs.push((name.clone(), value.to_string())),
            }
            true
        })
        .map(|_| ())
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Result<bool, DomError> {
        self.rewrite_attrs(node, |attrs| {
            let before = attrs.len();
            attrs.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
            attrs.len() != before
        })
    }

    /// Rebuild an element's attributes. Elements cache their id and classes,
    /// so the element is replaced rather than edited in place.
    fn rewrite_attrs<F>(&mut self, node: NodeId, edit: F) -> Result<bool, DomError>
    where
        F: FnOnce(&mut Vec<(String, String)>) -> bool,
    {
        let mut target = self.node_mut(node)?;
        let Node::Element(element) = target.value() else {
            return Err(DomError::NotElement(node));
        };
        let mut attrs: Vec<(String, String)> = element
            .attrs()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        if !edit(&mut attrs) {
            return Ok(false);
        }
        let name = element.name.clone();
        let attrs = attrs
            .iter()
            .map(|(key, value)| attribute(key, value))
            .collect();
        *element = Element::new(name, attrs);
        Ok(true)
    }

    /// Nodes in document (pre-)order, starting at `root`.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        self.node(root)
            .map(|node| {
                node.descendants()
                    .filter_map(|d| self.handle(d.id()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Elements below `scope` matching `selector`, in document order.
    pub fn select(&self, scope: NodeId, selector: &Selector, limit: usize) -> Vec<NodeId> {
        let Some(scope) = self.node(scope) else {
            return Vec::new();
        };
        scope
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .filter(|element| selector.matches(element))
            .filter_map(|element| self.handle(element.id()))
            .take(limit)
            .collect()
    }

    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.element_ref(node)
            .map_or(false, |element| selector.matches(&element))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        let Some(node) = self.node(node) else {
            return String::new();
        };
        let mut text = String::new();
        for descendant in node.descendants() {
            if let Some(value) = descendant.value().as_text() {
                text.push_str(value);
            }
        }
        text
    }

    /// First element child with the given tag.
    pub fn child_element_by_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.children(parent)
            .into_iter()
            .find(|child| self.local_name(*child) == Some(tag))
    }

    /// Text of every `<style>` element under `root`, in document order.
    pub fn style_texts(&self, root: NodeId) -> Vec<String> {
        let Some(root) = self.node(root) else {
            return Vec::new();
        };
        root.descendants()
            .filter_map(ElementRef::wrap)
            .filter(|element| element.value().name() == "style")
            .map(|element| element.text().collect())
            .collect()
    }

    /// Serialise `node` and its subtree. The document node serialises the
    /// whole page.
    pub fn outer_html(&self, node: NodeId) -> String {
        let Some(target) = self.node(node) else {
            return String::new();
        };
        if target.id() == self.html.tree.root().id() {
            return self.html.html();
        }
        match target.value() {
            Node::Text(text) => text.to_string(),
            _ => ElementRef::wrap(target)
                .map(|element| element.html())
                .unwrap_or_default(),
        }
    }
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(
            None,
            Namespace::from(""),
            LocalName::from(name.to_ascii_lowercase().as_str()),
        ),
        value: AttrValue::from_slice(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> DomTree {
        DomTree::parse_document("")
    }

    #[test]
    fn test_parse_document_synthesises_body() {
        let tree = DomTree::parse_document("<style>.x{display:none}</style><p>hello</p>");
        let html = tree.child_element_by_tag(DOCUMENT_NODE, "html").unwrap();
        let body = tree.child_element_by_tag(html, "body").unwrap();
        assert_eq!(tree.text_content(body).trim(), "hello");
        assert_eq!(
            tree.style_texts(DOCUMENT_NODE),
            vec![".x{display:none}".to_string()]
        );
    }

    #[test]
    fn test_detached_nodes_are_not_connected() {
        let mut tree = blank();
        let body = tree.select(DOCUMENT_NODE, &Selector::parse("body").unwrap(), 1)[0];
        let div = tree.create_element("DIV", &[("ID", "x")]);
        assert!(!tree.is_connected(div));

        tree.append_child(body, div).unwrap();
        assert!(tree.is_connected(div));
        assert_eq!(tree.local_name(div), Some("div"));
        assert_eq!(tree.attr(div, "id"), Some("x"));

        assert_eq!(tree.detach(div).unwrap(), Some(body));
        assert!(!tree.is_connected(div));
        assert!(tree.children(body).is_empty());
    }

    #[test]
    fn test_insert_under_own_descendant_rejected() {
        let mut tree = blank();
        let outer = tree.create_element("div", &[]);
        let inner = tree.create_element("div", &[]);
        tree.append_child(outer, inner).unwrap();
        assert!(matches!(
            tree.append_child(inner, outer),
            Err(DomError::Hierarchy(_))
        ));
        assert!(matches!(
            tree.append_child(outer, outer),
            Err(DomError::Hierarchy(_))
        ));
    }

    #[test]
    fn test_insert_child_positions() {
        let mut tree = blank();
        let list = tree.create_element("ul", &[]);
        let first = tree.create_element("li", &[]);
        let last = tree.create_element("li", &[]);
        let middle = tree.create_element("li", &[]);
        tree.append_child(list, first).unwrap();
        tree.append_child(list, last).unwrap();
        tree.insert_child(list, middle, 1).unwrap();
        assert_eq!(tree.children(list), vec![first, middle, last]);
        assert_eq!(tree.index_in_parent(middle), Some((list, 1)));
    }

    #[test]
    fn test_attribute_rewrite_refreshes_classes() {
        let mut tree = blank();
        let div = tree.create_element("div", &[("class", "a"), ("id", "one")]);
        let by_class = Selector::parse(".b").unwrap();
        assert!(!tree.matches(div, &by_class));

        tree.set_attr(div, "Class", "b").unwrap();
        assert!(tree.matches(div, &by_class));
        assert_eq!(tree.outer_html(div), "<div class=\"b\" id=\"one\"></div>");

        assert!(tree.remove_attr(div, "class").unwrap());
        assert!(!tree.remove_attr(div, "class").unwrap());
        assert!(!tree.matches(div, &by_class));

        let text = tree.create_text("t");
        assert!(matches!(tree.set_attr(text, "id", "x"), Err(DomError::NotElement(_))));
    }

    #[test]
    fn test_fragment_is_detached() {
        let mut tree = blank();
        let (nodes, styles) =
            tree.import_fragment("<div class=\"w\"><style>.w{}</style>a</div>text");
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| !tree.is_connected(*n)));
        assert_eq!(tree.attr(nodes[0], "class"), Some("w"));
        assert_eq!(tree.text(nodes[1]), Some("text"));
        assert_eq!(styles, vec![".w{}".to_string()]);
        assert_eq!(
            tree.outer_html(nodes[0]),
            "<div class=\"w\"><style>.w{}</style>a</div>"
        );
    }

    #[test]
    fn test_deep_nesting_is_walked_without_recursion() {
        let depth = 20_000;
        let source = format!(
            "{}<span class=\"leaf\">deep</span>{}",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );
        let tree = DomTree::parse_document(&source);
        let leaf = tree.select(DOCUMENT_NODE, &Selector::parse(".leaf").unwrap(), 1)[0];
        assert!(tree.is_connected(leaf));
        assert_eq!(tree.text_content(DOCUMENT_NODE), "deep");
        assert!(tree.outer_html(DOCUMENT_NODE).len() > depth * "<div></div>".len());
    }
}
