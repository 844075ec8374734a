//! Computed style and box geometry for the in-memory document
//!
//! The cascade is intentionally small: tag defaults, the `hidden` attribute,
//! `<style>` rules ordered by specificity then source order, and finally the
//! inline `style` attribute. Only `display`, `visibility`, `width` and
//! `height` are evaluated.

use std::collections::HashMap;

use ethoscan_core_types::{ComputedStyle, Display, NodeId, Rect, Visibility};
use tracing::debug;

use crate::query::RuleSelectors;
use crate::tree::DomTree;

/// Default viewport used for `html`/`body` and block-level content boxes.
pub const DEFAULT_VIEWPORT: (f64, f64) = (1280.0, 720.0);

/// Height of one rendered line of content.
pub const LINE_HEIGHT: f64 = 20.0;

const AVG_CHAR_WIDTH: f64 = 8.0;

const HIDDEN_TAGS: &[&str] = &[
    "head", "script", "style", "template", "meta", "link", "title", "noscript", "base",
];

const INLINE_TAGS: &[&str] = &[
    "a", "span", "strong", "em", "b", "i", "small", "code", "label", "abbr", "img", "svg",
    "button", "input", "select", "textarea",
];

const REPLACED_TAGS: &[&str] = &[
    "img", "svg", "input", "iframe", "canvas", "video", "button", "select", "textarea",
];

/// One `property: value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

/// Parse a declaration block (`display: none; width: 10px`).
pub fn parse_declarations(block: &str) -> Vec<Declaration> {
    block
        .split(';')
        .filter_map(|chunk| {
            let (property, value) = chunk.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value
                .trim()
                .trim_end_matches("!important")
                .trim()
                .to_ascii_lowercase();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some(Declaration { property, value })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct StyleRule {
    selectors: RuleSelectors,
    declarations: Vec<Declaration>,
    order: usize,
}

/// Ordered collection of style rules
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<StyleRule>,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Append the rules in `css`. At-rules and rules whose selectors do not
    /// parse are skipped.
    pub fn add_css(&mut self, css: &str) {
        let css = strip_comments(css);
        let mut rest = css.as_str();

        while let Some(open) = rest.find('{') {
            let prelude = rest[..open].trim();
            let Some((block, after)) = split_block(&rest[open + 1..]) else {
                debug!(prelude, "unterminated style block; ignoring remainder");
                break;
            };
            rest = after;

            if prelude.starts_with('@') {
                debug!(prelude, "skipping at-rule");
                continue;
            }
            match RuleSelectors::parse(prelude) {
                Ok(selectors) => {
                    let order = self.rules.len();
                    self.rules.push(StyleRule {
                        selectors,
                        declarations: parse_declarations(block),
                        order,
                    });
                }
                Err(err) => {
                    debug!(prelude, error = %err, "skipping rule with unsupported selector");
                }
            }
        }
    }

    /// Declarations that apply to `node`, in cascade order (last wins).
    fn matching_declarations<'a>(&'a self, tree: &DomTree, node: NodeId) -> Vec<&'a Declaration> {
        let Some(element) = tree.element_ref(node) else {
            return Vec::new();
        };
        let mut matched: Vec<(u32, usize, &StyleRule)> = self
            .rules
            .iter()
            .filter_map(|rule| {
                rule.selectors
                    .matching_specificity(&element)
                    .map(|spec| (spec, rule.order, rule))
            })
            .collect();
        matched.sort_by_key(|(spec, order, _)| (*spec, *order));
        matched
            .into_iter()
            .flat_map(|(_, _, rule)| rule.declarations.iter())
            .collect()
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Split `input` (just after an opening brace) at its matching closing brace.
fn split_block(input: &str) -> Option<(&str, &str)> {
    let mut depth = 1usize;
    for (idx, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&input[..idx], &input[idx + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Style and geometry resolution over a tree and its sheet
pub struct StyleResolver<'a> {
    tree: &'a DomTree,
    sheet: &'a StyleSheet,
    viewport: (f64, f64),
}

#[derive(Debug, Default)]
struct Cascaded {
    display: Option<String>,
    visibility: Option<String>,
    width: Option<String>,
    height: Option<String>,
}

impl Cascaded {
    fn apply(&mut self, decl: &Declaration) {
        let slot = match decl.property.as_str() {
            "display" => &mut self.display,
            "visibility" => &mut self.visibility,
            "width" => &mut self.width,
            "height" => &mut self.height,
            _ => return,
        };
        *slot = Some(decl.value.clone());
    }
}

impl<'a> StyleResolver<'a> {
    pub fn new(tree: &'a DomTree, sheet: &'a StyleSheet, viewport: (f64, f64)) -> Self {
        Self {
            tree,
            sheet,
            viewport,
        }
    }

    fn cascade(&self, node: NodeId, tag: &str) -> Cascaded {
        let mut cascaded = Cascaded::default();
        if HIDDEN_TAGS.contains(&tag) || self.tree.attr(node, "hidden").is_some() {
            cascaded.display = Some("none".to_string());
        }
        for decl in self.sheet.matching_declarations(self.tree, node) {
            cascaded.apply(decl);
        }
        if let Some(inline) = self.tree.attr(node, "style") {
            for decl in parse_declarations(inline) {
                cascaded.apply(&decl);
            }
        }
        cascaded
    }

    /// Computed style, or `None` for non-element nodes.
    pub fn computed_style(&self, node: NodeId) -> Option<ComputedStyle> {
        let tag = self.tree.local_name(node)?;
        let cascaded = self.cascade(node, tag);

        let display = match cascaded.display.as_deref() {
            Some(keyword) => Display::from_keyword(keyword),
            None if INLINE_TAGS.contains(&tag) => Display::Inline,
            None => Display::Block,
        };
        let visibility = match declared_visibility(&cascaded) {
            Some(visibility) => visibility,
            None => self.inherited_visibility(node),
        };

        Some(ComputedStyle {
            display,
            visibility,
        })
    }

    /// Visibility declared by the nearest ancestor that declares one.
    fn inherited_visibility(&self, node: NodeId) -> Visibility {
        let mut current = self.tree.parent_element(node);
        while let Some(id) = current {
            if let Some(tag) = self.tree.local_name(id) {
                if let Some(visibility) = declared_visibility(&self.cascade(id, tag)) {
                    return visibility;
                }
            }
            current = self.tree.parent_element(id);
        }
        Visibility::Visible
    }

    fn generates_no_box(&self, node: NodeId) -> bool {
        self.tree.local_name(node).map_or(false, |tag| {
            let cascaded = self.cascade(node, tag);
            cascaded.display.as_deref().map(Display::from_keyword) == Some(Display::None)
        })
    }

    /// Rendered box; all zeros when the node generates no box.
    pub fn bounding_box(&self, node: NodeId) -> Rect {
        if !self.tree.is_connected(node) || self.tree.local_name(node).is_none() {
            return Rect::default();
        }

        // Anything inside a display:none subtree has no box.
        let mut current = Some(node);
        while let Some(id) = current {
            if self.generates_no_box(id) {
                return Rect::default();
            }
            current = self.tree.parent_element(id);
        }

        self.measure(node)
    }

    /// Boxes of `root` and its element descendants, computed bottom-up with
    /// an explicit stack.
    fn measure(&self, root: NodeId) -> Rect {
        let mut boxes: HashMap<NodeId, Rect> = HashMap::new();
        let mut open: HashMap<NodeId, Cascaded> = HashMap::new();
        let mut stack = vec![(root, false)];

        while let Some((node, children_done)) = stack.pop() {
            let Some(tag) = self.tree.local_name(node) else {
                continue;
            };

            if children_done {
                let cascaded = open.remove(&node).unwrap_or_default();
                let content = self.content_width(node, &boxes);
                boxes.insert(node, self.element_box(tag, &cascaded, content));
                continue;
            }

            let cascaded = self.cascade(node, tag);
            match cascaded.display.as_deref().map(Display::from_keyword) {
                Some(Display::None) | Some(Display::Contents) => {
                    boxes.insert(node, Rect::default());
                }
                _ if matches!(tag, "html" | "body") || REPLACED_TAGS.contains(&tag) => {
                    let content = Some(LINE_HEIGHT);
                    boxes.insert(node, self.element_box(tag, &cascaded, content));
                }
                _ => {
                    stack.push((node, true));
                    for child in self.tree.children(node).into_iter().rev() {
                        if self.tree.is_element(child) {
                            stack.push((child, false));
                        }
                    }
                    open.insert(node, cascaded);
                }
            }
        }

        boxes.remove(&root).unwrap_or_default()
    }

    fn element_box(&self, tag: &str, cascaded: &Cascaded, content_width: Option<f64>) -> Rect {
        let explicit_width = cascaded.width.as_deref().and_then(parse_length);
        let explicit_height = cascaded.height.as_deref().and_then(parse_length);

        if matches!(tag, "html" | "body") {
            return Rect::new(
                0.0,
                0.0,
                explicit_width.unwrap_or(self.viewport.0),
                explicit_height.unwrap_or(self.viewport.1),
            );
        }

        let inline = INLINE_TAGS.contains(&tag)
            && cascaded
                .display
                .as_deref()
                .map_or(true, |d| d.starts_with("inline"));

        let width = explicit_width.unwrap_or(match content_width {
            Some(_) if !inline => self.viewport.0,
            Some(measured) => measured,
            None => 0.0,
        });
        let height = explicit_height.unwrap_or(if content_width.is_some() {
            LINE_HEIGHT
        } else {
            0.0
        });

        Rect::new(0.0, 0.0, width, height)
    }

    /// Estimated inline width of rendered content, `None` when empty.
    /// Element children must already be measured.
    fn content_width(&self, node: NodeId, boxes: &HashMap<NodeId, Rect>) -> Option<f64> {
        let mut width = 0.0;
        let mut rendered = false;
        for child in self.tree.children(node) {
            if let Some(text) = self.tree.text(child) {
                let chars = text.trim().chars().count();
                if chars > 0 {
                    rendered = true;
                    width += chars as f64 * AVG_CHAR_WIDTH;
                }
            } else if let Some(child_box) = boxes.get(&child).filter(|b| b.has_area()) {
                rendered = true;
                width += child_box.width;
            }
        }
        rendered.then_some(width)
    }
}

fn declared_visibility(cascaded: &Cascaded) -> Option<Visibility> {
    cascaded
        .visibility
        .as_deref()
        .and_then(Visibility::from_keyword)
}

/// Parse `12px`, `12` or `0` into pixels. Percentages and other units are
/// ignored.
fn parse_length(value: &str) -> Option<f64> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    number.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0)
}
