//! Visibility validation for anchor candidates
//!
//! A node is a usable anchor only when it is attached, rendered, occupies a
//! non-empty box and no element above it hides it. Checks run cheapest
//! first and stop at the first failure.

use ethoscan_core_types::{Display, NodeId, Visibility};
use ethoscan_page_dom::PageDom;
use thiserror::Error;

/// Why a node was refused as an anchor
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityIssue {
    #[error("node is not attached to the document")]
    Detached,

    #[error("node is not an element")]
    NotElement,

    #[error("node has display:none")]
    DisplayNone,

    #[error("node has visibility:hidden")]
    Hidden,

    #[error("node has an empty bounding box")]
    ZeroArea,

    #[error("ancestor {0} is not rendered")]
    HiddenAncestor(NodeId),
}

/// Check `node` and report the first reason it cannot serve as an anchor.
pub fn check_anchor_point(dom: &dyn PageDom, node: NodeId) -> Result<(), VisibilityIssue> {
    if !dom.is_connected(node) {
        return Err(VisibilityIssue::Detached);
    }

    let style = dom
        .computed_style(node)
        .ok_or(VisibilityIssue::NotElement)?;
    if style.display == Display::None {
        return Err(VisibilityIssue::DisplayNone);
    }
    if style.visibility == Visibility::Hidden {
        return Err(VisibilityIssue::Hidden);
    }

    if !dom.bounding_box(node).has_area() {
        return Err(VisibilityIssue::ZeroArea);
    }

    let mut current = dom.parent_element(node);
    while let Some(ancestor) = current {
        let rendered = dom
            .computed_style(ancestor)
            .map_or(false, |style| style.is_rendered());
        if !rendered {
            return Err(VisibilityIssue::HiddenAncestor(ancestor));
        }
        current = dom.parent_element(ancestor);
    }

    Ok(())
}

/// Whether `node` can host an injected widget.
pub fn validate_anchor_point(dom: &dyn PageDom, node: NodeId) -> bool {
    check_anchor_point(dom, node).is_ok()
}
