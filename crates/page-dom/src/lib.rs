//! Document seam for the Ethoscan anchor engine
//!
//! This crate provides:
//! - [`PageDom`]: the read-only page interface the anchor engine consumes
//! - [`PageDocument`]: a thread-safe document over `scraper`'s parsed tree,
//!   with renderer-side writes and mutation broadcasting
//! - Selector lookups that fail closed on malformed input
//! - A small computed-style and box model

pub mod document;
pub mod dom;
pub mod errors;
pub mod mutation;
pub mod query;
pub mod style;
pub mod tree;

pub use document::*;
pub use dom::*;
pub use errors::*;
pub use mutation::*;
pub use query::parse_selector;
pub use style::{StyleSheet, DEFAULT_VIEWPORT, LINE_HEIGHT};
