//! Anchor resolution for explorer pages
//!
//! This crate decides where an injected widget should be mounted:
//! - Site profiles with ordered candidate selectors and optional validators
//! - Visibility validation of candidate nodes
//! - Mutation-driven waits for late-rendered content
//! - A fallback chain that ranks the result by confidence
//! - A structured decision trace for every pass

pub mod errors;
pub mod registry;
pub mod resolver;
pub mod trace;
pub mod types;
pub mod visibility;
pub mod waiting;

pub use errors::*;
pub use registry::{builtin_profiles, lookup, profile_for, validators};
pub use resolver::*;
pub use trace::*;
pub use types::*;
pub use visibility::*;
pub use waiting::*;
