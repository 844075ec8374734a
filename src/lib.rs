//! Ethoscan runtime
//!
//! Places a reputation widget on blockchain explorer pages. The anchor
//! engine lives in `ethoscan-anchor-locator`; this crate adds what sits
//! around it:
//! - [`navigation`]: site and address detection, navigation tracking
//! - [`injector`]: retry policy and widget rendering
//! - [`config`]: layered configuration

pub mod config;
pub mod errors;
pub mod injector;
pub mod navigation;

pub use config::{ConfigLoader, EthoscanConfig, ExplorerSettings};
pub use errors::{EthoscanError, Result};
pub use injector::{AnchorInjector, InjectionOutcome, MarkupRenderer, WidgetRenderer};
pub use navigation::{
    detect, AddressParseResult, NavigationEvent, NavigationMonitor, NavigationSession, UrlSource,
};
