//! Navigation tracking for explorer pages
//!
//! Explorer front-ends are single-page apps: the address on screen changes
//! without a page load. [`NavigationSession`] remembers the last address it
//! handed out so a navigation is processed once, and lets consumers drop
//! results that belong to an address the user has already left.
//! [`NavigationMonitor`] drives a session from a polled URL.

use std::sync::Arc;
use std::time::Duration;

use ethoscan_core_types::SiteId;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::Result;

static ADDRESS_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(?:address|profile)/(0x[0-9a-fA-F]{40})(?:/|$)").expect("address path regex is valid")
});

/// Etherscan-operated explorers for other chains
const ETHERSCAN_FAMILY: &[&str] = &[
    "etherscan.io",
    "basescan.org",
    "arbiscan.io",
    "polygonscan.com",
    "bscscan.com",
];

/// What a page URL says about the address on screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressParseResult {
    /// Lower-cased `0x` address
    pub address: Option<String>,
    pub site: Option<SiteId>,
    pub is_valid: bool,
}

impl AddressParseResult {
    fn invalid(site: Option<SiteId>) -> Self {
        Self {
            address: None,
            site,
            is_valid: false,
        }
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map_or(false, |prefix| prefix.ends_with('.'))
}

/// Map a host name to the explorer it belongs to.
pub fn site_for_host(host: &str) -> Option<SiteId> {
    let host = host.to_ascii_lowercase();
    if ETHERSCAN_FAMILY.iter().any(|domain| host_matches(&host, domain)) {
        Some(SiteId::Etherscan)
    } else if host.contains("blockscout") {
        Some(SiteId::Blockscout)
    } else if host_matches(&host, "debank.com") {
        Some(SiteId::Debank)
    } else {
        None
    }
}

/// Detect the explorer and address of `page_url`.
///
/// Unparsable URLs are an error; a parsable URL without a recognisable
/// site or address yields an invalid result.
pub fn detect(page_url: &str) -> Result<AddressParseResult> {
    let url = Url::parse(page_url)?;
    let Some(site) = url.host_str().and_then(site_for_host) else {
        return Ok(AddressParseResult::invalid(None));
    };

    let address = ADDRESS_PATH
        .captures(url.path())
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_ascii_lowercase());

    Ok(match address {
        Some(address) => AddressParseResult {
            address: Some(address),
            site: Some(site),
            is_valid: true,
        },
        None => AddressParseResult::invalid(Some(site)),
    })
}

/// A navigation to a new address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationEvent {
    pub url: String,
    pub address: String,
    pub site: SiteId,
}

/// Last-seen address of one page
#[derive(Debug, Default)]
pub struct NavigationSession {
    last_address: Option<String>,
}

pub type SharedSession = Arc<Mutex<NavigationSession>>;

impl NavigationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Record a visit to `page_url`. Returns an event only when the address
    /// differs from the previous one.
    pub fn observe(&mut self, page_url: &str) -> Option<NavigationEvent> {
        let result = match detect(page_url) {
            Ok(result) => result,
            Err(err) => {
                debug!(url = page_url, error = %err, "Ignoring unparsable url");
                return None;
            }
        };

        let (Some(address), Some(site), true) = (result.address, result.site, result.is_valid) else {
            // Leaving an address page re-arms the same address.
            self.last_address = None;
            return None;
        };

        if self.last_address.as_deref() == Some(address.as_str()) {
            return None;
        }
        self.last_address = Some(address.clone());
        Some(NavigationEvent {
            url: page_url.to_string(),
            address,
            site,
        })
    }

    /// Whether `address` is still the one on screen.
    pub fn is_current(&self, address: &str) -> bool {
        self.last_address
            .as_deref()
            .map_or(false, |current| current.eq_ignore_ascii_case(address))
    }

    pub fn last_address(&self) -> Option<&str> {
        self.last_address.as_deref()
    }
}

/// Where the monitor reads the page URL from
pub trait UrlSource: Send + Sync {
    fn current_url(&self) -> Option<String>;
}

/// In-memory URL, updated by whoever drives navigation
#[derive(Debug, Default)]
pub struct StaticUrl(Mutex<Option<String>>);

impl StaticUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(Mutex::new(Some(url.into())))
    }

    pub fn set(&self, url: impl Into<String>) {
        *self.0.lock() = Some(url.into());
    }
}

impl UrlSource for StaticUrl {
    fn current_url(&self) -> Option<String> {
        self.0.lock().clone()
    }
}

/// Background task polling a [`UrlSource`] for navigations
pub struct NavigationMonitor {
    session: SharedSession,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl NavigationMonitor {
    /// Start polling every `interval`. The task stops when `cancel` fires,
    /// when [`shutdown`](Self::shutdown) is called, or when the receiver is
    /// dropped.
    pub fn spawn(
        source: Arc<dyn UrlSource>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<NavigationEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let session = NavigationSession::shared();
        let task_session = Arc::clone(&session);
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(url) = source.current_url() else {
                            continue;
                        };
                        let event = task_session.lock().observe(&url);
                        if let Some(event) = event {
                            info!(site = %event.site, address = %event.address, "Navigation detected");
                            // A full channel must not hold up cancellation.
                            tokio::select! {
                                _ = task_cancel.cancelled() => break,
                                sent = tx.send(event) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            debug!("Navigation monitor stopped");
        });

        (
            Self {
                session,
                cancel,
                handle,
            },
            rx,
        )
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    pub fn is_current(&self, address: &str) -> bool {
        self.session.lock().is_current(address)
    }

    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Navigation monitor task failed");
        }
    }
}
