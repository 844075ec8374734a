//! Built-in site profiles
//!
//! Lookups never fail: unknown or empty site ids get the default profile,
//! which has no candidates and sends resolution straight to the generic
//! stage.

use ethoscan_core_types::{InsertionStrategy, SiteId};
use ethoscan_page_dom::NodeView;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{NodePredicate, SelectorRule, SiteProfile, DEFAULT_MAX_RETRIES};

static HEX_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]{40}").expect("address regex is valid"));

/// Profile for `site`, or the default profile.
pub fn profile_for(site: &SiteId) -> SiteProfile {
    match site {
        SiteId::Etherscan => etherscan(),
        SiteId::Blockscout => blockscout(),
        SiteId::Debank => debank(),
        SiteId::Other(_) => default_profile(site.clone()),
    }
}

/// Profile for a raw site string.
pub fn lookup(site: &str) -> SiteProfile {
    profile_for(&SiteId::parse(site))
}

/// Every built-in profile, in a stable order.
pub fn builtin_profiles() -> Vec<SiteProfile> {
    SiteId::SUPPORTED.iter().map(profile_for).collect()
}

fn default_profile(site: SiteId) -> SiteProfile {
    SiteProfile::new(site).max_retries(DEFAULT_MAX_RETRIES)
}

fn etherscan() -> SiteProfile {
    SiteProfile::new(SiteId::Etherscan)
        .candidate(
            SelectorRule::new(".container.py-3", InsertionStrategy::After)
                .with_validator(validators::ADDRESS_HEADING),
        )
        .candidate(
            SelectorRule::new("section.container-xxl", InsertionStrategy::After)
                .with_validator(validators::MENTIONS_ADDRESS),
        )
        .candidate(SelectorRule::new(
            "#ContentPlaceHolder1_divSummary",
            InsertionStrategy::Prepend,
        ))
        .fallback("main#content")
        .max_retries(3)
}

fn blockscout() -> SiteProfile {
    SiteProfile::new(SiteId::Blockscout)
        .candidate(
            SelectorRule::new(".address-entity", InsertionStrategy::After)
                .with_validator(validators::MENTIONS_ADDRESS),
        )
        .candidate(
            SelectorRule::new(
                "a[href*=\"/name-services/domains/\"]",
                InsertionStrategy::After,
            )
            .with_validator(validators::DOMAIN_LINK),
        )
        .fallback("main")
        .wait_for_dynamic_content(true)
        .max_retries(5)
}

fn debank() -> SiteProfile {
    SiteProfile::new(SiteId::Debank)
        .candidate(
            SelectorRule::new("[class*=\"ProfileHeader\"]", InsertionStrategy::Append)
                .with_validator(validators::HAS_TEXT),
        )
        .candidate(SelectorRule::new(
            "[class*=\"UserInfo\"]",
            InsertionStrategy::After,
        ))
        .candidate(SelectorRule::new(
            "main > div:first-child",
            InsertionStrategy::Prepend,
        ))
        .fallback("main")
        .wait_for_dynamic_content(true)
        .max_retries(5)
}

/// Content checks attached to built-in rules
pub mod validators {
    use super::*;

    /// Candidate contains a heading that introduces an address or contract.
    pub const ADDRESS_HEADING: NodePredicate =
        NodePredicate::new("address_heading", address_heading);

    /// Candidate text contains a full hex address.
    pub const MENTIONS_ADDRESS: NodePredicate =
        NodePredicate::new("mentions_address", mentions_address);

    /// Candidate is a name-service link with visible text.
    pub const DOMAIN_LINK: NodePredicate = NodePredicate::new("domain_link", domain_link);

    /// Candidate has non-whitespace text.
    pub const HAS_TEXT: NodePredicate = NodePredicate::new("has_text", has_text);

    fn address_heading(node: &NodeView<'_>) -> bool {
        node.find("h1, h2")
            .map(|heading| heading.normalized_text())
            .map_or(false, |text| {
                text.starts_with("Address") || text.starts_with("Contract")
            })
    }

    fn mentions_address(node: &NodeView<'_>) -> bool {
        HEX_ADDRESS.is_match(&node.text())
    }

    fn domain_link(node: &NodeView<'_>) -> bool {
        node.attribute("href")
            .map_or(false, |href| href.contains("/name-services/domains/"))
            && has_text(node)
    }

    fn has_text(node: &NodeView<'_>) -> bool {
        !node.text().trim().is_empty()
    }
}
