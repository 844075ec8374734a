use std::fmt::Write as _;

use anyhow::Result;
use clap::Args;
use ethoscan_anchor_locator::{builtin_profiles, profile_for, SiteProfile};
use ethoscan_cli::config::EthoscanConfig;
use ethoscan_core_types::SiteId;

use super::output::{emit, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct ProfilesArgs {
    /// Show a single site (unknown names show the default profile)
    #[arg(value_name = "SITE")]
    pub site: Option<String>,
}

pub fn cmd_profiles(args: ProfilesArgs, config: &EthoscanConfig, format: OutputFormat) -> Result<()> {
    let profiles = match args.site.as_deref() {
        Some(site) => vec![profile_for(&SiteId::parse(site))],
        None => builtin_profiles(),
    };
    emit(format, &profiles, |profiles| {
        profiles
            .iter()
            .map(|profile| describe_profile(profile, config))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn describe_profile(profile: &SiteProfile, config: &EthoscanConfig) -> String {
    let mut out = String::new();
    let enabled = if config.explorers.is_enabled(&profile.site) {
        "enabled"
    } else {
        "disabled"
    };
    let _ = writeln!(out, "{} ({})", profile.site, enabled);
    let _ = writeln!(
        out,
        "  wait for dynamic content: {}",
        if profile.wait_for_dynamic_content { "yes" } else { "no" }
    );
    let _ = writeln!(out, "  max retries: {}", profile.max_retries);
    if profile.candidates.is_empty() {
        let _ = writeln!(out, "  candidates: (none)");
    } else {
        let _ = writeln!(out, "  candidates:");
        for (index, rule) in profile.candidates.iter().enumerate() {
            let _ = write!(out, "    {}. {} -> {}", index + 1, rule.query, rule.strategy);
            if let Some(validator) = &rule.validator {
                let _ = write!(out, " [{}]", validator.name());
            }
            out.push('\n');
        }
    }
    let _ = writeln!(
        out,
        "  fallback: {}",
        profile.fallback_selector.as_deref().unwrap_or("(none)")
    );
    out
}
