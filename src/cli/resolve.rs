use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use ethoscan_anchor_locator::{
    AnchorResolver, DefaultAnchorResolver, MutationWait, RecordingObserver, Resolution, TraceEvent,
};
use ethoscan_cli::config::EthoscanConfig;
use ethoscan_core_types::SiteId;
use serde::Serialize;

use super::output::{emit, OutputFormat};
use super::runtime::load_page;

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Site profile to use
    #[arg(long)]
    pub site: String,

    /// HTML page to resolve against
    #[arg(long, value_name = "FILE")]
    pub page: PathBuf,

    /// Override the dynamic wait timeout
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ResolveReport {
    site: SiteId,
    resolution: Resolution,
    /// CSS-like path of the anchor node
    path: Option<String>,
    trace: Vec<TraceEvent>,
}

pub async fn cmd_resolve(args: ResolveArgs, config: &EthoscanConfig, format: OutputFormat) -> Result<()> {
    let document = load_page(&args.page).await?;
    let site = SiteId::parse(&args.site);
    let timeout = args
        .timeout_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| config.wait_timeout());

    let observer = Arc::new(RecordingObserver::new());
    let resolver = DefaultAnchorResolver::new()
        .with_wait(Arc::new(MutationWait::new(timeout)))
        .with_observer(observer.clone());

    let resolution = resolver.resolve(&document, &site).await;
    let path = resolution.anchor().map(|anchor| document.path(anchor.node));
    let report = ResolveReport {
        site,
        resolution,
        path,
        trace: observer.take(),
    };
    emit(format, &report, describe)
}

fn describe(report: &ResolveReport) -> String {
    let mut out = String::new();
    match (&report.resolution, &report.path) {
        (Resolution::Found(anchor), Some(path)) => {
            let _ = writeln!(out, "anchor: {path}");
            let _ = writeln!(out, "strategy: {}", anchor.strategy);
            let _ = writeln!(out, "confidence: {}", anchor.confidence);
            let _ = writeln!(out, "selector: {}", anchor.selector);
        }
        _ => {
            let _ = writeln!(out, "no anchor point found for {}", report.site);
        }
    }
    let _ = writeln!(out, "trace:");
    for event in &report.trace {
        let _ = writeln!(
            out,
            "  {:<9} #{} {:<40} {:?}",
            event.stage.name(),
            event.index,
            event.selector,
            event.outcome
        );
    }
    out.trim_end().to_string()
}
