use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use ethoscan_cli::config::EthoscanConfig;
use ethoscan_cli::injector::{AnchorInjector, InjectionOutcome, MarkupRenderer};
use ethoscan_cli::navigation::{detect, AddressParseResult, NavigationSession};
use serde::Serialize;
use tracing::info;

use super::output::{emit, OutputFormat};
use super::runtime::load_page;

#[derive(Args, Debug, Clone)]
pub struct InjectArgs {
    /// Explorer page URL the HTML was captured from
    #[arg(long)]
    pub url: String,

    /// HTML page to inject into
    #[arg(long, value_name = "FILE")]
    pub page: PathBuf,
}

#[derive(Debug, Serialize)]
struct InjectReport {
    detection: AddressParseResult,
    outcome: InjectionOutcome,
    html: String,
}

pub async fn cmd_inject(args: InjectArgs, config: &EthoscanConfig, format: OutputFormat) -> Result<()> {
    let detection = detect(&args.url)?;
    if !detection.is_valid {
        bail!("No explorer address found in {}", args.url);
    }

    let session = NavigationSession::shared();
    let Some(event) = session.lock().observe(&args.url) else {
        bail!("No explorer address found in {}", args.url);
    };

    let document = Arc::new(load_page(&args.page).await?);
    let renderer = Arc::new(MarkupRenderer::new(Arc::clone(&document)));
    let injector = AnchorInjector::from_config(config, renderer);

    let outcome = injector.inject(document.as_ref(), &event, &session).await?;
    info!(address = %event.address, ?outcome, "Injection finished");

    let report = InjectReport {
        detection,
        outcome,
        html: document.to_html(),
    };
    emit(format, &report, |report| report.html.clone())
}
