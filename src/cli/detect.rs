use anyhow::Result;
use clap::Args;
use ethoscan_cli::navigation::{detect, AddressParseResult};

use super::output::{emit, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    /// Explorer page URL
    #[arg(value_name = "URL")]
    pub url: String,
}

pub fn cmd_detect(args: DetectArgs, format: OutputFormat) -> Result<()> {
    let result = detect(&args.url)?;
    emit(format, &result, describe)
}

fn describe(result: &AddressParseResult) -> String {
    let site = result
        .site
        .as_ref()
        .map_or_else(|| "unsupported".to_string(), |site| site.to_string());
    match (&result.address, result.is_valid) {
        (Some(address), true) => format!("{site}: {address}"),
        _ => format!("{site}: no address on this page"),
    }
}
