use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use ethoscan_cli::config::{ConfigLoader, EthoscanConfig};
use ethoscan_page_dom::PageDocument;
use tokio::fs;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Install the global subscriber. `RUST_LOG` wins over `level`; logs go to
/// stderr so command output stays machine-readable.
pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: EthoscanConfig,
    pub path: Option<PathBuf>,
}

/// Locate and load configuration.
///
/// Priority: `--config` (must exist) > ./config/ethoscan.toml >
/// ~/.config/ethoscan/ethoscan.toml; environment overrides apply on top.
pub fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let (path, required) = match config_path {
        Some(path) => (Some(path.clone()), true),
        None => {
            let local = PathBuf::from("config/ethoscan.toml");
            if local.exists() {
                (Some(local), false)
            } else {
                let user = dirs::config_dir().map(|dir| dir.join("ethoscan").join("ethoscan.toml"));
                (user.filter(|path| path.exists()), false)
            }
        }
    };

    let mut loader = ConfigLoader::new();
    if let Some(path) = &path {
        loader = loader.with_file(path, required);
    }
    let config = loader.load().with_context(|| match &path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config".to_string(),
    })?;

    Ok(LoadedConfig { config, path })
}

/// Read an HTML file into a live document.
pub async fn load_page(path: &Path) -> Result<PageDocument> {
    let source = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read page {}", path.display()))?;
    let document = PageDocument::from_html(&source);
    debug!(path = %path.display(), bytes = source.len(), "Loaded page");
    Ok(document)
}

pub fn log_loaded(loaded: &LoadedConfig) {
    match &loaded.path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
}
