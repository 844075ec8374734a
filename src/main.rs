use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ethoscan_cli::EthoscanError;

mod cli;

use cli::runtime::{init_logging, load_config, log_loaded};
use cli::{
    cmd_detect, cmd_inject, cmd_profiles, cmd_resolve, DetectArgs, InjectArgs, LogFormat,
    OutputFormat, ProfilesArgs, ResolveArgs,
};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("ETHOSCAN_GIT_HASH"),
    " ",
    env!("ETHOSCAN_BUILD_DATE"),
    ")"
);

/// Ethoscan - reputation widget placement for blockchain explorers
#[derive(Parser)]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (defaults to the configured level)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List site profiles
    Profiles(ProfilesArgs),

    /// Detect the explorer and address of a page URL
    Detect(DetectArgs),

    /// Resolve an anchor point in an HTML page
    Resolve(ResolveArgs),

    /// Resolve an anchor and mount a widget into an HTML page
    Inject(InjectArgs),
}

/// Exit status for failures caused by bad input or configuration
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            let user_error = err
                .downcast_ref::<EthoscanError>()
                .is_some_and(EthoscanError::is_user_error);
            if user_error {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {

    let loaded = load_config(cli.config.as_ref())?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| loaded.config.log_level.clone());
    init_logging(&level, cli.debug, cli.log_format)?;
    log_loaded(&loaded);

    let config = loaded.config;
    match cli.command {
        Commands::Profiles(args) => cmd_profiles(args, &config, cli.output),
        Commands::Detect(args) => cmd_detect(args, cli.output),
        Commands::Resolve(args) => cmd_resolve(args, &config, cli.output).await,
        Commands::Inject(args) => cmd_inject(args, &config, cli.output).await,
    }
}
