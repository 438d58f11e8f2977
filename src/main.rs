//! sidecar - acquire, configure and supervise companion applications
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sidecar::host::{self, Host};
use sidecar_app::config::default_config_dir;
use sidecar_core::{logging, RuntimeArguments};

/// sidecar - acquire, configure and supervise companion applications
#[derive(Parser, Debug)]
#[command(name = "sidecar")]
#[command(about = "Acquire, configure and supervise companion applications", long_about = None)]
struct Args {
    /// Directory holding settings.toml and apps.toml
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured apps and their state
    List,

    /// Print the composed command-line arguments of an app
    Args {
        app: String,

        /// Runtime override, applied before validation
        #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_pair)]
        overrides: Vec<(String, String)>,
    },

    /// Run an app (acquiring it first if needed) until it exits or Ctrl+C
    Run {
        app: String,

        /// Runtime override, applied before validation
        #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_pair)]
        overrides: Vec<(String, String)>,
    },

    /// Download and install an app if its artifact changed
    Install { app: String },

    /// Close an app, including instances started elsewhere
    Close { app: String },
}

fn parse_pair(pair: &str) -> Result<(String, String), String> {
    RuntimeArguments::parse_pair(pair).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // Logs go to a file; stdout carries NDJSON events.
    logging::init()?;

    let config_dir = args.config_dir.unwrap_or_else(default_config_dir);
    tracing::info!("Using config dir {}", config_dir.display());
    let host = Host::load(&config_dir)?;

    match args.command {
        Command::List => host::list(&host)?,
        Command::Args { app, overrides } => {
            host::arguments(&host, &app, &overrides.into_iter().collect())?
        }
        Command::Run { app, overrides } => {
            host::run(&host, &app, overrides.into_iter().collect()).await?
        }
        Command::Install { app } => host::install(&host, &app, RuntimeArguments::new()).await?,
        Command::Close { app } => host::close(&host, &app).await?,
    }

    Ok(())
}
