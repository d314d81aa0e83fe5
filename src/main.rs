//! scrcpy-deck - mirror, screenshot and record Android devices through scrcpy
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use deck_app::config::{default_config_path, load_settings, Settings};

/// scrcpy-deck - mirror, screenshot and record Android devices through scrcpy
#[derive(Parser, Debug)]
#[command(name = "scrcpy-deck", version)]
#[command(about = "Mirror, screenshot and record Android devices through scrcpy", long_about = None)]
struct Args {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Watch devices and accept commands on stdin, printing NDJSON events (default)
    Run,
    /// List connected devices as JSON and exit
    Devices,
    /// Check that adb and scrcpy are installed
    Check,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    deck_core::logging::init()?;

    let config_path = args.config.or_else(default_config_path);
    let settings = match &config_path {
        Some(path) => load_settings(path),
        None => Settings::default(),
    };

    let result = match args.command.unwrap_or(Command::Run) {
        Command::Run => scrcpy_deck::run_headless(settings, config_path)
            .await
            .map_err(Into::into),
        Command::Devices => print_devices(&settings).await,
        Command::Check => check(&settings),
    };

    if let Err(ref e) = result {
        error!("Application error: {:?}", e);
    }
    info!("scrcpy-deck exiting");
    result
}

async fn print_devices(settings: &Settings) -> color_eyre::Result<()> {
    let report = scrcpy_deck::commands::device_report(settings).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check(settings: &Settings) -> color_eyre::Result<()> {
    let (status, lines) = scrcpy_deck::commands::check_tools(settings);
    for line in lines {
        println!("{}", line);
    }

    match status.error_message() {
        Some(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
        None => {
            println!("Setup OK");
            Ok(())
        }
    }
}
