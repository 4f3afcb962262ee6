//! b2sync CLI - Command-line interface for b2sync
//!
//! Provides commands for:
//! - Listing a local folder through the scan filters
//! - Viewing, validating and creating the configuration file

use std::path::PathBuf;

use anyhow::Result;
use b2sync_core::config::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{config::ConfigCommand, ls::LsCommand, GlobalArgs};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "b2sync", version, about = "Sync folders with cloud storage buckets")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the files a sync would pick up from a local folder
    Ls(LsCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// `-v` count wins over the configured level.
fn log_level(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(cli: &Cli, configured_level: &str) {
    let level = log_level(cli.verbose, configured_level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let configured = Config::load_or_default(&config_path);
    init_tracing(&cli, &configured.logging.level);

    let args = GlobalArgs {
        format: OutputFormat::from_flag(cli.json),
        quiet: cli.quiet,
        config_path,
    };

    let result = match &cli.command {
        Commands::Ls(cmd) => cmd.execute(&args),
        Commands::Config(cmd) => cmd.execute(&args),
    };
    if let Err(e) = &result {
        get_formatter(args.format, args.quiet).error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
