//! Config command - View and manage the b2sync configuration
//!
//! Provides the `b2sync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors
//! 3. Writes a default configuration file

use std::path::Path;

use anyhow::{bail, Context, Result};
use b2sync_core::config::Config;
use clap::Subcommand;
use tracing::info;

use super::GlobalArgs;
use crate::output::get_formatter;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(&self, args: &GlobalArgs) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(args),
            ConfigCommand::Validate => execute_validate(args),
            ConfigCommand::Init { force } => execute_init(args, *force),
        }
    }
}

fn execute_show(args: &GlobalArgs) -> Result<()> {
    let formatter = get_formatter(args.format, args.quiet);
    let config_path = &args.config_path;
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if args.format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_validate(args: &GlobalArgs) -> Result<()> {
    let formatter = get_formatter(args.format, args.quiet);
    let config_path = &args.config_path;

    let config = match Config::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            let message = if config_path.exists() {
                format!("Failed to parse configuration: {e}")
            } else {
                "Configuration file not found. Using defaults.".to_string()
            };
            if args.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [message],
                }));
            } else {
                formatter.error(&message);
                formatter.info(&format!("File: {}", config_path.display()));
                formatter.info("Run 'b2sync config init' to create one.");
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");

    let errors = config.validate();

    if args.format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn execute_init(args: &GlobalArgs, force: bool) -> Result<()> {
    let formatter = get_formatter(args.format, args.quiet);
    write_default_config(&args.config_path, force)?;

    info!(config_path = %args.config_path.display(), "Wrote default configuration");

    if args.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "config_path": args.config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!(
            "Wrote default configuration to {}",
            args.config_path.display()
        ));
    }
    Ok(())
}

/// Writes [`Config::default`] as YAML, creating parent directories.
fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; use --force to overwrite it",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml =
        serde_yaml::to_string(&Config::default()).context("Failed to serialize configuration")?;
    std::fs::write(path, yaml).context("Failed to write configuration file")?;
    Ok(())
}
