//! Ls command - List a local folder the way a sync would see it
//!
//! Provides the `b2sync ls` CLI command which:
//! 1. Merges the configured scan filters with the command-line filters
//! 2. Scans the folder lazily in remote-name order
//! 3. Prints one line per file, then any scan warnings

use anyhow::{bail, Context, Result};
use b2sync_core::config::{Config, ScanConfig};
use b2sync_core::domain::{LocalPath, ScanPath};
use b2sync_engine::report::{ProgressReport, ScanReporter};
use b2sync_engine::scan::{FolderUri, LocalFolder, ScanPolicy};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use tracing::{debug, info};

use super::GlobalArgs;
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct LsCommand {
    /// Local folder to list
    pub folder: String,

    /// Skip directories whose relative path matches (repeatable)
    #[arg(long = "exclude-dir", value_name = "REGEX")]
    pub exclude_dir: Vec<String>,

    /// Skip files whose relative path matches (repeatable)
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Keep excluded files whose relative path matches (repeatable)
    #[arg(long = "include", value_name = "REGEX")]
    pub include: Vec<String>,

    /// Do not follow or list symlinks
    #[arg(long)]
    pub exclude_symlinks: bool,
}

impl LsCommand {
    /// Configured filters with this command's filters appended
    fn scan_config(&self, base: &ScanConfig) -> ScanConfig {
        let mut scan = base.clone();
        scan.exclude_dir_regexes.extend(self.exclude_dir.iter().cloned());
        scan.exclude_file_regexes.extend(self.exclude.iter().cloned());
        scan.include_file_regexes.extend(self.include.iter().cloned());
        scan.exclude_all_symlinks |= self.exclude_symlinks;
        scan
    }

    pub fn execute(&self, args: &GlobalArgs) -> Result<()> {
        let formatter = get_formatter(args.format, args.quiet);

        if FolderUri::parse(&self.folder)?.is_remote() {
            bail!(
                "{}: only local folders can be listed; no remote transport is configured",
                self.folder
            );
        }

        let config = Config::load_or_default(&args.config_path);
        let policy = ScanPolicy::from_config(&self.scan_config(&config.scan))
            .context("Invalid scan filter")?;
        let folder = LocalFolder::new(&self.folder)?;
        if !folder.root().is_dir() {
            bail!("{} is not a directory", folder.root().display());
        }

        info!(folder = %folder.root().display(), "Listing folder");

        // Warnings go through the formatter once the scan ends
        let report = ProgressReport::new(Box::new(std::io::sink()), true);

        let mut entries = Vec::new();
        for path in folder.all_files(Some(&report), &policy) {
            if let ScanPath::Local(local) = path? {
                report.update_count(1);
                entries.push(local);
            }
        }
        report.end_total();
        report.close();
        debug!(count = entries.len(), "Scan finished");

        if args.format.is_json() {
            let json = serde_json::json!({
                "folder": folder.root().display().to_string(),
                "files": entries.iter().map(entry_json).collect::<Vec<_>>(),
                "warnings": report.warnings(),
            });
            formatter.print_json(&json);
        } else {
            for entry in &entries {
                formatter.line(&format_entry(entry));
            }
            for warning in report.warnings() {
                formatter.warn(&warning);
            }
        }
        Ok(())
    }
}

fn format_mod_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

fn format_entry(entry: &LocalPath) -> String {
    format!(
        "{:<40} {:>12}  {}",
        entry.relative_path,
        entry.size,
        format_mod_time(entry.mod_time)
    )
}

fn entry_json(entry: &LocalPath) -> serde_json::Value {
    serde_json::json!({
        "path": entry.relative_path,
        "size": entry.size,
        "mod_time": format_mod_time(entry.mod_time),
        "mod_time_millis": entry.mod_time,
    })
}
