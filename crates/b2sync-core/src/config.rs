//! Configuration module for b2sync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::modes::{CompareVersionMode, KeepOrDeleteMode, NewerFileSyncMode, UploadMode};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for b2sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub scan: ScanConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of worker threads running sync actions.
    pub max_workers: usize,
    /// Report what would be done without touching any file.
    pub dry_run: bool,
    /// Allow syncing from an empty local directory.
    pub allow_empty_source: bool,
    /// What to do when the destination is newer than the source.
    pub newer_file_mode: NewerFileSyncMode,
    /// Cleanup of destination files and versions.
    pub keep_mode: KeepOrDeleteMode,
    /// Retention in days for `KEEP_BEFORE_DELETE`.
    pub keep_days: Option<i64>,
    /// How source and destination versions are compared.
    pub compare_version_mode: CompareVersionMode,
    /// Tolerance for the comparison (milliseconds or bytes).
    pub compare_threshold: i64,
    /// Whole-file or incremental uploads.
    pub upload_mode: UploadMode,
    /// Smallest remote prefix worth reusing in an incremental upload (bytes).
    pub absolute_minimum_part_size: Option<u64>,
}

/// Scan filter settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories whose relative path matches any of these are skipped.
    pub exclude_dir_regexes: Vec<String>,
    /// Files whose relative path matches any of these are skipped.
    pub exclude_file_regexes: Vec<String>,
    /// Files matching any of these are kept despite an exclude match.
    pub include_file_regexes: Vec<String>,
    /// Skip every symbolic link in local scans.
    pub exclude_all_symlinks: bool,
    /// Skip files modified before this time (milliseconds).
    pub exclude_modified_before: Option<i64>,
    /// Skip files modified after this time (milliseconds).
    pub exclude_modified_after: Option<i64>,
    /// Skip remote versions uploaded before this time (milliseconds).
    pub exclude_uploaded_before: Option<i64>,
    /// Skip remote versions uploaded after this time (milliseconds).
    pub exclude_uploaded_after: Option<i64>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/b2sync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("b2sync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            dry_run: false,
            allow_empty_source: false,
            newer_file_mode: NewerFileSyncMode::default(),
            keep_mode: KeepOrDeleteMode::default(),
            keep_days: None,
            compare_version_mode: CompareVersionMode::default(),
            compare_threshold: 0,
            upload_mode: UploadMode::default(),
            absolute_minimum_part_size: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn check_regexes(errors: &mut Vec<ValidationError>, field: &str, patterns: &[String]) {
    for pattern in patterns {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError {
                field: field.into(),
                message: format!("invalid regex '{pattern}': {e}"),
            });
        }
    }
}

fn check_time_bound(errors: &mut Vec<ValidationError>, field: &str, value: Option<i64>) {
    if matches!(value, Some(v) if v < 0) {
        errors.push(ValidationError {
            field: field.into(),
            message: "must not be negative".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.max_workers == 0 {
            errors.push(ValidationError {
                field: "sync.max_workers".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.compare_threshold < 0 {
            errors.push(ValidationError {
                field: "sync.compare_threshold".into(),
                message: "must not be negative".into(),
            });
        }
        match (self.sync.keep_mode, self.sync.keep_days) {
            (KeepOrDeleteMode::KeepBeforeDelete, None) => {
                errors.push(ValidationError {
                    field: "sync.keep_days".into(),
                    message: "is required when keep_mode is KEEP_BEFORE_DELETE".into(),
                });
            }
            (_, Some(days)) if days <= 0 => {
                errors.push(ValidationError {
                    field: "sync.keep_days".into(),
                    message: "must be greater than 0".into(),
                });
            }
            _ => {}
        }
        if self.sync.absolute_minimum_part_size == Some(0) {
            errors.push(ValidationError {
                field: "sync.absolute_minimum_part_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- scan ---
        check_regexes(
            &mut errors,
            "scan.exclude_dir_regexes",
            &self.scan.exclude_dir_regexes,
        );
        check_regexes(
            &mut errors,
            "scan.exclude_file_regexes",
            &self.scan.exclude_file_regexes,
        );
        check_regexes(
            &mut errors,
            "scan.include_file_regexes",
            &self.scan.include_file_regexes,
        );
        if !self.scan.include_file_regexes.is_empty() && self.scan.exclude_file_regexes.is_empty()
        {
            errors.push(ValidationError {
                field: "scan.include_file_regexes".into(),
                message: "cannot be used without scan.exclude_file_regexes".into(),
            });
        }
        check_time_bound(
            &mut errors,
            "scan.exclude_modified_before",
            self.scan.exclude_modified_before,
        );
        check_time_bound(
            &mut errors,
            "scan.exclude_modified_after",
            self.scan.exclude_modified_after,
        );
        check_time_bound(
            &mut errors,
            "scan.exclude_uploaded_before",
            self.scan.exclude_uploaded_before,
        );
        check_time_bound(
            &mut errors,
            "scan.exclude_uploaded_after",
            self.scan.exclude_uploaded_after,
        );

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use b2sync_core::config::ConfigBuilder;
/// use b2sync_core::domain::KeepOrDeleteMode;
///
/// let config = ConfigBuilder::new()
///     .sync_max_workers(4)
///     .sync_keep_mode(KeepOrDeleteMode::Delete)
///     .scan_exclude_file_regex(r".*\.tmp")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_max_workers(mut self, n: usize) -> Self {
        self.config.sync.max_workers = n;
        self
    }

    pub fn sync_dry_run(mut self, dry_run: bool) -> Self {
        self.config.sync.dry_run = dry_run;
        self
    }

    pub fn sync_allow_empty_source(mut self, allow: bool) -> Self {
        self.config.sync.allow_empty_source = allow;
        self
    }

    pub fn sync_newer_file_mode(mut self, mode: NewerFileSyncMode) -> Self {
        self.config.sync.newer_file_mode = mode;
        self
    }

    pub fn sync_keep_mode(mut self, mode: KeepOrDeleteMode) -> Self {
        self.config.sync.keep_mode = mode;
        self
    }

    pub fn sync_keep_days(mut self, days: i64) -> Self {
        self.config.sync.keep_days = Some(days);
        self
    }

    pub fn sync_compare_version_mode(mut self, mode: CompareVersionMode) -> Self {
        self.config.sync.compare_version_mode = mode;
        self
    }

    pub fn sync_compare_threshold(mut self, threshold: i64) -> Self {
        self.config.sync.compare_threshold = threshold;
        self
    }

    pub fn sync_upload_mode(mut self, mode: UploadMode) -> Self {
        self.config.sync.upload_mode = mode;
        self
    }

    pub fn sync_absolute_minimum_part_size(mut self, bytes: u64) -> Self {
        self.config.sync.absolute_minimum_part_size = Some(bytes);
        self
    }

    // --- scan ---

    pub fn scan_exclude_dir_regex(mut self, pattern: impl Into<String>) -> Self {
        self.config.scan.exclude_dir_regexes.push(pattern.into());
        self
    }

    pub fn scan_exclude_file_regex(mut self, pattern: impl Into<String>) -> Self {
        self.config.scan.exclude_file_regexes.push(pattern.into());
        self
    }

    pub fn scan_include_file_regex(mut self, pattern: impl Into<String>) -> Self {
        self.config.scan.include_file_regexes.push(pattern.into());
        self
    }

    pub fn scan_exclude_all_symlinks(mut self, exclude: bool) -> Self {
        self.config.scan.exclude_all_symlinks = exclude;
        self
    }

    pub fn scan_exclude_modified_before(mut self, millis: i64) -> Self {
        self.config.scan.exclude_modified_before = Some(millis);
        self
    }

    pub fn scan_exclude_modified_after(mut self, millis: i64) -> Self {
        self.config.scan.exclude_modified_after = Some(millis);
        self
    }

    pub fn scan_exclude_uploaded_before(mut self, millis: i64) -> Self {
        self.config.scan.exclude_uploaded_before = Some(millis);
        self
    }

    pub fn scan_exclude_uploaded_after(mut self, millis: i64) -> Self {
        self.config.scan.exclude_uploaded_after = Some(millis);
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the [`Config`] without validation.
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the [`Config`] or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
