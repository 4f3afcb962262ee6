//! Scan policy
//!
//! Decides which directories, files and remote versions a scan yields.
//! Patterns are matched against the start of the `/`-separated relative
//! path, so `photos` matches both `photos` and `photos2`.
//!
//! Precedence for a file path:
//! 1. a directory holding it matches the exclude-directory set: excluded
//! 2. it matches an include regex: included
//! 3. it matches an exclude regex: excluded
//! 4. otherwise included

use b2sync_core::config::ScanConfig;
use b2sync_core::domain::{FileVersion, LocalPath};
use regex::Regex;

use crate::{Result, SyncError};

// ============================================================================
// RegexSet
// ============================================================================

/// A possibly empty set of prefix-anchored regexes
#[derive(Debug, Clone, Default)]
struct RegexSet {
    compiled: Vec<Regex>,
}

impl RegexSet {
    fn new<I, S>(patterns: I) -> std::result::Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compiled = patterns
            .into_iter()
            .map(|p| Regex::new(&format!("^(?:{})", p.as_ref())))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { compiled })
    }

    fn matches(&self, s: &str) -> bool {
        self.compiled.iter().any(|r| r.is_match(s))
    }
}

/// Turns a directory regex into one matching files under such a directory.
///
/// `photos` becomes `photos.*?/` (files under `photos/` and `photos2/`),
/// while `photos$` becomes `photos/` (only files under `photos/`).
pub fn dir_regex_to_file_prefix_regex(dir_regex: &str) -> String {
    match dir_regex.strip_suffix('$') {
        Some(stripped) => format!("{stripped}/"),
        None => format!("{dir_regex}.*?/"),
    }
}

// ============================================================================
// IntegerRange
// ============================================================================

/// Inclusive range; a missing bound is unbounded on that side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IntegerRange {
    begin: Option<i64>,
    end: Option<i64>,
}

impl IntegerRange {
    fn new(begin: Option<i64>, end: Option<i64>, parameter: &str) -> Result<Self> {
        if matches!(begin, Some(b) if b < 0) {
            return Err(SyncError::invalid_argument(
                parameter,
                "begin time can not be less than 0, use None for the infinity",
            ));
        }
        if matches!(end, Some(e) if e < 0) {
            return Err(SyncError::invalid_argument(
                parameter,
                "end time can not be less than 0, use None for the infinity",
            ));
        }
        Ok(Self { begin, end })
    }

    fn contains(&self, value: i64) -> bool {
        self.begin.map_or(true, |b| value >= b) && self.end.map_or(true, |e| value <= e)
    }
}

// ============================================================================
// ScanPolicy
// ============================================================================

/// Raw filter settings, validated by [`ScanPolicy::new`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPolicyOptions {
    pub exclude_dir_regexes: Vec<String>,
    pub exclude_file_regexes: Vec<String>,
    pub include_file_regexes: Vec<String>,
    pub exclude_all_symlinks: bool,
    /// Files modified before this time (ms) are skipped
    pub exclude_modified_before: Option<i64>,
    /// Files modified after this time (ms) are skipped
    pub exclude_modified_after: Option<i64>,
    /// Remote versions uploaded before this time (ms) are skipped
    pub exclude_uploaded_before: Option<i64>,
    /// Remote versions uploaded after this time (ms) are skipped
    pub exclude_uploaded_after: Option<i64>,
}

/// Immutable, compiled scan filter
///
/// `ScanPolicy::default()` excludes nothing.
#[derive(Debug, Clone, Default)]
pub struct ScanPolicy {
    exclude_dir_set: RegexSet,
    exclude_file_because_of_dir_set: RegexSet,
    exclude_file_set: RegexSet,
    include_file_set: RegexSet,
    exclude_all_symlinks: bool,
    include_mod_time_range: IntegerRange,
    include_upload_time_range: IntegerRange,
}

impl ScanPolicy {
    /// Compile and validate filter settings.
    ///
    /// # Errors
    /// [`SyncError::InvalidArgument`] when include regexes are given without
    /// exclude regexes, when a regex does not compile, or when a time bound
    /// is negative.
    pub fn new(options: ScanPolicyOptions) -> Result<Self> {
        if !options.include_file_regexes.is_empty() && options.exclude_file_regexes.is_empty() {
            return Err(SyncError::invalid_argument(
                "include_file_regexes",
                "cannot be used without exclude_file_regexes at the same time",
            ));
        }

        let dir_error = |_| {
            SyncError::invalid_argument(
                "exclude_dir_regexes",
                "wrong regex was given for excluding directories",
            )
        };
        let exclude_dir_set = RegexSet::new(&options.exclude_dir_regexes).map_err(dir_error)?;
        let exclude_file_because_of_dir_set = RegexSet::new(
            options
                .exclude_dir_regexes
                .iter()
                .map(|r| dir_regex_to_file_prefix_regex(r)),
        )
        .map_err(dir_error)?;

        let exclude_file_set = RegexSet::new(&options.exclude_file_regexes).map_err(|_| {
            SyncError::invalid_argument(
                "exclude_file_regexes",
                "wrong regex was given for excluding files",
            )
        })?;
        let include_file_set = RegexSet::new(&options.include_file_regexes).map_err(|_| {
            SyncError::invalid_argument(
                "include_file_regexes",
                "wrong regex was given for including files",
            )
        })?;

        let include_mod_time_range = IntegerRange::new(
            options.exclude_modified_before,
            options.exclude_modified_after,
            "exclude_modified_before,exclude_modified_after",
        )?;
        let include_upload_time_range = IntegerRange::new(
            options.exclude_uploaded_before,
            options.exclude_uploaded_after,
            "exclude_uploaded_before,exclude_uploaded_after",
        )?;

        Ok(Self {
            exclude_dir_set,
            exclude_file_because_of_dir_set,
            exclude_file_set,
            include_file_set,
            exclude_all_symlinks: options.exclude_all_symlinks,
            include_mod_time_range,
            include_upload_time_range,
        })
    }

    /// Build from the `scan` section of the configuration file.
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        Self::new(ScanPolicyOptions {
            exclude_dir_regexes: config.exclude_dir_regexes.clone(),
            exclude_file_regexes: config.exclude_file_regexes.clone(),
            include_file_regexes: config.include_file_regexes.clone(),
            exclude_all_symlinks: config.exclude_all_symlinks,
            exclude_modified_before: config.exclude_modified_before,
            exclude_modified_after: config.exclude_modified_after,
            exclude_uploaded_before: config.exclude_uploaded_before,
            exclude_uploaded_after: config.exclude_uploaded_after,
        })
    }

    /// Whether symlinks are skipped by local scans
    pub fn exclude_all_symlinks(&self) -> bool {
        self.exclude_all_symlinks
    }

    /// Regex-only decision for a file path.
    pub fn should_exclude_relative_path(&self, relative_path: &str) -> bool {
        if self.exclude_file_because_of_dir_set.matches(relative_path) {
            return true;
        }
        if self.include_file_set.matches(relative_path) {
            return false;
        }
        self.exclude_file_set.matches(relative_path)
    }

    /// Decision for a local file (modification time range, then regexes).
    pub fn should_exclude_local_path(&self, local_path: &LocalPath) -> bool {
        if !self.include_mod_time_range.contains(local_path.mod_time) {
            return true;
        }
        self.should_exclude_relative_path(&local_path.relative_path)
    }

    /// Decision for one remote version at `relative_path`.
    ///
    /// Checks the upload time range, the modification time range, then the
    /// path regexes.
    pub fn should_exclude_remote_file_version(
        &self,
        file_version: &FileVersion,
        relative_path: &str,
    ) -> bool {
        if !self
            .include_upload_time_range
            .contains(file_version.upload_timestamp)
        {
            return true;
        }
        if !self
            .include_mod_time_range
            .contains(file_version.mod_time_millis())
        {
            return true;
        }
        self.should_exclude_relative_path(relative_path)
    }

    /// Whether everything under a local directory is skipped
    pub fn should_exclude_local_directory(&self, dir_path: &str) -> bool {
        self.exclude_dir_set.matches(dir_path)
    }

    /// Whether everything under a remote "directory" is skipped
    pub fn should_exclude_remote_directory(&self, dir_path: &str) -> bool {
        self.exclude_dir_set.matches(dir_path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use b2sync_core::domain::{FileAction, SRC_LAST_MODIFIED_MILLIS};

    use super::*;

    fn policy(options: ScanPolicyOptions) -> ScanPolicy {
        ScanPolicy::new(options).unwrap()
    }

    fn local(relative_path: &str, mod_time: i64) -> LocalPath {
        LocalPath {
            absolute_path: PathBuf::from("/root").join(relative_path),
            relative_path: relative_path.to_string(),
            mod_time,
            size: 1,
        }
    }

    fn remote_version(upload_timestamp: i64, mod_time: i64) -> FileVersion {
        let mut file_info = BTreeMap::new();
        file_info.insert(SRC_LAST_MODIFIED_MILLIS.to_string(), mod_time.to_string());
        FileVersion {
            id: "id".to_string(),
            file_name: "a.txt".to_string(),
            size: 1,
            content_type: None,
            content_sha1: None,
            file_info,
            upload_timestamp,
            action: FileAction::Upload,
            server_side_encryption: None,
        }
    }

    // ------------------------------------------------------------------------
    // Regexes
    // ------------------------------------------------------------------------

    #[test]
    fn test_default_excludes_nothing() {
        let p = ScanPolicy::default();
        assert!(!p.should_exclude_relative_path("a/b/c.txt"));
        assert!(!p.should_exclude_local_directory("a"));
        assert!(!p.should_exclude_local_path(&local("x", -5)));
        assert!(!p.exclude_all_symlinks());
    }

    #[test]
    fn test_patterns_are_anchored_at_start() {
        let p = policy(ScanPolicyOptions {
            exclude_file_regexes: vec![r"b\.txt".to_string()],
            ..Default::default()
        });
        assert!(p.should_exclude_relative_path("b.txt"));
        assert!(p.should_exclude_relative_path("b.txt.bak"));
        assert!(!p.should_exclude_relative_path("a/b.txt"));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let p = policy(ScanPolicyOptions {
            exclude_file_regexes: vec![r".*\.log".to_string()],
            include_file_regexes: vec![r"keep\.log".to_string()],
            ..Default::default()
        });
        assert!(p.should_exclude_relative_path("debug.log"));
        assert!(!p.should_exclude_relative_path("keep.log"));
        assert!(!p.should_exclude_relative_path("notes.txt"));
    }

    #[test]
    fn test_excluded_dir_wins_over_include() {
        let p = policy(ScanPolicyOptions {
            exclude_dir_regexes: vec!["build$".to_string()],
            exclude_file_regexes: vec!["nothing".to_string()],
            include_file_regexes: vec![".*".to_string()],
            ..Default::default()
        });
        assert!(p.should_exclude_relative_path("build/out.o"));
        assert!(!p.should_exclude_relative_path("build2/out.o"));
        assert!(!p.should_exclude_relative_path("build.txt"));
    }

    #[test]
    fn test_dir_regex_conversion() {
        assert_eq!(dir_regex_to_file_prefix_regex("photos$"), "photos/");
        assert_eq!(dir_regex_to_file_prefix_regex("photos"), "photos.*?/");

        let p = policy(ScanPolicyOptions {
            exclude_dir_regexes: vec!["photos".to_string()],
            ..Default::default()
        });
        assert!(p.should_exclude_relative_path("photos/kitten.jpg"));
        assert!(p.should_exclude_relative_path("photos2/puppy.jpg"));
        assert!(!p.should_exclude_relative_path("photos.txt"));
        assert!(p.should_exclude_local_directory("photos"));
        assert!(p.should_exclude_remote_directory("photos2"));
    }

    // ------------------------------------------------------------------------
    // Time ranges
    // ------------------------------------------------------------------------

    #[test]
    fn test_mod_time_range_is_inclusive() {
        let p = policy(ScanPolicyOptions {
            exclude_modified_before: Some(100),
            exclude_modified_after: Some(200),
            ..Default::default()
        });
        assert!(p.should_exclude_local_path(&local("a", 99)));
        assert!(!p.should_exclude_local_path(&local("a", 100)));
        assert!(!p.should_exclude_local_path(&local("a", 200)));
        assert!(p.should_exclude_local_path(&local("a", 201)));
    }

    #[test]
    fn test_remote_version_checks_both_ranges() {
        let p = policy(ScanPolicyOptions {
            exclude_modified_before: Some(100),
            exclude_uploaded_after: Some(1_000),
            ..Default::default()
        });
        assert!(!p.should_exclude_remote_file_version(&remote_version(500, 150), "a.txt"));
        assert!(p.should_exclude_remote_file_version(&remote_version(1_001, 150), "a.txt"));
        assert!(p.should_exclude_remote_file_version(&remote_version(500, 50), "a.txt"));
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_include_without_exclude_is_rejected() {
        let err = ScanPolicy::new(ScanPolicyOptions {
            include_file_regexes: vec!["a".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "include_file_regexes cannot be used without exclude_file_regexes at the same time"
        );
    }

    #[test]
    fn test_bad_regexes_are_rejected() {
        let err = ScanPolicy::new(ScanPolicyOptions {
            exclude_dir_regexes: vec!["(".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidArgument { ref parameter, .. } if parameter == "exclude_dir_regexes"
        ));

        let err = ScanPolicy::new(ScanPolicyOptions {
            exclude_file_regexes: vec!["[".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "exclude_file_regexes wrong regex was given for excluding files"
        );
    }

    #[test]
    fn test_negative_time_bound_is_rejected() {
        let err = ScanPolicy::new(ScanPolicyOptions {
            exclude_uploaded_before: Some(-1),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidArgument { ref parameter, .. }
                if parameter == "exclude_uploaded_before,exclude_uploaded_after"
        ));
    }

    #[test]
    fn test_from_config() {
        let config = ScanConfig {
            exclude_dir_regexes: vec!["tmp$".to_string()],
            exclude_all_symlinks: true,
            ..Default::default()
        };
        let p = ScanPolicy::from_config(&config).unwrap();
        assert!(p.exclude_all_symlinks());
        assert!(p.should_exclude_local_directory("tmp"));
    }
}
