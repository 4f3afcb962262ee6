//! Sync orchestration
//!
//! [`Synchronizer::sync_folders`] makes the destination match the source:
//!
//! 1. Check the direction and options, prepare local folders
//! 2. Start a bounded worker pool (and, for a local source, a counting task)
//! 3. Merge both scans by relative path, derive actions for every pair and
//!    submit them to the pool
//! 4. Wait for the pool to drain and fail with `IncompleteSync` if any
//!    action failed
//!
//! Only the scan/merge/decision pass runs on the calling thread; actions
//! run on the workers and may finish in any order.

use std::sync::Arc;

use b2sync_core::config::{Config, SyncConfig};
use b2sync_core::domain::{KeepOrDeleteMode, ScanPath};
use b2sync_core::ports::{IBucket, IEncryptionSettingsProvider};
use tracing::{debug, info, instrument};

use crate::action::ActionContext;
use crate::encryption::ServerDefaultEncryptionSettingsProvider;
use crate::executor::BoundedQueueExecutor;
use crate::policy::{FileSyncPolicy, PolicyKind, SyncType};
use crate::report::{ScanReporter, SyncReport};
use crate::scan::{Folder, LocalFolder, ScanPolicy, ZipFolders};
use crate::{Result, SyncError};

/// Extra queue slots on top of the worker count
const QUEUE_SLACK: usize = 1000;

// ============================================================================
// SyncOptions
// ============================================================================

/// Behaviour of a sync run; the `sync` section of the configuration
pub type SyncOptions = SyncConfig;

/// Rejects option combinations that cannot work.
///
/// # Errors
/// [`SyncError::InvalidArgument`] naming the first offending option.
pub fn validate_options(options: &SyncOptions) -> Result<()> {
    if options.max_workers == 0 {
        return Err(SyncError::invalid_argument(
            "max_workers",
            "must be a positive integer",
        ));
    }
    if options.compare_threshold < 0 {
        return Err(SyncError::invalid_argument(
            "compare_threshold",
            "must be a positive integer",
        ));
    }
    match options.keep_days {
        None if options.keep_mode == KeepOrDeleteMode::KeepBeforeDelete => {
            return Err(SyncError::invalid_argument(
                "keep_days",
                format!(
                    "is required when keep_days_or_delete is {}",
                    KeepOrDeleteMode::KeepBeforeDelete
                ),
            ));
        }
        Some(days) if days <= 0 => {
            return Err(SyncError::invalid_argument(
                "keep_days",
                "must be a positive integer",
            ));
        }
        _ => {}
    }
    if options.absolute_minimum_part_size == Some(0) {
        return Err(SyncError::invalid_argument(
            "absolute_minimum_part_size",
            "must be a positive integer",
        ));
    }
    Ok(())
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Copies files from a source folder to a destination folder, optionally
/// hiding or deleting what the source no longer has
pub struct Synchronizer {
    options: SyncOptions,
    scan_policy: Arc<ScanPolicy>,
    /// Destinations are always scanned unfiltered
    dest_policy: ScanPolicy,
    encryption: Arc<dyn IEncryptionSettingsProvider>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("options", &self.options)
            .field("scan_policy", &self.scan_policy)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Create a synchronizer after validating `options`.
    ///
    /// # Arguments
    /// * `options` - Run behaviour
    /// * `scan_policy` - Filter applied to the source scan
    pub fn new(options: SyncOptions, scan_policy: ScanPolicy) -> Result<Self> {
        validate_options(&options)?;
        Ok(Self {
            options,
            scan_policy: Arc::new(scan_policy),
            dest_policy: ScanPolicy::default(),
            encryption: Arc::new(ServerDefaultEncryptionSettingsProvider),
        })
    }

    /// Build from the `sync` and `scan` sections of a configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.sync.clone(),
            ScanPolicy::from_config(&config.scan)?,
        )
    }

    /// Replace the default "server decides" encryption provider.
    pub fn with_encryption_provider(mut self, provider: Arc<dyn IEncryptionSettingsProvider>) -> Self {
        self.encryption = provider;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Sync `dest` to match `source`.
    ///
    /// # Arguments
    /// * `source` - Folder to read from
    /// * `dest` - Folder to update
    /// * `now_millis` - Current time, used for retention decisions
    /// * `report` - Progress report; receives scan warnings and action results
    ///
    /// # Errors
    /// Option and direction problems are returned before any I/O. A failed
    /// action does not stop the run; once all actions are done,
    /// [`SyncError::IncompleteSync`] reports how many failed.
    #[instrument(skip_all, fields(source = %source, dest = %dest))]
    pub fn sync_folders(
        &self,
        source: &Folder,
        dest: &Folder,
        now_millis: i64,
        report: Option<Arc<SyncReport>>,
    ) -> Result<()> {
        let result = self.run(source, dest, now_millis, report.as_ref());
        if let Some(report) = &report {
            report.close();
        }
        result
    }

    fn run(
        &self,
        source: &Folder,
        dest: &Folder,
        now_millis: i64,
        report: Option<&Arc<SyncReport>>,
    ) -> Result<()> {
        let sync_type = SyncType::from_folders(source, dest)?;
        if self.options.keep_mode == KeepOrDeleteMode::KeepBeforeDelete && dest.as_local().is_some()
        {
            return Err(SyncError::invalid_argument(
                "keep_days_or_delete",
                "cannot be used for local files",
            ));
        }

        if let Folder::Local(dest_folder) = dest {
            if !self.options.dry_run {
                dest_folder.ensure_present()?;
            }
        }
        if let Folder::Local(source_folder) = source {
            if !self.options.allow_empty_source {
                source_folder.ensure_non_empty()?;
            }
        }

        let max_workers = self.options.max_workers;
        let mut executor = BoundedQueueExecutor::new(max_workers, max_workers + QUEUE_SLACK);

        // Bucket-to-bucket actions run against the destination.
        let action_bucket: Arc<dyn IBucket> = match (source, dest) {
            (_, Folder::Remote(folder)) | (Folder::Remote(folder), _) => Arc::clone(folder.bucket()),
            (Folder::Local(_), Folder::Local(_)) => {
                return Err(SyncError::UnsupportedSyncDirection {
                    source_kind: "local",
                    dest_kind: "local",
                })
            }
        };
        let ctx = Arc::new(ActionContext {
            bucket: action_bucket,
            encryption: Arc::clone(&self.encryption),
            report: report.cloned(),
            dry_run: self.options.dry_run,
        });

        info!(
            %sync_type,
            dry_run = self.options.dry_run,
            keep_mode = %self.options.keep_mode,
            "starting sync"
        );

        let scheduled = self.schedule(&executor, source, dest, sync_type, now_millis, &ctx);

        executor.shutdown();
        scheduled?;

        let failed = executor.num_exceptions();
        debug!(
            peak_in_flight = executor.peak_in_flight(),
            failed, "executor drained"
        );
        if failed > 0 {
            return Err(SyncError::IncompleteSync { failed });
        }
        info!("sync finished");
        Ok(())
    }

    /// Walks the merged scans on the calling thread and submits actions.
    fn schedule(
        &self,
        executor: &BoundedQueueExecutor,
        source: &Folder,
        dest: &Folder,
        sync_type: SyncType,
        now_millis: i64,
        ctx: &Arc<ActionContext>,
    ) -> Result<()> {
        if let (Folder::Local(source_folder), Some(report)) = (source, &ctx.report) {
            self.start_counting(executor, source_folder, Arc::clone(report))?;
        }

        let report = ctx.report.as_deref();

        let reporter = report.map(|r| r as &dyn ScanReporter);
        let pairs = ZipFolders::new(
            source.all_files(reporter, &self.scan_policy),
            dest.all_files(reporter, &self.dest_policy),
            reporter,
        )
        .keep_reporter_open();

        let kind = PolicyKind::select(sync_type, self.options.keep_mode);
        let source_is_remote = source.as_remote().is_some();
        let mut total_files: u64 = 0;
        let mut total_bytes: u64 = 0;

        for pair in pairs {
            let (source_path, dest_path) = pair?;
            match (&source_path, &dest_path) {
                (None, Some(d)) => debug!(path = %d.relative_path(), "not present on source"),
                (Some(s), None) => debug!(path = %s.relative_path(), "not present on destination"),
                _ => {}
            }

            if source_path.is_some() {
                if let Some(report) = report {
                    // remote sources are counted while comparing
                    if source_is_remote {
                        report.update_total(1);
                    }
                    report.update_compare(1);
                }
            }

            let policy = FileSyncPolicy {
                kind,
                source_path: source_path.as_ref(),
                source_folder: source,
                dest_path: dest_path.as_ref(),
                dest_folder: dest,
                now_millis,
                options: &self.options,
            };
            for action in policy.all_actions()? {
                total_files += 1;
                total_bytes += action.bytes();
                debug!(%action, bucket = %ctx.bucket.name(), "scheduling action");
                let ctx = Arc::clone(ctx);
                executor.submit(move || action.run(&ctx).map_err(anyhow::Error::from))?;
            }
        }

        if let Some(report) = report {
            if source_is_remote {
                report.end_total();
            }
            report.end_compare(total_files, total_bytes);
        }
        Ok(())
    }

    /// Counts the local source files on a worker to scale the progress line.
    ///
    /// Scan problems are not reported here; the comparison pass reports them.
    fn start_counting(
        &self,
        executor: &BoundedQueueExecutor,
        source_folder: &LocalFolder,
        report: Arc<SyncReport>,
    ) -> Result<()> {
        let folder = source_folder.clone();
        let policy = Arc::clone(&self.scan_policy);
        executor.submit(move || {
            for path in folder.all_files(None, &policy) {
                if let Ok(ScanPath::Local(_)) = path {
                    report.update_total(1);
                }
            }
            report.end_total();
            Ok(())
        })?;
        Ok(())
    }
}
