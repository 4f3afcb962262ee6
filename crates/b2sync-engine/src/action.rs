//! Sync actions
//!
//! A sync run turns every source/destination pair into zero or more
//! [`SyncAction`]s. Each action knows how to carry itself out against a
//! bucket (or the local filesystem) and how to report its completion.
//! Actions are built on the driving thread and run on a worker thread.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use b2sync_core::domain::{FileVersion, RemotePath, SRC_LAST_MODIFIED_MILLIS};
use b2sync_core::ports::{
    CopyRequest, IBucket, IEncryptionSettingsProvider, IProgressListener, OutboundSource,
    UploadRequest,
};
use filetime::FileTime;
use tracing::{debug, error, warn};

use crate::format::escape_control_chars;
use crate::report::{SyncFileReporter, SyncReport};
use crate::upload_source::LocalUploadSource;
use crate::{Result, SyncError};

/// Suffix of the temporary file a download is written to
pub const DOWNLOAD_TMP_SUFFIX: &str = ".b2.sync.tmp";

// ============================================================================
// ActionContext
// ============================================================================

/// Everything an action needs at run time, shared by all actions of a run
#[derive(Clone)]
pub struct ActionContext {
    /// Bucket the actions operate on (the destination, or the source when
    /// syncing down)
    pub bucket: Arc<dyn IBucket>,
    pub encryption: Arc<dyn IEncryptionSettingsProvider>,
    pub report: Option<Arc<SyncReport>>,
    /// Report what would be done without doing it
    pub dry_run: bool,
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("bucket", &self.bucket.name())
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl ActionContext {
    fn progress_listener(&self) -> Option<SyncFileReporter> {
        self.report
            .as_ref()
            .map(|report| SyncFileReporter::new(Arc::clone(report)))
    }

    fn print_completion(&self, message: &str) {
        if let Some(report) = &self.report {
            report.print_completion(message);
        }
    }

    fn count_transfer(&self) {
        if let Some(report) = &self.report {
            report.update_transfer(1, 0);
        }
    }
}

/// Runs `f` with an optional listener, closing the listener afterwards
/// whether or not `f` succeeded.
fn with_listener<T>(
    listener: Option<SyncFileReporter>,
    f: impl FnOnce(Option<&mut dyn IProgressListener>) -> T,
) -> T {
    let mut listener = listener;
    let result = f(listener
        .as_mut()
        .map(|l| l as &mut dyn IProgressListener));
    if let Some(l) = listener.as_mut() {
        l.close();
    }
    result
}

// ============================================================================
// Action payloads
// ============================================================================

/// Upload a local file as a new version
#[derive(Debug)]
pub struct UploadAction {
    pub local_full_path: PathBuf,
    pub relative_name: String,
    pub b2_file_name: String,
    pub mod_time_millis: i64,
    pub size: u64,
    source: LocalUploadSource,
}

impl UploadAction {
    pub fn new(
        local_full_path: PathBuf,
        relative_name: String,
        b2_file_name: String,
        mod_time_millis: i64,
        size: u64,
    ) -> Self {
        let source = LocalUploadSource::new(local_full_path.clone(), size);
        Self {
            local_full_path,
            relative_name,
            b2_file_name,
            mod_time_millis,
            size,
            source,
        }
    }

    pub fn upload_source(&self) -> &LocalUploadSource {
        &self.source
    }

    fn upload(&self, ctx: &ActionContext, sources: Vec<OutboundSource>) -> Result<()> {
        let file_info = BTreeMap::from([(
            SRC_LAST_MODIFIED_MILLIS.to_string(),
            self.mod_time_millis.to_string(),
        )]);
        let encryption = ctx.encryption.setting_for_upload(
            ctx.bucket.name(),
            &self.b2_file_name,
            &file_info,
            self.size,
        );
        let large_file_sha1 = if sources.len() > 1 {
            Some(self.source.content_sha1()?.to_string())
        } else {
            None
        };
        let request = UploadRequest {
            sources,
            file_name: self.b2_file_name.clone(),
            file_info,
            encryption,
            large_file_sha1,
        };
        with_listener(ctx.progress_listener(), |listener| {
            ctx.bucket.concatenate(request, listener)
        })?;
        Ok(())
    }
}

/// Upload that may reuse the bytes of the current remote version
#[derive(Debug)]
pub struct IncrementalUploadAction {
    pub upload: UploadAction,
    pub file_version: Option<FileVersion>,
    pub absolute_minimum_part_size: Option<u64>,
}

/// Download the selected version of a remote path
#[derive(Debug)]
pub struct DownloadAction {
    pub source_path: RemotePath,
    pub b2_file_name: String,
    pub local_full_path: PathBuf,
    /// Bucket the version is read from
    pub bucket_name: String,
}

impl DownloadAction {
    fn tmp_path(&self) -> PathBuf {
        let mut tmp: OsString = self.local_full_path.clone().into_os_string();
        tmp.push(DOWNLOAD_TMP_SUFFIX);
        PathBuf::from(tmp)
    }

    fn ensure_parent_directory(&self) -> Result<()> {
        let Some(parent) = self.local_full_path.parent() else {
            return Ok(());
        };
        if parent.is_dir() {
            return Ok(());
        }
        if let Err(e) = fs::create_dir_all(parent) {
            debug!(path = %parent.display(), error = %e, "could not create directory");
            return Err(SyncError::UnableToCreateDirectory(parent.to_path_buf()));
        }
        if !parent.is_dir() {
            return Err(SyncError::UnableToCreateDirectory(parent.to_path_buf()));
        }
        Ok(())
    }

    fn download(&self, ctx: &ActionContext) -> Result<()> {
        self.ensure_parent_directory()?;
        let version = &self.source_path.selected_version;
        let encryption = ctx.encryption.setting_for_download(&self.bucket_name, version);
        let download_path = self.tmp_path();

        let written = with_listener(ctx.progress_listener(), |listener| -> Result<()> {
            let mut downloaded =
                ctx.bucket
                    .download_file_by_id(&version.id, encryption.as_ref(), listener)?;
            let mut out = BufWriter::new(File::create(&download_path)?);
            io::copy(&mut downloaded.content, &mut out)?;
            out.flush()?;
            Ok(())
        })
        .and_then(|()| {
            let mod_time = FileTime::from_unix_time(
                version.mod_time_millis().div_euclid(1000),
                (version.mod_time_millis().rem_euclid(1000) * 1_000_000) as u32,
            );
            filetime::set_file_mtime(&download_path, mod_time)?;
            Ok(())
        });
        if let Err(e) = written {
            if let Err(cleanup) = remove_if_exists(&download_path) {
                warn!(path = %download_path.display(), error = %cleanup, "could not remove partial download");
            }
            return Err(e);
        }

        remove_if_exists(&self.local_full_path)?;
        fs::rename(&download_path, &self.local_full_path)?;
        debug!(path = %self.local_full_path.display(), "download moved into place");
        Ok(())
    }
}

fn remove_if_exists(path: &std::path::Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Server-side copy of the selected version of a remote path
#[derive(Debug)]
pub struct CopyAction {
    pub b2_file_name: String,
    pub source_path: RemotePath,
    pub dest_b2_file_name: String,
    pub source_bucket_name: String,
    pub dest_bucket_name: String,
}

impl CopyAction {
    fn copy(&self, ctx: &ActionContext) -> Result<()> {
        let version = &self.source_path.selected_version;
        let source_encryption = ctx
            .encryption
            .source_setting_for_copy(&self.source_bucket_name, version);
        let destination_encryption = ctx.encryption.destination_setting_for_copy(
            &self.dest_bucket_name,
            &self.dest_b2_file_name,
            version,
        );
        let request = CopyRequest {
            file_id: version.id.clone(),
            new_file_name: self.dest_b2_file_name.clone(),
            length: version.size,
            source_encryption,
            destination_encryption,
            source_file_info: version.file_info.clone(),
            source_content_type: version.content_type.clone(),
        };
        with_listener(ctx.progress_listener(), |listener| {
            ctx.bucket.copy(request, listener)
        })?;
        Ok(())
    }
}

/// Write a hide marker for a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HideAction {
    pub relative_name: String,
    pub b2_file_name: String,
}

/// Delete one remote version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteAction {
    pub relative_name: String,
    pub b2_file_name: String,
    pub file_id: String,
    /// `(hide marker)`, `(old version)` or empty
    pub note: String,
}

/// Delete a local file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDeleteAction {
    pub relative_name: String,
    pub full_path: PathBuf,
}

// ============================================================================
// SyncAction
// ============================================================================

/// One unit of work produced by a sync policy
#[derive(Debug)]
pub enum SyncAction {
    Upload(UploadAction),
    IncrementalUpload(IncrementalUploadAction),
    Download(DownloadAction),
    Copy(CopyAction),
    Hide(HideAction),
    Delete(DeleteAction),
    LocalDelete(LocalDeleteAction),
}

impl SyncAction {
    /// Number of content bytes this action transfers
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Upload(a) => a.size,
            Self::IncrementalUpload(a) => a.upload.size,
            Self::Download(a) => a.source_path.selected_version.size,
            Self::Copy(a) => a.source_path.selected_version.size,
            Self::Hide(_) | Self::Delete(_) | Self::LocalDelete(_) => 0,
        }
    }

    /// Perform the action (unless `dry_run`) and report it.
    ///
    /// A failure is logged and written to the report before it is returned.
    pub fn run(&self, ctx: &ActionContext) -> Result<()> {
        let outcome = if ctx.dry_run {
            Ok(())
        } else {
            self.do_action(ctx)
        };
        match outcome {
            Ok(()) => {
                self.do_report(ctx);
                Ok(())
            }
            Err(e) => {
                error!(
                    action = %self,
                    path = %self.relative_name(),
                    error = %e,
                    "an exception occurred in a sync action"
                );
                if let Some(report) = &ctx.report {
                    report.error(&format!("{self}: {e}"));
                }
                Err(e)
            }
        }
    }

    fn do_action(&self, ctx: &ActionContext) -> Result<()> {
        match self {
            Self::Upload(a) => a.upload(ctx, vec![a.source.to_outbound()]),
            Self::IncrementalUpload(a) => {
                let sources = a
                    .upload
                    .source
                    .incremental_sources(a.file_version.as_ref(), a.absolute_minimum_part_size)?;
                a.upload.upload(ctx, sources)
            }
            Self::Download(a) => a.download(ctx),
            Self::Copy(a) => a.copy(ctx),
            Self::Hide(a) => {
                ctx.bucket.hide_file(&a.b2_file_name)?;
                Ok(())
            }
            Self::Delete(a) => {
                ctx.bucket.delete_file_version(&a.file_id, &a.b2_file_name)?;
                Ok(())
            }
            Self::LocalDelete(a) => {
                fs::remove_file(&a.full_path)?;
                Ok(())
            }
        }
    }

    fn do_report(&self, ctx: &ActionContext) {
        match self {
            Self::Upload(a) | Self::IncrementalUpload(IncrementalUploadAction { upload: a, .. }) => {
                ctx.print_completion(&format!("upload {}", escape_control_chars(&a.relative_name)));
            }
            Self::Download(a) => {
                ctx.print_completion(&format!(
                    "dnload {}",
                    escape_control_chars(&a.source_path.relative_path)
                ));
            }
            Self::Copy(a) => {
                ctx.print_completion(&format!(
                    "copy {}",
                    escape_control_chars(&a.source_path.relative_path)
                ));
            }
            Self::Hide(a) => {
                ctx.count_transfer();
                ctx.print_completion(&format!("hide   {}", escape_control_chars(&a.relative_name)));
            }
            Self::Delete(a) => {
                ctx.count_transfer();
                ctx.print_completion(&format!(
                    "delete {} {}",
                    escape_control_chars(&a.relative_name),
                    a.note
                ));
            }
            Self::LocalDelete(a) => {
                ctx.count_transfer();
                ctx.print_completion(&format!(
                    "delete {}",
                    escape_control_chars(&a.relative_name)
                ));
            }
        }
    }

    /// Relative path the action applies to
    pub fn relative_name(&self) -> &str {
        match self {
            Self::Upload(a) => &a.relative_name,
            Self::IncrementalUpload(a) => &a.upload.relative_name,
            Self::Download(a) => &a.source_path.relative_path,
            Self::Copy(a) => &a.source_path.relative_path,
            Self::Hide(a) => &a.relative_name,
            Self::Delete(a) => &a.relative_name,
            Self::LocalDelete(a) => &a.relative_name,
        }
    }
}

impl Display for SyncAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload(a) => write!(
                f,
                "b2_upload({}, {}, {})",
                a.local_full_path.display(),
                a.b2_file_name,
                a.mod_time_millis
            ),
            Self::IncrementalUpload(IncrementalUploadAction { upload: a, .. }) => write!(
                f,
                "b2_incremental_upload({}, {}, {})",
                a.local_full_path.display(),
                a.b2_file_name,
                a.mod_time_millis
            ),
            Self::Download(a) => write!(
                f,
                "b2_download({}, {}, {}, {})",
                a.b2_file_name,
                a.source_path.selected_version.id,
                a.local_full_path.display(),
                a.source_path.selected_version.mod_time_millis()
            ),
            Self::Copy(a) => write!(
                f,
                "b2_copy({}, {}, {}, {})",
                a.b2_file_name,
                a.source_path.selected_version.id,
                a.dest_b2_file_name,
                a.source_path.selected_version.mod_time_millis()
            ),
            Self::Hide(a) => write!(f, "b2_hide({})", a.b2_file_name),
            Self::Delete(a) => write!(f, "b2_delete({}, {}, {})", a.b2_file_name, a.file_id, a.note),
            Self::LocalDelete(a) => write!(f, "local_delete({})", a.full_path.display()),
        }
    }
}
