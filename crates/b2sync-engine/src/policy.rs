//! Per-file sync policies
//!
//! For every source/destination pair a [`FileSyncPolicy`] decides whether
//! the source is transferred and which cleanup actions (hide, delete) the
//! destination gets. The policy kind follows from the transfer direction
//! and the keep-or-delete mode.

use b2sync_core::domain::{
    CompareVersionMode, FileAction, FileVersion, KeepOrDeleteMode, NewerFileSyncMode, RemotePath,
    ScanPath, UploadMode,
};
use tracing::debug;

use crate::action::{
    CopyAction, DeleteAction, DownloadAction, HideAction, IncrementalUploadAction,
    LocalDeleteAction, SyncAction, UploadAction,
};
use crate::scan::{Folder, LocalFolder, RemoteFolder};
use crate::synchronizer::SyncOptions;
use crate::{Result, SyncError};

pub const ONE_DAY_IN_MS: i64 = 24 * 60 * 60 * 1000;

// ============================================================================
// SyncType / PolicyKind
// ============================================================================

/// Transfer direction, from the kinds of the two folders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncType {
    LocalToB2,
    B2ToLocal,
    B2ToB2,
}

impl SyncType {
    /// # Errors
    /// [`SyncError::UnsupportedSyncDirection`] for local to local.
    pub fn from_folders(source: &Folder, dest: &Folder) -> Result<Self> {
        match (source, dest) {
            (Folder::Local(_), Folder::Remote(_)) => Ok(Self::LocalToB2),
            (Folder::Remote(_), Folder::Local(_)) => Ok(Self::B2ToLocal),
            (Folder::Remote(_), Folder::Remote(_)) => Ok(Self::B2ToB2),
            (Folder::Local(_), Folder::Local(_)) => Err(SyncError::UnsupportedSyncDirection {
                source_kind: source.folder_type(),
                dest_kind: dest.folder_type(),
            }),
        }
    }

    /// URI prefix of the source side, used in error messages
    pub fn source_prefix(self) -> &'static str {
        match self {
            Self::LocalToB2 => "local://",
            Self::B2ToLocal | Self::B2ToB2 => "b2://",
        }
    }

    /// URI prefix of the destination side
    pub fn dest_prefix(self) -> &'static str {
        match self {
            Self::B2ToLocal => "local://",
            Self::LocalToB2 | Self::B2ToB2 => "b2://",
        }
    }
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LocalToB2 => "local-to-b2",
            Self::B2ToLocal => "b2-to-local",
            Self::B2ToB2 => "b2-to-b2",
        };
        f.write_str(s)
    }
}

/// Transfer direction combined with the cleanup behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Up,
    UpAndDelete,
    UpAndKeepDays,
    Down,
    DownAndDelete,
    /// Local files have no history; nothing is cleaned up
    DownAndKeepDays,
    Copy,
    CopyAndDelete,
    CopyAndKeepDays,
}

impl PolicyKind {
    pub fn select(sync_type: SyncType, keep_mode: KeepOrDeleteMode) -> Self {
        match (sync_type, keep_mode) {
            (SyncType::LocalToB2, KeepOrDeleteMode::NoDelete) => Self::Up,
            (SyncType::LocalToB2, KeepOrDeleteMode::Delete) => Self::UpAndDelete,
            (SyncType::LocalToB2, KeepOrDeleteMode::KeepBeforeDelete) => Self::UpAndKeepDays,
            (SyncType::B2ToLocal, KeepOrDeleteMode::NoDelete) => Self::Down,
            (SyncType::B2ToLocal, KeepOrDeleteMode::Delete) => Self::DownAndDelete,
            (SyncType::B2ToLocal, KeepOrDeleteMode::KeepBeforeDelete) => Self::DownAndKeepDays,
            (SyncType::B2ToB2, KeepOrDeleteMode::NoDelete) => Self::Copy,
            (SyncType::B2ToB2, KeepOrDeleteMode::Delete) => Self::CopyAndDelete,
            (SyncType::B2ToB2, KeepOrDeleteMode::KeepBeforeDelete) => Self::CopyAndKeepDays,
        }
    }

    pub fn sync_type(self) -> SyncType {
        match self {
            Self::Up | Self::UpAndDelete | Self::UpAndKeepDays => SyncType::LocalToB2,
            Self::Down | Self::DownAndDelete | Self::DownAndKeepDays => SyncType::B2ToLocal,
            Self::Copy | Self::CopyAndDelete | Self::CopyAndKeepDays => SyncType::B2ToB2,
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Decides whether `dest_path` should be replaced by `source_path`.
///
/// # Errors
/// [`SyncError::DestFileNewer`] when comparing by modification time, the
/// destination is newer by more than the threshold and `newer_file_mode`
/// is `RAISE_ERROR`.
pub fn files_are_different(
    source_path: &ScanPath,
    dest_path: &ScanPath,
    compare_threshold: i64,
    compare_version_mode: CompareVersionMode,
    newer_file_mode: NewerFileSyncMode,
    sync_type: SyncType,
) -> Result<bool> {
    let compare_threshold = compare_threshold.max(0);
    match compare_version_mode {
        CompareVersionMode::None => Ok(false),
        CompareVersionMode::Modtime => {
            let source_mod_time = source_path.mod_time();
            let dest_mod_time = dest_path.mod_time();
            let diff = source_mod_time.abs_diff(dest_mod_time);
            let exceeded = diff > compare_threshold.unsigned_abs();
            debug!(
                path = %source_path.relative_path(),
                source_mod_time,
                dest_mod_time,
                diff,
                compare_threshold,
                exceeded,
                "compared modification times"
            );
            if !exceeded {
                return Ok(false);
            }
            if dest_mod_time < source_mod_time {
                return Ok(true);
            }
            match newer_file_mode {
                NewerFileSyncMode::Replace => Ok(true),
                NewerFileSyncMode::Skip => Ok(false),
                NewerFileSyncMode::RaiseError => Err(SyncError::DestFileNewer {
                    source_prefix: sync_type.source_prefix(),
                    source_path: source_path.relative_path().to_string(),
                    source_mod_time,
                    dest_prefix: sync_type.dest_prefix(),
                    dest_path: dest_path.relative_path().to_string(),
                    dest_mod_time,
                }),
            }
        }
        CompareVersionMode::Size => {
            let source_size = source_path.size();
            let dest_size = dest_path.size();
            let diff = source_size.abs_diff(dest_size);
            let exceeded = diff > compare_threshold.unsigned_abs();
            debug!(
                path = %source_path.relative_path(),
                source_size,
                dest_size,
                diff,
                compare_threshold,
                exceeded,
                "compared sizes"
            );
            Ok(exceeded)
        }
    }
}

// ============================================================================
// Cleanup helpers
// ============================================================================

/// Note shown next to a deleted version
pub fn make_b2_delete_note(version: &FileVersion, index: usize, transferred: bool) -> &'static str {
    if version.is_hide_marker() {
        "(hide marker)"
    } else if transferred || index > 0 {
        "(old version)"
    } else {
        ""
    }
}

fn delete_action(
    dest_path: &RemotePath,
    dest_folder: &RemoteFolder,
    version: &FileVersion,
    index: usize,
    transferred: bool,
) -> SyncAction {
    SyncAction::Delete(DeleteAction {
        relative_name: dest_path.relative_path.clone(),
        b2_file_name: dest_folder.make_full_path(&dest_path.relative_path),
        file_id: version.id.clone(),
        note: make_b2_delete_note(version, index, transferred).to_string(),
    })
}

/// Deletes every destination version, except the current one when the
/// source still exists and nothing was transferred over it.
pub fn make_b2_delete_actions(
    source_path: Option<&ScanPath>,
    dest_path: Option<&RemotePath>,
    dest_folder: &RemoteFolder,
    transferred: bool,
) -> Vec<SyncAction> {
    let Some(dest_path) = dest_path else {
        return Vec::new();
    };
    dest_path
        .all_versions
        .iter()
        .enumerate()
        .filter(|(index, _)| !(*index == 0 && source_path.is_some() && !transferred))
        .map(|(index, version)| delete_action(dest_path, dest_folder, version, index, transferred))
        .collect()
}

/// Hides or deletes destination versions outside the retention window.
///
/// Every version that was visible at some point during the last
/// `keep_days` days is kept. With versions aged 5, 15 and 25 days and
/// `keep_days = 10`, only the 25 day old one may go: the 15 day old
/// version was still current 10 days ago.
///
/// Once one version is old enough, every version after it in the list is
/// deleted, even when out-of-order modification times make a later one
/// look younger.
pub fn make_b2_keep_days_actions(
    source_path: Option<&ScanPath>,
    dest_path: Option<&RemotePath>,
    dest_folder: &RemoteFolder,
    transferred: bool,
    keep_days: i64,
    now_millis: i64,
) -> Vec<SyncAction> {
    let Some(dest_path) = dest_path else {
        return Vec::new();
    };
    let keep_millis = keep_days.saturating_mul(ONE_DAY_IN_MS);
    let mut actions = Vec::new();
    let mut deleting = false;

    for (index, version) in dest_path.all_versions.iter().enumerate() {
        let age_millis = now_millis - version.mod_time_millis();
        let too_old = age_millis > keep_millis;

        if index == 0 && source_path.is_none() && version.action == FileAction::Upload {
            actions.push(SyncAction::Hide(HideAction {
                relative_name: dest_path.relative_path.clone(),
                b2_file_name: dest_folder.make_full_path(&dest_path.relative_path),
            }));
        }

        if version.is_hide_marker() && too_old {
            deleting = true;
        }

        if deleting {
            actions.push(delete_action(dest_path, dest_folder, version, index, transferred));
        }

        // everything older than this version goes too
        if too_old {
            deleting = true;
        }
    }
    actions
}

// ============================================================================
// FileSyncPolicy
// ============================================================================

/// Decision for one source/destination pair
#[derive(Debug)]
pub struct FileSyncPolicy<'a> {
    pub kind: PolicyKind,
    pub source_path: Option<&'a ScanPath>,
    pub source_folder: &'a Folder,
    pub dest_path: Option<&'a ScanPath>,
    pub dest_folder: &'a Folder,
    pub now_millis: i64,
    pub options: &'a SyncOptions,
}

fn expect_local<'f>(folder: &'f Folder, role: &str) -> Result<&'f LocalFolder> {
    folder
        .as_local()
        .ok_or_else(|| SyncError::invalid_argument(role, "must be a local folder"))
}

fn expect_remote<'f>(folder: &'f Folder, role: &str) -> Result<&'f RemoteFolder> {
    folder
        .as_remote()
        .ok_or_else(|| SyncError::invalid_argument(role, "must be a b2 folder"))
}

impl FileSyncPolicy<'_> {
    /// Transfer action (if any) followed by cleanup actions.
    pub fn all_actions(&self) -> Result<Vec<SyncAction>> {
        let mut actions = Vec::new();
        let transferred = self.should_transfer()?;
        if transferred {
            actions.push(self.make_transfer_action()?);
        }
        actions.extend(self.hide_delete_actions(transferred)?);
        Ok(actions)
    }

    fn should_transfer(&self) -> Result<bool> {
        let Some(source_path) = self.source_path.filter(|p| p.is_visible()) else {
            return Ok(false);
        };
        let Some(dest_path) = self.dest_path else {
            return Ok(true);
        };
        files_are_different(
            source_path,
            dest_path,
            self.options.compare_threshold,
            self.options.compare_version_mode,
            self.options.newer_file_mode,
            self.kind.sync_type(),
        )
    }

    fn make_transfer_action(&self) -> Result<SyncAction> {
        let source_path = self
            .source_path
            .ok_or_else(|| SyncError::invalid_argument("source_path", "is required to transfer"))?;
        let relative_path = source_path.relative_path();

        match self.kind.sync_type() {
            SyncType::LocalToB2 => {
                let source_folder = expect_local(self.source_folder, "source_folder")?;
                let dest_folder = expect_remote(self.dest_folder, "dest_folder")?;
                let upload = UploadAction::new(
                    source_folder.make_full_path(relative_path)?,
                    relative_path.to_string(),
                    dest_folder.make_full_path(relative_path),
                    source_path.mod_time(),
                    source_path.size(),
                );
                let dest_version = self
                    .dest_path
                    .and_then(ScanPath::as_remote)
                    .map(|p| p.selected_version.clone());
                if self.options.upload_mode == UploadMode::Incremental && self.dest_path.is_some() {
                    Ok(SyncAction::IncrementalUpload(IncrementalUploadAction {
                        upload,
                        file_version: dest_version,
                        absolute_minimum_part_size: self.options.absolute_minimum_part_size,
                    }))
                } else {
                    Ok(SyncAction::Upload(upload))
                }
            }
            SyncType::B2ToLocal => {
                let source_folder = expect_remote(self.source_folder, "source_folder")?;
                let dest_folder = expect_local(self.dest_folder, "dest_folder")?;
                let remote = source_path
                    .as_remote()
                    .ok_or_else(|| SyncError::invalid_argument("source_path", "must be a b2 path"))?;
                Ok(SyncAction::Download(DownloadAction {
                    source_path: remote.clone(),
                    b2_file_name: source_folder.make_full_path(relative_path),
                    local_full_path: dest_folder.make_full_path(relative_path)?,
                    bucket_name: source_folder.bucket_name().to_string(),
                }))
            }
            SyncType::B2ToB2 => {
                let source_folder = expect_remote(self.source_folder, "source_folder")?;
                let dest_folder = expect_remote(self.dest_folder, "dest_folder")?;
                let remote = source_path
                    .as_remote()
                    .ok_or_else(|| SyncError::invalid_argument("source_path", "must be a b2 path"))?;
                Ok(SyncAction::Copy(CopyAction {
                    b2_file_name: source_folder.make_full_path(relative_path),
                    source_path: remote.clone(),
                    dest_b2_file_name: dest_folder.make_full_path(relative_path),
                    source_bucket_name: source_folder.bucket_name().to_string(),
                    dest_bucket_name: dest_folder.bucket_name().to_string(),
                }))
            }
        }
    }

    fn hide_delete_actions(&self, transferred: bool) -> Result<Vec<SyncAction>> {
        let dest_remote = self.dest_path.and_then(ScanPath::as_remote);
        let keep_days = self.options.keep_days.unwrap_or(0);
        match self.kind {
            PolicyKind::Up | PolicyKind::Down | PolicyKind::DownAndKeepDays | PolicyKind::Copy => {
                Ok(Vec::new())
            }
            PolicyKind::UpAndDelete | PolicyKind::CopyAndDelete => Ok(make_b2_delete_actions(
                self.source_path,
                dest_remote,
                expect_remote(self.dest_folder, "dest_folder")?,
                transferred,
            )),
            PolicyKind::UpAndKeepDays | PolicyKind::CopyAndKeepDays => {
                Ok(make_b2_keep_days_actions(
                    self.source_path,
                    dest_remote,
                    expect_remote(self.dest_folder, "dest_folder")?,
                    transferred,
                    keep_days,
                    self.now_millis,
                ))
            }
            PolicyKind::DownAndDelete => {
                let Some(dest_path) = self.dest_path else {
                    return Ok(Vec::new());
                };
                if self.source_path.is_some_and(ScanPath::is_visible) {
                    return Ok(Vec::new());
                }
                let dest_folder = expect_local(self.dest_folder, "dest_folder")?;
                Ok(vec![SyncAction::LocalDelete(LocalDeleteAction {
                    relative_name: dest_path.relative_path().to_string(),
                    full_path: dest_folder.make_full_path(dest_path.relative_path())?,
                })])
            }
        }
    }
}
