//! Integration test: Synchronizer → in-memory buckets and temp dirs
//!
//! Every direction (up, down, bucket to bucket) is run end to end against
//! the simulator, checking what ends up stored and what the report says.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use b2sync_core::domain::{
    CompareVersionMode, FileAction, FileVersion, KeepOrDeleteMode, NewerFileSyncMode, UploadMode,
    SRC_LAST_MODIFIED_MILLIS,
};
use b2sync_core::ports::IBucket;
use b2sync_engine::policy::ONE_DAY_IN_MS;
use b2sync_engine::report::SyncReport;
use b2sync_engine::scan::{Folder, LocalFolder, RemoteFolder, ScanPolicy};
use b2sync_engine::simulator::{InMemoryApi, InMemoryBucket};
use b2sync_engine::synchronizer::{SyncOptions, Synchronizer};
use b2sync_engine::upload_source::hex_sha1_of_bytes;
use b2sync_engine::SyncError;
use filetime::FileTime;
use tempfile::TempDir;

mod common;

use common::SharedBuffer;

const NOW: i64 = 1_700_000_000_000;

fn write_with_mtime(root: &Path, relative: &str, content: &[u8], mod_time_millis: i64) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    let mtime = FileTime::from_unix_time(
        mod_time_millis / 1000,
        ((mod_time_millis % 1000) * 1_000_000) as u32,
    );
    filetime::set_file_mtime(&path, mtime).unwrap();
}

fn local(dir: &TempDir) -> Folder {
    Folder::Local(LocalFolder::new(dir.path()).unwrap())
}

fn remote(bucket: &Arc<InMemoryBucket>, folder_name: &str) -> Folder {
    Folder::Remote(RemoteFolder::with_bucket(
        Arc::clone(bucket) as Arc<dyn IBucket>,
        folder_name,
    ))
}

fn synchronizer(options: SyncOptions) -> Synchronizer {
    Synchronizer::new(options, ScanPolicy::default()).unwrap()
}

fn report() -> (Arc<SyncReport>, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let report = Arc::new(SyncReport::new(Box::new(buffer.clone()), true));
    (report, buffer)
}

// ---------------------------------------------------------------------------
// Local to bucket
// ---------------------------------------------------------------------------

#[test]
fn test_upload_then_second_run_transfers_nothing() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "a.txt", b"hello", NOW - 5_000);
    write_with_mtime(dir.path(), "sub/b.txt", b"world!", NOW - 3_000);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    let sync = synchronizer(SyncOptions::default());

    let (first, _) = report();
    sync.sync_folders(&local(&dir), &remote(&bucket, "backup"), NOW, Some(Arc::clone(&first)))
        .unwrap();

    assert_eq!(
        bucket.visible_file_names(),
        vec!["backup/a.txt", "backup/sub/b.txt"]
    );
    assert_eq!(bucket.content_of("backup/sub/b.txt").unwrap(), b"world!");
    let stored = &bucket.versions_of("backup/a.txt")[0];
    assert_eq!(
        stored.file_info.get(SRC_LAST_MODIFIED_MILLIS).map(String::as_str),
        Some((NOW - 5_000).to_string().as_str())
    );
    let snapshot = first.snapshot();
    assert_eq!(snapshot.transfer_files, 2);
    assert_eq!(snapshot.transfer_bytes, 11);
    assert!(snapshot.closed);

    let (second, _) = report();
    sync.sync_folders(&local(&dir), &remote(&bucket, "backup"), NOW, Some(Arc::clone(&second)))
        .unwrap();
    assert_eq!(bucket.operations().len(), 2);
    assert_eq!(second.snapshot().transfer_files, 0);
    assert_eq!(second.snapshot().total_transfer_files, 0);
}

#[test]
fn test_modtime_threshold_is_exclusive() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "near.txt", b"local", NOW + 10);
    write_with_mtime(dir.path(), "far.txt", b"local", NOW + 11);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("near.txt", b"remote", NOW);
    bucket.upload_bytes("far.txt", b"remote", NOW);
    let sync = synchronizer(SyncOptions {
        compare_threshold: 10,
        ..SyncOptions::default()
    });

    sync.sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
        .unwrap();

    assert_eq!(bucket.content_of("near.txt").unwrap(), b"remote");
    assert_eq!(bucket.content_of("far.txt").unwrap(), b"local");
}

#[test]
fn test_size_compare_ignores_modtime() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "same.txt", b"12345", NOW - 100_000);
    write_with_mtime(dir.path(), "grown.txt", b"123456", NOW - 100_000);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("same.txt", b"abcde", NOW);
    bucket.upload_bytes("grown.txt", b"abcde", NOW);
    let sync = synchronizer(SyncOptions {
        compare_version_mode: CompareVersionMode::Size,
        ..SyncOptions::default()
    });

    sync.sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
        .unwrap();

    assert_eq!(bucket.operations(), vec!["upload grown.txt"]);
}

#[test]
fn test_newer_destination_aborts_by_default() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "a.txt", b"old", NOW - 60_000);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("a.txt", b"new", NOW);

    let err = synchronizer(SyncOptions::default())
        .sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
        .unwrap_err();

    assert!(matches!(err, SyncError::DestFileNewer { .. }));
    assert!(err.to_string().starts_with(
        "source file is older than destination: local://a.txt with a time of"
    ));
    assert_eq!(bucket.content_of("a.txt").unwrap(), b"new");
}

#[test]
fn test_newer_destination_can_be_replaced_or_skipped() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "a.txt", b"old", NOW - 60_000);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("a.txt", b"new", NOW);

    synchronizer(SyncOptions {
        newer_file_mode: NewerFileSyncMode::Skip,
        ..SyncOptions::default()
    })
    .sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
    .unwrap();
    assert_eq!(bucket.content_of("a.txt").unwrap(), b"new");

    synchronizer(SyncOptions {
        newer_file_mode: NewerFileSyncMode::Replace,
        ..SyncOptions::default()
    })
    .sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
    .unwrap();
    assert_eq!(bucket.content_of("a.txt").unwrap(), b"old");
}

#[test]
fn test_delete_mode_removes_extra_versions() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "a.txt", b"v2", NOW);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("a.txt", b"v1", NOW - 60_000);
    bucket.upload_bytes("gone.txt", b"x", NOW - 60_000);
    let sync = synchronizer(SyncOptions {
        keep_mode: KeepOrDeleteMode::Delete,
        ..SyncOptions::default()
    });

    sync.sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
        .unwrap();

    assert_eq!(bucket.visible_file_names(), vec!["a.txt"]);
    assert_eq!(bucket.versions_of("a.txt").len(), 1);
    assert_eq!(bucket.content_of("a.txt").unwrap(), b"v2");
    assert!(bucket.versions_of("gone.txt").is_empty());
}

#[test]
fn test_keep_days_hides_and_expires() {
    let dir = TempDir::new().unwrap();
    let current = NOW - ONE_DAY_IN_MS / 2;
    write_with_mtime(dir.path(), "a.txt", b"v3", current);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("a.txt", b"v1", NOW - 3 * ONE_DAY_IN_MS);
    bucket.upload_bytes("a.txt", b"v2", NOW - 2 * ONE_DAY_IN_MS);
    bucket.upload_bytes("a.txt", b"v3", current);
    bucket.upload_bytes("gone.txt", b"x", current);
    let sync = synchronizer(SyncOptions {
        keep_mode: KeepOrDeleteMode::KeepBeforeDelete,
        keep_days: Some(1),
        ..SyncOptions::default()
    });

    sync.sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
        .unwrap();

    // v2 was current one day ago, so only v1 goes
    let remaining: Vec<i64> = bucket
        .versions_of("a.txt")
        .iter()
        .map(FileVersion::mod_time_millis)
        .collect();
    assert_eq!(remaining, vec![current, NOW - 2 * ONE_DAY_IN_MS]);
    assert_eq!(bucket.visible_file_names(), vec!["a.txt"]);
    assert_eq!(bucket.versions_of("gone.txt")[0].action, FileAction::Hide);
}

#[test]
fn test_incremental_upload_reuses_remote_prefix() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "log.txt", b"0123456789abc", NOW);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("log.txt", b"0123456789", NOW - 60_000);
    let sync = synchronizer(SyncOptions {
        upload_mode: UploadMode::Incremental,
        absolute_minimum_part_size: Some(5),
        ..SyncOptions::default()
    });

    sync.sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
        .unwrap();

    assert_eq!(
        bucket.operations().last().map(String::as_str),
        Some("incremental_upload log.txt")
    );
    assert_eq!(bucket.content_of("log.txt").unwrap(), b"0123456789abc");
    let whole = hex_sha1_of_bytes(b"0123456789abc");
    assert_eq!(
        bucket.versions_of("log.txt")[0].content_sha1(),
        Some(whole.as_str())
    );
}

#[test]
fn test_failed_action_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "a.txt", b"a", NOW);
    write_with_mtime(dir.path(), "b.txt", b"b", NOW);
    write_with_mtime(dir.path(), "c.txt", b"c", NOW);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.fail_on("b.txt");
    let (report, buffer) = report();

    let err = synchronizer(SyncOptions::default())
        .sync_folders(&local(&dir), &remote(&bucket, ""), NOW, Some(Arc::clone(&report)))
        .unwrap_err();

    assert!(matches!(err, SyncError::IncompleteSync { failed: 1 }));
    assert_eq!(bucket.visible_file_names(), vec!["a.txt", "c.txt"]);
    assert!(report.snapshot().errors_encountered);
    assert!(buffer.contents().contains("injected failure for b.txt"));
}

#[test]
fn test_dry_run_changes_nothing() {
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "a.txt", b"a", NOW);
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("extra.txt", b"x", NOW);
    let (report, buffer) = report();
    let sync = synchronizer(SyncOptions {
        dry_run: true,
        keep_mode: KeepOrDeleteMode::Delete,
        ..SyncOptions::default()
    });

    sync.sync_folders(&local(&dir), &remote(&bucket, ""), NOW, Some(report))
        .unwrap();

    assert!(bucket.operations().is_empty());
    assert_eq!(bucket.visible_file_names(), vec!["extra.txt"]);
    let output = buffer.contents();
    assert!(output.contains("upload a.txt"));
    assert!(output.contains("delete extra.txt"));
}

#[test]
fn test_empty_source_is_rejected_unless_allowed() {
    let dir = TempDir::new().unwrap();
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.upload_bytes("a.txt", b"a", NOW);

    let (rejected, _) = report();
    let err = synchronizer(SyncOptions {
        keep_mode: KeepOrDeleteMode::Delete,
        ..SyncOptions::default()
    })
    .sync_folders(&local(&dir), &remote(&bucket, ""), NOW, Some(Arc::clone(&rejected)))
    .unwrap_err();
    assert!(matches!(err, SyncError::EmptyDirectory(_)));
    assert_eq!(bucket.visible_file_names(), vec!["a.txt"]);
    assert!(rejected.snapshot().closed);

    synchronizer(SyncOptions {
        keep_mode: KeepOrDeleteMode::Delete,
        allow_empty_source: true,
        ..SyncOptions::default()
    })
    .sync_folders(&local(&dir), &remote(&bucket, ""), NOW, None)
    .unwrap();
    assert!(bucket.visible_file_names().is_empty());
}

// ---------------------------------------------------------------------------
// Bucket to local
// ---------------------------------------------------------------------------

#[test]
fn test_download_sets_mtime_and_deletes_extras() {
    let source = InMemoryApi::new().create_bucket("bucket");
    source.upload_bytes("docs/a.txt", b"remote a", NOW - 10_000);
    source.upload_bytes("docs/sub/b.txt", b"remote b", NOW - 20_000);
    let dir = TempDir::new().unwrap();
    write_with_mtime(dir.path(), "extra.txt", b"stale", NOW - 50_000);
    let sync = synchronizer(SyncOptions {
        keep_mode: KeepOrDeleteMode::Delete,
        ..SyncOptions::default()
    });

    sync.sync_folders(&remote(&source, "docs"), &local(&dir), NOW, None)
        .unwrap();

    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"remote a");
    assert_eq!(fs::read(dir.path().join("sub/b.txt")).unwrap(), b"remote b");
    assert!(!dir.path().join("extra.txt").exists());
    let metadata = fs::metadata(dir.path().join("a.txt")).unwrap();
    assert_eq!(
        FileTime::from_last_modification_time(&metadata).unix_seconds(),
        (NOW - 10_000) / 1000
    );
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".b2.sync.tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_download_creates_missing_destination() {
    let source = InMemoryApi::new().create_bucket("bucket");
    source.upload_bytes("a.txt", b"a", NOW);
    let parent = TempDir::new().unwrap();
    let dest = parent.path().join("new-dir");

    synchronizer(SyncOptions::default())
        .sync_folders(
            &remote(&source, ""),
            &Folder::Local(LocalFolder::new(&dest).unwrap()),
            NOW,
            None,
        )
        .unwrap();

    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"a");
}

#[test]
fn test_keep_days_cannot_target_local_folder() {
    let source = InMemoryApi::new().create_bucket("bucket");
    source.upload_bytes("a.txt", b"a", NOW);
    let dir = TempDir::new().unwrap();

    let err = synchronizer(SyncOptions {
        keep_mode: KeepOrDeleteMode::KeepBeforeDelete,
        keep_days: Some(1),
        ..SyncOptions::default()
    })
    .sync_folders(&remote(&source, ""), &local(&dir), NOW, None)
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "keep_days_or_delete cannot be used for local files"
    );
    assert!(!dir.path().join("a.txt").exists());
}

#[test]
fn test_unsafe_remote_name_stops_download() {
    let source = InMemoryApi::new().create_bucket("bucket");
    source.add_raw_version(
        FileVersion {
            id: "id_raw".to_string(),
            file_name: "../escape.txt".to_string(),
            size: 1,
            content_type: None,
            content_sha1: None,
            file_info: Default::default(),
            upload_timestamp: NOW,
            action: FileAction::Upload,
            server_side_encryption: None,
        },
        b"x",
    );
    let parent = TempDir::new().unwrap();
    let dest = parent.path().join("dest");

    let err = synchronizer(SyncOptions::default())
        .sync_folders(
            &remote(&source, ""),
            &Folder::Local(LocalFolder::new(&dest).unwrap()),
            NOW,
            None,
        )
        .unwrap_err();

    assert!(matches!(err, SyncError::UnsupportedFilename { .. }));
    assert!(!parent.path().join("escape.txt").exists());
}

// ---------------------------------------------------------------------------
// Bucket to bucket
// ---------------------------------------------------------------------------

#[test]
fn test_copy_between_buckets() {
    let api = InMemoryApi::new();
    let source = api.create_bucket("src");
    let dest = api.create_bucket("dst");
    source.upload_bytes("a.txt", b"aaa", NOW - 1_000);
    source.upload_bytes("sub/b.txt", b"bb", NOW - 2_000);
    dest.upload_bytes("old.txt", b"o", NOW - 3_000);
    let sync = synchronizer(SyncOptions {
        keep_mode: KeepOrDeleteMode::Delete,
        ..SyncOptions::default()
    });

    sync.sync_folders(&remote(&source, ""), &remote(&dest, "mirror"), NOW, None)
        .unwrap();

    assert_eq!(
        dest.visible_file_names(),
        vec!["mirror/a.txt", "mirror/sub/b.txt", "old.txt"]
    );
    assert_eq!(dest.content_of("mirror/a.txt").unwrap(), b"aaa");
    assert_eq!(
        dest.versions_of("mirror/sub/b.txt")[0].mod_time_millis(),
        NOW - 2_000
    );
    // buckets of one API share the operation log
    let mut operations = dest.operations();
    operations.sort();
    assert_eq!(operations, vec!["copy mirror/a.txt", "copy mirror/sub/b.txt"]);
}

#[test]
fn test_local_to_local_is_unsupported() {
    let a = TempDir::new().unwrap();
    write_with_mtime(a.path(), "a.txt", b"a", NOW);
    let b = TempDir::new().unwrap();

    let (report, _) = report();
    let err = synchronizer(SyncOptions::default())
        .sync_folders(&local(&a), &local(&b), NOW, Some(Arc::clone(&report)))
        .unwrap_err();

    assert!(matches!(err, SyncError::UnsupportedSyncDirection { .. }));
    assert!(report.snapshot().closed);
}
