//! Integration test: local and remote scans → sorted merge
//!
//! Builds real directory trees in a temp dir and in-memory buckets, then
//! checks the order and pairing of what the scanners and the merge yield.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use b2sync_core::domain::{FileAction, FileVersion, ScanPath};
use b2sync_core::ports::IBucket;
use b2sync_engine::report::ProgressReport;
use b2sync_engine::scan::{
    parse_folder, zip_folders, Folder, LocalFolder, RemoteFolder, ScanPolicy, ScanPolicyOptions,
};
use b2sync_engine::simulator::InMemoryApi;
use b2sync_engine::SyncError;
use tempfile::TempDir;

mod common;

use common::SharedBuffer;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn names(folder: &Folder, policy: &ScanPolicy) -> Vec<String> {
    folder
        .all_files(None, policy)
        .map(|p| p.unwrap().relative_path().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Local scan
// ---------------------------------------------------------------------------

#[test]
fn test_local_scan_uses_bucket_name_order() {
    let dir = TempDir::new().unwrap();
    for name in ["a0.txt", "a/c.txt", "a.txt", "a/b.txt"] {
        write(dir.path(), name, name);
    }
    let folder = Folder::Local(LocalFolder::new(dir.path()).unwrap());

    assert_eq!(
        names(&folder, &ScanPolicy::default()),
        vec!["a.txt", "a/b.txt", "a/c.txt", "a0.txt"]
    );
}

#[test]
fn test_local_scan_applies_policy() {
    let dir = TempDir::new().unwrap();
    for name in ["keep.txt", "skip.log", "build/out.txt", "src/main.rs"] {
        write(dir.path(), name, "x");
    }
    let folder = Folder::Local(LocalFolder::new(dir.path()).unwrap());
    let policy = ScanPolicy::new(ScanPolicyOptions {
        exclude_dir_regexes: vec!["build".to_string()],
        exclude_file_regexes: vec![r".*\.log".to_string()],
        ..ScanPolicyOptions::default()
    })
    .unwrap();

    assert_eq!(names(&folder, &policy), vec!["keep.txt", "src/main.rs"]);
}

#[test]
fn test_local_scan_reports_sizes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "five.txt", "12345");
    let folder = Folder::Local(LocalFolder::new(dir.path()).unwrap());

    let paths: Vec<ScanPath> = folder
        .all_files(None, &ScanPolicy::default())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(paths.len(), 1);
    let local = paths[0].as_local().unwrap();
    assert_eq!(local.size, 5);
    assert_eq!(local.absolute_path, dir.path().join("five.txt"));
}

#[test]
fn test_overlong_relative_path_is_skipped_with_warning() {
    let dir = TempDir::new().unwrap();
    let segment = "d".repeat(201);
    let deep = vec![segment.as_str(); 6].join("/");
    write(dir.path(), &format!("{deep}/f.txt"), "x");
    write(dir.path(), "short.txt", "y");
    let folder = Folder::Local(LocalFolder::new(dir.path()).unwrap());
    let report = ProgressReport::new(Box::new(SharedBuffer::new()), true);

    let found: Vec<String> = folder
        .all_files(Some(&report), &ScanPolicy::default())
        .map(|p| p.unwrap().relative_path().to_string())
        .collect();

    assert_eq!(found, vec!["short.txt"]);
    let warnings = report.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("file name too long (more than 1000 utf-8 bytes)"));
}

#[cfg(unix)]
#[test]
fn test_circular_symlink_is_reported_once_per_branch() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "d/f.txt", "x");
    std::os::unix::fs::symlink(dir.path(), dir.path().join("d/loop")).unwrap();
    let folder = Folder::Local(LocalFolder::new(dir.path()).unwrap());
    let report = ProgressReport::new(Box::new(SharedBuffer::new()), true);

    let found: Vec<String> = folder
        .all_files(Some(&report), &ScanPolicy::default())
        .map(|p| p.unwrap().relative_path().to_string())
        .collect();

    assert_eq!(found.first().map(String::as_str), Some("d/f.txt"));
    assert!(report
        .warnings()
        .iter()
        .any(|w| w.contains("is a circular symlink, which was already visited")));
}

#[cfg(unix)]
#[test]
fn test_excluded_symlinks_are_not_followed() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "real.txt", "x");
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();
    let folder = Folder::Local(LocalFolder::new(dir.path()).unwrap());
    let policy = ScanPolicy::new(ScanPolicyOptions {
        exclude_all_symlinks: true,
        ..ScanPolicyOptions::default()
    })
    .unwrap();

    assert_eq!(names(&folder, &policy), vec!["real.txt"]);
    assert_eq!(
        names(&folder, &ScanPolicy::default()),
        vec!["link.txt", "real.txt"]
    );
}

// ---------------------------------------------------------------------------
// Remote scan
// ---------------------------------------------------------------------------

#[test]
fn test_remote_scan_groups_versions_under_prefix() {
    let api = InMemoryApi::new();
    let bucket = api.create_bucket("bucket");
    bucket.upload_bytes("photos/a.jpg", b"v1", 100);
    bucket.upload_bytes("photos/a.jpg", b"v2", 200);
    bucket.upload_bytes("photos/b/c.jpg", b"c", 100);
    bucket.upload_bytes("other/x.txt", b"x", 100);

    let folder = parse_folder("b2://bucket/photos", &api).unwrap();
    let paths: Vec<ScanPath> = folder
        .all_files(None, &ScanPolicy::default())
        .collect::<Result<_, _>>()
        .unwrap();

    let relative: Vec<&str> = paths.iter().map(ScanPath::relative_path).collect();
    assert_eq!(relative, vec!["a.jpg", "b/c.jpg"]);
    let remote = paths[0].as_remote().unwrap();
    assert_eq!(remote.all_versions.len(), 2);
    assert_eq!(remote.selected_version.mod_time_millis(), 200);
}

#[test]
fn test_remote_scan_rejects_relative_names() {
    let bucket = InMemoryApi::new().create_bucket("bucket");
    bucket.add_raw_version(
        FileVersion {
            id: "id_raw".to_string(),
            file_name: "../x".to_string(),
            size: 1,
            content_type: None,
            content_sha1: None,
            file_info: Default::default(),
            upload_timestamp: 1,
            action: FileAction::Upload,
            server_side_encryption: None,
        },
        b"x",
    );
    let folder = Folder::Remote(RemoteFolder::with_bucket(bucket as Arc<dyn IBucket>, ""));

    let results: Vec<_> = folder.all_files(None, &ScanPolicy::default()).collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        Err(SyncError::UnsupportedFilename { .. })
    ));
}

#[test]
fn test_unknown_bucket_is_an_error() {
    let api = InMemoryApi::new();
    let err = parse_folder("b2://missing", &api).unwrap_err();
    assert!(err.to_string().contains("bucket not found: missing"));
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[test]
fn test_merge_pairs_every_name_once() {
    let dir = TempDir::new().unwrap();
    for name in ["a.txt", "b.txt", "d/e.txt"] {
        write(dir.path(), name, "x");
    }
    let api = InMemoryApi::new();
    let bucket = api.create_bucket("bucket");
    for name in ["b.txt", "c.txt", "d/e.txt", "z.txt"] {
        bucket.upload_bytes(name, b"x", 1);
    }
    let local = Folder::Local(LocalFolder::new(dir.path()).unwrap());
    let remote = parse_folder("b2://bucket", &api).unwrap();
    let policy = ScanPolicy::default();

    let pairs: Vec<(String, bool, bool)> = zip_folders(&local, &remote, None, &policy, &policy)
        .map(|pair| {
            let (a, b) = pair.unwrap();
            let name = a
                .as_ref()
                .or(b.as_ref())
                .map(|p| p.relative_path().to_string())
                .unwrap();
            (name, a.is_some(), b.is_some())
        })
        .collect();

    assert_eq!(
        pairs,
        vec![
            ("a.txt".to_string(), true, false),
            ("b.txt".to_string(), true, true),
            ("c.txt".to_string(), false, true),
            ("d/e.txt".to_string(), true, true),
            ("z.txt".to_string(), false, true),
        ]
    );
}

#[test]
fn test_clean_merge_reports_no_warnings() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.txt", "x");
    let api = InMemoryApi::new();
    api.create_bucket("bucket");
    let local = Folder::Local(LocalFolder::new(dir.path()).unwrap());
    let remote = parse_folder("b2://bucket", &api).unwrap();
    let policy = ScanPolicy::default();
    let report = ProgressReport::new(Box::new(SharedBuffer::new()), true);

    let count = zip_folders(&local, &remote, Some(&report), &policy, &policy).count();

    assert_eq!(count, 1);
    assert!(!report.has_errors_or_warnings());
}
