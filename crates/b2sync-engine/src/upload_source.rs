//! Local files as upload sources
//!
//! [`LocalUploadSource`] computes the file's SHA1 at most once, and can
//! split an upload into a server-side copy of an unchanged prefix plus an
//! upload of the new tail when the file has only grown.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use b2sync_core::domain::FileVersion;
use b2sync_core::ports::OutboundSource;
use sha1::{Digest, Sha1};
use tracing::debug;

/// Smallest remote version worth reusing in an incremental upload
pub const DEFAULT_MIN_PART_SIZE: u64 = 5_000_000;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Feeds up to `limit` bytes of `reader` into `hasher` (all of it for `None`).
fn update_from_stream(
    hasher: &mut Sha1,
    reader: &mut impl Read,
    limit: Option<u64>,
) -> io::Result<()> {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut remaining = limit;
    loop {
        let want = match remaining {
            Some(0) => return Ok(()),
            Some(n) => buffer.len().min(usize::try_from(n).unwrap_or(usize::MAX)),
            None => buffer.len(),
        };
        let read = reader.read(&mut buffer[..want])?;
        if read == 0 {
            return Ok(());
        }
        hasher.update(&buffer[..read]);
        if let Some(n) = remaining.as_mut() {
            *n -= read as u64;
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Hex SHA1 of everything fed to `hasher` so far, leaving it usable.
fn hex_digest(hasher: &Sha1) -> String {
    to_hex(&hasher.clone().finalize())
}

/// A whole local file to be uploaded
#[derive(Debug)]
pub struct LocalUploadSource {
    path: PathBuf,
    length: u64,
    content_sha1: OnceLock<String>,
}

impl LocalUploadSource {
    /// Source for `path`, whose size is already known.
    pub fn new(path: impl Into<PathBuf>, length: u64) -> Self {
        Self {
            path: path.into(),
            length,
            content_sha1: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn is_sha1_known(&self) -> bool {
        self.content_sha1.get().is_some()
    }

    /// Hex SHA1 of the whole file, read from disk on first use only.
    pub fn content_sha1(&self) -> io::Result<&str> {
        if let Some(sha1) = self.content_sha1.get() {
            return Ok(sha1);
        }
        let mut hasher = Sha1::new();
        let mut reader = BufReader::new(File::open(&self.path)?);
        update_from_stream(&mut hasher, &mut reader, Some(self.length))?;
        let computed = hex_digest(&hasher);
        Ok(self.content_sha1.get_or_init(|| computed))
    }

    /// The whole file as a single outbound source.
    pub fn to_outbound(&self) -> OutboundSource {
        OutboundSource::LocalFile {
            path: self.path.clone(),
            length: self.length,
            content_sha1: self.content_sha1.get().cloned(),
        }
    }

    /// Sources for uploading this file over `file_version`.
    ///
    /// Returns a copy of the remote content followed by the local tail when
    /// the remote version is a byte-for-byte prefix of the local file, and
    /// the whole file otherwise.
    ///
    /// # Arguments
    /// * `file_version` - Current remote version, if any
    /// * `min_part_size` - Smallest reusable remote size (default [`DEFAULT_MIN_PART_SIZE`])
    pub fn incremental_sources(
        &self,
        file_version: Option<&FileVersion>,
        min_part_size: Option<u64>,
    ) -> io::Result<Vec<OutboundSource>> {
        let path = self.path.display();
        let Some(file_version) = file_version else {
            debug!(path = %path, "full upload: no matching file on server");
            return Ok(vec![self.to_outbound()]);
        };

        let min_part_size = min_part_size.unwrap_or(DEFAULT_MIN_PART_SIZE);
        if file_version.size < min_part_size {
            debug!(path = %path, min_part_size, "full upload: remote file is below minimum part size");
            return Ok(vec![self.to_outbound()]);
        }

        if self.length < file_version.size {
            debug!(path = %path, "full upload: local file is smaller than remote");
            return Ok(vec![self.to_outbound()]);
        }

        let Some(remote_sha1) = file_version.content_sha1() else {
            debug!(path = %path, "full upload: remote content SHA1 unknown");
            return Ok(vec![self.to_outbound()]);
        };

        let mut hasher = Sha1::new();
        let mut reader = BufReader::new(File::open(&self.path)?);
        update_from_stream(&mut hasher, &mut reader, Some(file_version.size))?;
        if hex_digest(&hasher) != remote_sha1 {
            debug!(path = %path, "full upload: content in common range differs");
            // the prefix is already hashed; finish the whole-file hash from here
            update_from_stream(&mut hasher, &mut reader, Some(self.length - file_version.size))?;
            let whole = hex_digest(&hasher);
            let _ = self.content_sha1.set(whole);
            return Ok(vec![self.to_outbound()]);
        }

        debug!(path = %path, reused = file_version.size, "incremental upload is possible");
        let encryption = file_version
            .server_side_encryption
            .clone()
            .filter(|setting| !setting.is_unknown());
        Ok(vec![
            OutboundSource::Copy {
                file_id: file_version.id.clone(),
                offset: 0,
                length: file_version.size,
                encryption,
                file_info: file_version.file_info.clone(),
                content_type: file_version.content_type.clone(),
            },
            OutboundSource::LocalFileRange {
                path: self.path.clone(),
                offset: file_version.size,
                length: self.length - file_version.size,
            },
        ])
    }
}

/// Hex SHA1 of an in-memory buffer
pub fn hex_sha1_of_bytes(data: &[u8]) -> String {
    to_hex(&Sha1::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use b2sync_core::domain::{EncryptionSetting, FileAction};
    use tempfile::TempDir;

    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> LocalUploadSource {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        LocalUploadSource::new(path, content.len() as u64)
    }

    fn remote_version(content: &[u8], sha1: Option<String>) -> FileVersion {
        FileVersion {
            id: "id_remote".to_string(),
            file_name: "folder/file.bin".to_string(),
            size: content.len() as u64,
            content_type: Some("application/octet-stream".to_string()),
            content_sha1: sha1,
            file_info: BTreeMap::new(),
            upload_timestamp: 1_000,
            action: FileAction::Upload,
            server_side_encryption: None,
        }
    }

    #[test]
    fn test_sha1_is_computed_once() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "abc", b"abc");
        assert!(!source.is_sha1_known());
        assert_eq!(source.content_sha1().unwrap(), ABC_SHA1);

        // the cached value survives the file going away
        std::fs::remove_file(source.path()).unwrap();
        assert_eq!(source.content_sha1().unwrap(), ABC_SHA1);
        assert!(source.is_sha1_known());
    }

    #[test]
    fn test_hex_sha1_of_bytes() {
        assert_eq!(hex_sha1_of_bytes(b"abc"), ABC_SHA1);
    }

    #[test]
    fn test_incremental_split() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "f", b"0123456789abcdef");
        let mut remote = remote_version(b"0123456789", Some(hex_sha1_of_bytes(b"0123456789")));
        remote.server_side_encryption = Some(EncryptionSetting::sse_b2());

        let sources = source.incremental_sources(Some(&remote), Some(5)).unwrap();
        assert_eq!(sources.len(), 2);
        match &sources[0] {
            OutboundSource::Copy {
                file_id,
                offset,
                length,
                encryption,
                ..
            } => {
                assert_eq!(file_id, "id_remote");
                assert_eq!((*offset, *length), (0, 10));
                assert_eq!(encryption, &Some(EncryptionSetting::sse_b2()));
            }
            other => panic!("expected copy source, got {other:?}"),
        }
        assert_eq!(
            sources[1],
            OutboundSource::LocalFileRange {
                path: source.path().to_path_buf(),
                offset: 10,
                length: 6,
            }
        );
    }

    #[test]
    fn test_unknown_encryption_is_not_passed_on() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "f", b"0123456789abcdef");
        let mut remote = remote_version(b"0123456789", Some(hex_sha1_of_bytes(b"0123456789")));
        remote.server_side_encryption = Some(EncryptionSetting {
            mode: b2sync_core::domain::EncryptionMode::Unknown,
            algorithm: None,
            key_id: None,
        });
        let sources = source.incremental_sources(Some(&remote), Some(5)).unwrap();
        assert!(matches!(&sources[0], OutboundSource::Copy { encryption: None, .. }));
    }

    // --- fallbacks ---

    fn assert_full(sources: &[OutboundSource]) {
        assert_eq!(sources.len(), 1);
        assert!(matches!(sources[0], OutboundSource::LocalFile { .. }));
    }

    #[test]
    fn test_fallback_without_remote_version() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "f", b"0123456789abcdef");
        assert_full(&source.incremental_sources(None, Some(5)).unwrap());
    }

    #[test]
    fn test_fallback_when_remote_below_min_part_size() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "f", b"0123456789abcdef");
        let remote = remote_version(b"0123456789", Some(hex_sha1_of_bytes(b"0123456789")));
        assert_full(&source.incremental_sources(Some(&remote), None).unwrap());
        assert_full(&source.incremental_sources(Some(&remote), Some(11)).unwrap());
    }

    #[test]
    fn test_fallback_when_local_is_smaller() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "f", b"01234");
        let remote = remote_version(b"0123456789", Some(hex_sha1_of_bytes(b"0123456789")));
        assert_full(&source.incremental_sources(Some(&remote), Some(5)).unwrap());
    }

    #[test]
    fn test_fallback_when_remote_sha1_unknown() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "f", b"0123456789abcdef");
        for sha1 in [None, Some("none".to_string())] {
            let remote = remote_version(b"0123456789", sha1);
            assert_full(&source.incremental_sources(Some(&remote), Some(5)).unwrap());
        }
    }

    #[test]
    fn test_fallback_on_mismatch_caches_whole_sha1() {
        let dir = TempDir::new().unwrap();
        let content = b"XXXXXXXXXXabcdef";
        let source = write_file(&dir, "f", content);
        let remote = remote_version(b"0123456789", Some(hex_sha1_of_bytes(b"0123456789")));

        let sources = source.incremental_sources(Some(&remote), Some(5)).unwrap();
        assert_full(&sources);
        assert!(source.is_sha1_known());
        match &sources[0] {
            OutboundSource::LocalFile { content_sha1, .. } => {
                assert_eq!(content_sha1.as_deref(), Some(hex_sha1_of_bytes(content).as_str()));
            }
            other => panic!("expected local file, got {other:?}"),
        }
    }
}
