//! In-memory storage backend
//!
//! [`InMemoryApi`] and [`InMemoryBucket`] implement the bucket ports on top
//! of plain maps, keeping every version of every name. They stand in for a
//! real storage client in tests and dry environments.
//!
//! Version ids are unique across all buckets of one [`InMemoryApi`], so a
//! bucket can copy from any other bucket of the same API. Upload timestamps
//! come from a settable clock that advances by one millisecond per write,
//! which keeps "newest first" well defined.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use b2sync_core::domain::{
    EncryptionSetting, FileAction, FileVersion, LARGE_FILE_SHA1, SRC_LAST_MODIFIED_MILLIS,
};
use b2sync_core::ports::{
    CopyRequest, DownloadedFile, IBucket, IBucketProvider, IProgressListener, OutboundSource,
    UploadRequest, VersionListing,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::upload_source::hex_sha1_of_bytes;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Stream that fails on every read
struct BrokenStream;

impl Read for BrokenStream {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "injected read failure",
        ))
    }
}

#[derive(Debug, Clone)]
struct StoredVersion {
    version: FileVersion,
    content: Arc<Vec<u8>>,
}

/// name -> versions, newest first
type BucketFiles = BTreeMap<String, Vec<StoredVersion>>;

#[derive(Debug, Default)]
struct ApiState {
    buckets: BTreeMap<String, BucketFiles>,
    next_id: u64,
    clock: i64,
    failing_names: HashSet<String>,
    /// Downloads of these names stop with an error halfway through
    interrupted_reads: HashSet<String>,
    operations: Vec<String>,
}

impl ApiState {
    fn files(&mut self, bucket: &str) -> &mut BucketFiles {
        self.buckets.entry(bucket.to_string()).or_default()
    }

    fn tick(&mut self) -> (String, i64) {
        self.next_id += 1;
        let now = self.clock;
        self.clock += 1;
        (format!("id_{:06}", self.next_id), now)
    }

    fn check_failure(&self, file_name: &str) -> anyhow::Result<()> {
        if self.failing_names.contains(file_name) {
            bail!("injected failure for {file_name}");
        }
        Ok(())
    }

    fn find(&self, file_id: &str) -> Option<&StoredVersion> {
        self.buckets
            .values()
            .flat_map(|files| files.values())
            .flatten()
            .find(|stored| stored.version.id == file_id)
    }

    fn store(&mut self, bucket: &str, version: FileVersion, content: Vec<u8>) -> FileVersion {
        let stored = StoredVersion {
            version: version.clone(),
            content: Arc::new(content),
        };
        self.files(bucket)
            .entry(version.file_name.clone())
            .or_default()
            .insert(0, stored);
        version
    }
}

// ============================================================================
// InMemoryApi
// ============================================================================

/// A set of in-memory buckets sharing one id space and one clock
#[derive(Debug, Clone, Default)]
pub struct InMemoryApi {
    state: Arc<Mutex<ApiState>>,
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or open) a bucket.
    pub fn create_bucket(&self, name: &str) -> Arc<InMemoryBucket> {
        self.state.lock().files(name);
        Arc::new(InMemoryBucket {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    /// Set the clock used for upload timestamps (milliseconds).
    pub fn set_time(&self, millis: i64) {
        self.state.lock().clock = millis;
    }
}

impl IBucketProvider for InMemoryApi {
    fn get_bucket_by_name(&self, name: &str) -> anyhow::Result<Arc<dyn IBucket>> {
        if !self.state.lock().buckets.contains_key(name) {
            bail!("bucket not found: {name}");
        }
        Ok(Arc::new(InMemoryBucket {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

// ============================================================================
// InMemoryBucket
// ============================================================================

/// One bucket of an [`InMemoryApi`]
#[derive(Debug, Clone)]
pub struct InMemoryBucket {
    name: String,
    state: Arc<Mutex<ApiState>>,
}

impl InMemoryBucket {
    /// A bucket with its own private API.
    pub fn new(name: &str) -> Self {
        let mut state = ApiState::default();
        state.files(name);
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Set the clock used for upload timestamps (milliseconds).
    pub fn set_time(&self, millis: i64) {
        self.state.lock().clock = millis;
    }

    /// Make every later operation on `file_name` fail.
    pub fn fail_on(&self, file_name: &str) {
        self.state.lock().failing_names.insert(file_name.to_string());
    }

    /// Make later downloads of `file_name` deliver half the content, then fail.
    pub fn interrupt_reads_of(&self, file_name: &str) {
        self.state
            .lock()
            .interrupted_reads
            .insert(file_name.to_string());
    }

    /// Store `content` as a new version with the given modification time.
    pub fn upload_bytes(&self, file_name: &str, content: &[u8], mod_time_millis: i64) -> FileVersion {
        let mut state = self.state.lock();
        let (id, upload_timestamp) = state.tick();
        let version = FileVersion {
            id,
            file_name: file_name.to_string(),
            size: content.len() as u64,
            content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
            content_sha1: Some(hex_sha1_of_bytes(content)),
            file_info: BTreeMap::from([(
                SRC_LAST_MODIFIED_MILLIS.to_string(),
                mod_time_millis.to_string(),
            )]),
            upload_timestamp,
            action: FileAction::Upload,
            server_side_encryption: None,
        };
        state.store(&self.name, version, content.to_vec())
    }

    /// Store a version exactly as given, as the newest one of its name.
    pub fn add_raw_version(&self, version: FileVersion, content: &[u8]) {
        self.state.lock().store(&self.name, version, content.to_vec());
    }

    /// Every version of `file_name`, newest first
    pub fn versions_of(&self, file_name: &str) -> Vec<FileVersion> {
        self.state
            .lock()
            .files(&self.name)
            .get(file_name)
            .map(|versions| versions.iter().map(|s| s.version.clone()).collect())
            .unwrap_or_default()
    }

    /// Content of the newest version, unless it is a hide marker
    pub fn content_of(&self, file_name: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        let newest = state.files(&self.name).get(file_name)?.first()?;
        (newest.version.action == FileAction::Upload).then(|| newest.content.to_vec())
    }

    /// Names whose newest version is visible, in name order
    pub fn visible_file_names(&self) -> Vec<String> {
        let mut state = self.state.lock();
        state
            .files(&self.name)
            .iter()
            .filter(|(_, versions)| {
                versions
                    .first()
                    .is_some_and(|s| s.version.action == FileAction::Upload)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Mutating calls made so far, e.g. `upload a.txt` or `hide a.txt`
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().operations.clone()
    }

    fn read_source(&self, source: &OutboundSource) -> anyhow::Result<Vec<u8>> {
        match source {
            OutboundSource::LocalFile { path, .. } => {
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))
            }
            OutboundSource::LocalFileRange {
                path,
                offset,
                length,
            } => {
                let data =
                    std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
                slice(&data, *offset, *length).map(<[u8]>::to_vec)
            }
            OutboundSource::Copy {
                file_id,
                offset,
                length,
                ..
            } => {
                let state = self.state.lock();
                let stored = state
                    .find(file_id)
                    .ok_or_else(|| anyhow!("file version not found: {file_id}"))?;
                slice(&stored.content, *offset, *length).map(<[u8]>::to_vec)
            }
        }
    }
}

fn slice(data: &[u8], offset: u64, length: u64) -> anyhow::Result<&[u8]> {
    let start = usize::try_from(offset)?;
    let end = usize::try_from(offset + length)?;
    data.get(start..end)
        .ok_or_else(|| anyhow!("range {start}..{end} is outside of {} bytes", data.len()))
}

fn report_progress(progress: Option<&mut dyn IProgressListener>, total: u64) {
    if let Some(progress) = progress {
        progress.set_total_bytes(total);
        progress.bytes_completed(total);
    }
}

impl IBucket for InMemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn ls_versions(&self, prefix: &str) -> anyhow::Result<VersionListing<'_>> {
        let mut state = self.state.lock();
        let listing: Vec<anyhow::Result<FileVersion>> = state
            .files(&self.name)
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .flat_map(|(_, versions)| versions.iter().map(|s| Ok(s.version.clone())))
            .collect();
        Ok(Box::new(listing.into_iter()))
    }

    fn concatenate(
        &self,
        request: UploadRequest,
        progress: Option<&mut dyn IProgressListener>,
    ) -> anyhow::Result<FileVersion> {
        self.state.lock().check_failure(&request.file_name)?;

        let mut content = Vec::new();
        for source in &request.sources {
            content.extend(self.read_source(source)?);
        }
        report_progress(progress, content.len() as u64);

        let mut file_info = request.file_info;
        let content_sha1 = if request.sources.len() > 1 {
            if let Some(sha1) = request.large_file_sha1 {
                file_info.insert(LARGE_FILE_SHA1.to_string(), sha1);
            }
            "none".to_string()
        } else {
            hex_sha1_of_bytes(&content)
        };

        let mut state = self.state.lock();
        let (id, upload_timestamp) = state.tick();
        let version = FileVersion {
            id,
            file_name: request.file_name.clone(),
            size: content.len() as u64,
            content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
            content_sha1: Some(content_sha1),
            file_info,
            upload_timestamp,
            action: FileAction::Upload,
            server_side_encryption: request.encryption,
        };
        let kind = if request.sources.iter().any(OutboundSource::is_copy) {
            "incremental_upload"
        } else {
            "upload"
        };
        state.operations.push(format!("{kind} {}", request.file_name));
        debug!(bucket = %self.name, file_name = %request.file_name, "stored new version");
        Ok(state.store(&self.name, version, content))
    }

    fn download_file_by_id(
        &self,
        file_id: &str,
        _encryption: Option<&EncryptionSetting>,
        progress: Option<&mut dyn IProgressListener>,
    ) -> anyhow::Result<DownloadedFile> {
        let (stored, interrupted) = {
            let state = self.state.lock();
            let stored = state
                .find(file_id)
                .cloned()
                .ok_or_else(|| anyhow!("file version not found: {file_id}"))?;
            state.check_failure(&stored.version.file_name)?;
            let interrupted = state.interrupted_reads.contains(&stored.version.file_name);
            (stored, interrupted)
        };
        if stored.version.action != FileAction::Upload {
            bail!("version {file_id} has no content");
        }
        let content: Box<dyn Read + Send> = if interrupted {
            let half = stored.content[..stored.content.len() / 2].to_vec();
            Box::new(Cursor::new(half).chain(BrokenStream))
        } else {
            report_progress(progress, stored.version.size);
            Box::new(Cursor::new(stored.content.to_vec()))
        };
        Ok(DownloadedFile {
            file_version: stored.version,
            content,
        })
    }

    fn copy(
        &self,
        request: CopyRequest,
        progress: Option<&mut dyn IProgressListener>,
    ) -> anyhow::Result<FileVersion> {
        let mut state = self.state.lock();
        state.check_failure(&request.new_file_name)?;
        let source = state
            .find(&request.file_id)
            .cloned()
            .ok_or_else(|| anyhow!("file version not found: {}", request.file_id))?;
        let content = slice(&source.content, 0, request.length)?.to_vec();
        report_progress(progress, request.length);

        let (id, upload_timestamp) = state.tick();
        let version = FileVersion {
            id,
            file_name: request.new_file_name.clone(),
            size: request.length,
            content_type: request.source_content_type,
            content_sha1: source.version.content_sha1.clone(),
            file_info: request.source_file_info,
            upload_timestamp,
            action: FileAction::Upload,
            server_side_encryption: request.destination_encryption,
        };
        state.operations.push(format!("copy {}", request.new_file_name));
        Ok(state.store(&self.name, version, content))
    }

    fn hide_file(&self, file_name: &str) -> anyhow::Result<FileVersion> {
        let mut state = self.state.lock();
        state.check_failure(file_name)?;
        let (id, upload_timestamp) = state.tick();
        let version = FileVersion {
            id,
            file_name: file_name.to_string(),
            size: 0,
            content_type: None,
            content_sha1: None,
            file_info: BTreeMap::new(),
            upload_timestamp,
            action: FileAction::Hide,
            server_side_encryption: None,
        };
        state.operations.push(format!("hide {file_name}"));
        Ok(state.store(&self.name, version, Vec::new()))
    }

    fn delete_file_version(&self, file_id: &str, file_name: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.check_failure(file_name)?;
        let files = state.files(&self.name);
        let versions = files
            .get_mut(file_name)
            .ok_or_else(|| anyhow!("file not present: {file_name}"))?;
        let index = versions
            .iter()
            .position(|s| s.version.id == file_id)
            .ok_or_else(|| anyhow!("file version not found: {file_id}"))?;
        versions.remove(index);
        if versions.is_empty() {
            files.remove(file_name);
        }
        state.operations.push(format!("delete {file_name}"));
        Ok(())
    }
}
