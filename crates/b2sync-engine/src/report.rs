//! Progress and sync reports
//!
//! Both reports are thread-safe: every counter and the printed status line
//! sit behind one mutex, so scanner threads, the driving thread and worker
//! threads may update them concurrently.
//!
//! The status line is rewritten in place with `\r` at most every
//! [`UPDATE_INTERVAL`]. Completion and error lines are printed above it.
//! Scan warnings are collected and printed together by `close()`.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use b2sync_core::ports::IProgressListener;
use parking_lot::Mutex;
use tracing::warn;

use crate::format::{escape_control_chars, format_and_scale_fraction, format_and_scale_number};

/// Minimum time between two status line redraws
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// ScanReporter
// ============================================================================

/// Receives problems found while scanning a local folder
///
/// Entries reported here are skipped; the scan continues.
pub trait ScanReporter: Send + Sync {
    /// The entry could not be stat-ed
    fn local_access_error(&self, path: &Path);

    /// The entry is not readable
    fn local_permission_error(&self, path: &Path);

    /// A symlink was skipped because all symlinks are excluded
    fn symlink_skipped(&self, path: &Path);

    /// A directory symlink leads back into the current branch
    fn circular_symlink_skipped(&self, path: &Path);

    /// The entry name cannot be stored remotely
    fn invalid_name(&self, path: &Path, error: &str);

    /// All scanning is finished
    fn close(&self);
}

fn safe_path(path: &Path) -> String {
    escape_control_chars(&path.to_string_lossy())
}

// ============================================================================
// Printer
// ============================================================================

/// Terminal state shared by both reports
struct Printer {
    out: Box<dyn Write + Send>,
    no_progress: bool,
    current_line: String,
    last_update: Option<Instant>,
    closed: bool,
    warnings: Vec<String>,
    errors_encountered: bool,
}

impl Printer {
    fn new(out: Box<dyn Write + Send>, no_progress: bool) -> Self {
        Self {
            out,
            no_progress,
            current_line: String::new(),
            last_update: None,
            closed: false,
            warnings: Vec::new(),
            errors_encountered: false,
        }
    }

    /// Whether the status line may be redrawn now; records the redraw.
    fn should_update(&mut self, now: Instant) -> bool {
        if self.closed || self.no_progress {
            return false;
        }
        if matches!(self.last_update, Some(last) if now.duration_since(last) < UPDATE_INTERVAL) {
            return false;
        }
        self.last_update = Some(now);
        true
    }

    /// Prints `line`, padded to cover the previous status line.
    ///
    /// With `newline` the cursor moves on; otherwise the line is a status
    /// line that the next call overwrites.
    fn print_line(&mut self, line: &str, newline: bool) {
        let mut line = line.to_string();
        let previous = self.current_line.chars().count();
        let current = line.chars().count();
        if current < previous {
            line.push_str(&" ".repeat(previous - current));
        }
        let terminator = if newline { "\n" } else { "\r" };
        if let Err(e) = write!(self.out, "{line}{terminator}").and_then(|()| self.out.flush()) {
            warn!(error = %e, "could not write report line");
        }
        self.current_line = if newline { String::new() } else { line };
    }

    fn close(&mut self) {
        if !self.no_progress {
            self.print_line("", false);
        }
        self.closed = true;
        let warnings = std::mem::take(&mut self.warnings);
        for warning in &warnings {
            self.print_line(warning, true);
        }
        self.warnings = warnings;
    }

    fn local_access_error(&mut self, path: &Path) {
        self.warnings.push(format!(
            "WARNING: {} could not be accessed (broken symlink?)",
            safe_path(path)
        ));
    }

    fn local_permission_error(&mut self, path: &Path) {
        self.warnings.push(format!(
            "WARNING: {} could not be accessed (no permissions to read?)",
            safe_path(path)
        ));
    }

    fn circular_symlink_skipped(&mut self, path: &Path) {
        self.warnings.push(format!(
            "WARNING: {} is a circular symlink, which was already visited. Skipping.",
            safe_path(path)
        ));
    }

    fn invalid_name(&mut self, path: &Path, error: &str) {
        self.warnings.push(format!(
            "WARNING: {} path contains invalid name ({error}). Skipping.",
            safe_path(path)
        ));
    }
}

fn rate_per_second(amount: u64, start: Instant, now: Instant) -> u64 {
    let elapsed = now.duration_since(start).as_secs_f64();
    if elapsed == 0.0 {
        0
    } else {
        (amount as f64 / elapsed) as u64
    }
}

// ============================================================================
// ProgressReport
// ============================================================================

struct ProgressState {
    printer: Printer,
    start: Instant,
    count: u64,
    total_count: u64,
    total_done: bool,
}

impl ProgressState {
    fn update_progress(&mut self) {
        let now = Instant::now();
        if !self.printer.should_update(now) {
            return;
        }
        let rate = rate_per_second(self.count, self.start, now);
        let message = format!(
            " count: {}/{}   {}",
            self.count,
            self.total_count,
            format_and_scale_number(rate, "/s")
        );
        self.printer.print_line(&message, false);
    }
}

/// Progress of a plain scan: items processed out of items found
pub struct ProgressReport {
    state: Mutex<ProgressState>,
}

impl ProgressReport {
    /// Create a report printing to `out`.
    ///
    /// With `no_progress` only completion lines, errors and warnings are
    /// printed.
    pub fn new(out: Box<dyn Write + Send>, no_progress: bool) -> Self {
        let mut state = ProgressState {
            printer: Printer::new(out, no_progress),
            start: Instant::now(),
            count: 0,
            total_count: 0,
            total_done: false,
        };
        state.update_progress();
        Self {
            state: Mutex::new(state),
        }
    }

    /// Report that `delta` items were processed
    pub fn update_count(&self, delta: u64) {
        let mut state = self.state.lock();
        state.count += delta;
        state.update_progress();
    }

    /// Report that `delta` more items were found
    pub fn update_total(&self, delta: u64) {
        let mut state = self.state.lock();
        state.total_count += delta;
        state.update_progress();
    }

    /// Finding items is finished
    pub fn end_total(&self) {
        let mut state = self.state.lock();
        state.total_done = true;
        state.update_progress();
    }

    /// Print a message above the status line
    pub fn print_completion(&self, message: &str) {
        let mut state = self.state.lock();
        state.printer.print_line(message, true);
        state.printer.last_update = None;
        state.update_progress();
    }

    /// Print an error message and remember that an error happened
    pub fn error(&self, message: &str) {
        self.print_completion(message);
        self.state.lock().printer.errors_encountered = true;
    }

    /// Whether any warning or error has been reported
    pub fn has_errors_or_warnings(&self) -> bool {
        let state = self.state.lock();
        state.printer.errors_encountered || !state.printer.warnings.is_empty()
    }

    /// Collected warnings, in the order they were reported
    pub fn warnings(&self) -> Vec<String> {
        self.state.lock().printer.warnings.clone()
    }

    /// Whether the total count is final
    pub fn is_total_done(&self) -> bool {
        self.state.lock().total_done
    }
}

impl ScanReporter for ProgressReport {
    fn local_access_error(&self, path: &Path) {
        self.state.lock().printer.local_access_error(path);
    }

    fn local_permission_error(&self, path: &Path) {
        self.state.lock().printer.local_permission_error(path);
    }

    fn symlink_skipped(&self, _path: &Path) {}

    fn circular_symlink_skipped(&self, path: &Path) {
        self.state.lock().printer.circular_symlink_skipped(path);
    }

    fn invalid_name(&self, path: &Path, error: &str) {
        self.state.lock().printer.invalid_name(path, error);
    }

    fn close(&self) {
        self.state.lock().printer.close();
    }
}

// ============================================================================
// SyncReport
// ============================================================================

struct SyncState {
    printer: Printer,
    start: Instant,
    total_count: u64,
    total_done: bool,
    compare_count: u64,
    compare_done: bool,
    total_transfer_files: u64,
    total_transfer_bytes: u64,
    transfer_files: u64,
    transfer_bytes: u64,
}

impl SyncState {
    fn update_progress(&mut self) {
        let now = Instant::now();
        if !self.printer.should_update(now) {
            return;
        }
        let rate = format_and_scale_number(
            rate_per_second(self.transfer_bytes, self.start, now),
            "B/s",
        );
        let message = if !self.total_done {
            format!(
                " count: {} files   compare: {} files   updated: {} files   {}   {}",
                self.total_count,
                self.compare_count,
                self.transfer_files,
                format_and_scale_number(self.transfer_bytes, "B"),
                rate
            )
        } else if !self.compare_done {
            format!(
                " compare: {}/{} files   updated: {} files   {}   {}",
                self.compare_count,
                self.total_count,
                self.transfer_files,
                format_and_scale_number(self.transfer_bytes, "B"),
                rate
            )
        } else {
            format!(
                " compare: {}/{} files   updated: {}/{} files   {}   {}",
                self.compare_count,
                self.total_count,
                self.transfer_files,
                self.total_transfer_files,
                format_and_scale_fraction(self.transfer_bytes, self.total_transfer_bytes, "B"),
                rate
            )
        };
        self.printer.print_line(&message, false);
    }
}

/// Point-in-time copy of the sync report counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReportSnapshot {
    pub total_count: u64,
    pub total_done: bool,
    pub compare_count: u64,
    pub compare_done: bool,
    pub total_transfer_files: u64,
    pub total_transfer_bytes: u64,
    pub transfer_files: u64,
    pub transfer_bytes: u64,
    pub errors_encountered: bool,
    pub warnings: Vec<String>,
    pub closed: bool,
}

/// Progress of a sync run
///
/// The status line goes through three phases: counting source files,
/// comparing source and destination, and transferring.
pub struct SyncReport {
    state: Mutex<SyncState>,
}

impl SyncReport {
    /// Create a report printing to `out`.
    ///
    /// With `no_progress` only completion lines, errors and warnings are
    /// printed.
    pub fn new(out: Box<dyn Write + Send>, no_progress: bool) -> Self {
        let mut state = SyncState {
            printer: Printer::new(out, no_progress),
            start: Instant::now(),
            total_count: 0,
            total_done: false,
            compare_count: 0,
            compare_done: false,
            total_transfer_files: 0,
            total_transfer_bytes: 0,
            transfer_files: 0,
            transfer_bytes: 0,
        };
        state.update_progress();
        Self {
            state: Mutex::new(state),
        }
    }

    /// Create a report printing to standard output
    pub fn stdout(no_progress: bool) -> Self {
        Self::new(Box::new(std::io::stdout()), no_progress)
    }

    /// Report that `delta` more source files were found
    pub fn update_total(&self, delta: u64) {
        let mut state = self.state.lock();
        state.total_count += delta;
        state.update_progress();
    }

    /// Counting source files is finished
    pub fn end_total(&self) {
        let mut state = self.state.lock();
        state.total_done = true;
        state.update_progress();
    }

    /// Report that `delta` more files were compared
    pub fn update_compare(&self, delta: u64) {
        let mut state = self.state.lock();
        state.compare_count += delta;
        state.update_progress();
    }

    /// Comparison is finished; the totals to transfer are now known
    pub fn end_compare(&self, total_transfer_files: u64, total_transfer_bytes: u64) {
        let mut state = self.state.lock();
        state.compare_done = true;
        state.total_transfer_files = total_transfer_files;
        state.total_transfer_bytes = total_transfer_bytes;
        state.update_progress();
    }

    /// Report transferred files and bytes
    pub fn update_transfer(&self, file_delta: u64, byte_delta: u64) {
        let mut state = self.state.lock();
        state.transfer_files += file_delta;
        state.transfer_bytes += byte_delta;
        state.update_progress();
    }

    /// Print a message above the status line
    pub fn print_completion(&self, message: &str) {
        let mut state = self.state.lock();
        state.printer.print_line(message, true);
        state.printer.last_update = None;
        state.update_progress();
    }

    /// Print an error message and remember that an error happened
    pub fn error(&self, message: &str) {
        self.print_completion(message);
        self.state.lock().printer.errors_encountered = true;
    }

    /// Whether any warning or error has been reported
    pub fn has_errors_or_warnings(&self) -> bool {
        let state = self.state.lock();
        state.printer.errors_encountered || !state.printer.warnings.is_empty()
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> SyncReportSnapshot {
        let state = self.state.lock();
        SyncReportSnapshot {
            total_count: state.total_count,
            total_done: state.total_done,
            compare_count: state.compare_count,
            compare_done: state.compare_done,
            total_transfer_files: state.total_transfer_files,
            total_transfer_bytes: state.total_transfer_bytes,
            transfer_files: state.transfer_files,
            transfer_bytes: state.transfer_bytes,
            errors_encountered: state.printer.errors_encountered,
            warnings: state.printer.warnings.clone(),
            closed: state.printer.closed,
        }
    }
}

impl ScanReporter for SyncReport {
    fn local_access_error(&self, path: &Path) {
        self.state.lock().printer.local_access_error(path);
    }

    fn local_permission_error(&self, path: &Path) {
        self.state.lock().printer.local_permission_error(path);
    }

    fn symlink_skipped(&self, _path: &Path) {}

    fn circular_symlink_skipped(&self, path: &Path) {
        self.state.lock().printer.circular_symlink_skipped(path);
    }

    fn invalid_name(&self, path: &Path, error: &str) {
        self.state.lock().printer.invalid_name(path, error);
    }

    fn close(&self) {
        self.state.lock().printer.close();
    }
}

// ============================================================================
// SyncFileReporter
// ============================================================================

/// Forwards the progress of one transfer to a [`SyncReport`]
///
/// Storage clients report cumulative byte counts; the report wants deltas.
pub struct SyncFileReporter {
    report: Arc<SyncReport>,
    bytes_so_far: u64,
}

impl SyncFileReporter {
    pub fn new(report: Arc<SyncReport>) -> Self {
        Self {
            report,
            bytes_so_far: 0,
        }
    }
}

impl IProgressListener for SyncFileReporter {
    fn set_total_bytes(&mut self, _total_bytes: u64) {}

    fn bytes_completed(&mut self, byte_count: u64) {
        let delta = byte_count.saturating_sub(self.bytes_so_far);
        self.report.update_transfer(0, delta);
        self.bytes_so_far = byte_count;
    }

    fn close(&mut self) {
        // no more bytes, but one more file
        self.report.update_transfer(1, 0);
    }
}

// ============================================================================
// Test helpers
// ============================================================================

/// In-memory writer whose contents can be read back while a report owns it
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
