//! Progress listener port
//!
//! Storage clients report transfer progress for a single file through
//! [`IProgressListener`]. The sync engine supplies an implementation that
//! forwards byte deltas to its run-wide report.

/// Receives progress for one transfer
pub trait IProgressListener: Send {
    /// Announces the total number of bytes, when known
    fn set_total_bytes(&mut self, total_bytes: u64);

    /// Reports the cumulative number of bytes transferred so far
    fn bytes_completed(&mut self, byte_count: u64);

    /// Marks the transfer as finished (successfully or not)
    fn close(&mut self);
}
