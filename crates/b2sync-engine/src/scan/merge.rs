//! Merge-join of two folder scans
//!
//! Both inputs are strictly increasing by relative path, so one lookahead
//! entry per side is enough to produce the union in order.

use std::iter::Peekable;

use b2sync_core::domain::ScanPath;

use crate::report::ScanReporter;
use crate::scan::folder::Folder;
use crate::scan::policies::ScanPolicy;
use crate::scan::ScanIter;
use crate::Result;

/// Entries with the same relative path on each side; never both `None`
pub type ScanPair = (Option<ScanPath>, Option<ScanPath>);

/// Lazy merge of two ordered scans
pub struct ZipFolders<'a> {
    iter_a: Peekable<ScanIter<'a>>,
    iter_b: Peekable<ScanIter<'a>>,
    reporter: Option<&'a dyn ScanReporter>,
    close_reporter: bool,
    done: bool,
}

impl<'a> ZipFolders<'a> {
    pub fn new(
        iter_a: ScanIter<'a>,
        iter_b: ScanIter<'a>,
        reporter: Option<&'a dyn ScanReporter>,
    ) -> Self {
        Self {
            iter_a: iter_a.peekable(),
            iter_b: iter_b.peekable(),
            reporter,
            close_reporter: true,
            done: false,
        }
    }

    /// Leave the reporter open when both sides are exhausted.
    ///
    /// Used when the merge is nested inside a larger operation that closes
    /// the reporter itself.
    pub fn keep_reporter_open(mut self) -> Self {
        self.close_reporter = false;
        self
    }

    fn finish(&mut self) {
        self.done = true;
        if self.close_reporter {
            if let Some(reporter) = self.reporter {
                reporter.close();
            }
        }
    }

    fn fail<T>(&mut self, error: crate::SyncError) -> Option<Result<T>> {
        self.done = true;
        Some(Err(error))
    }
}

/// Pops the next entry of one side if it is an error.
fn take_error(iter: &mut Peekable<ScanIter<'_>>) -> Option<crate::SyncError> {
    if matches!(iter.peek(), Some(Err(_))) {
        if let Some(Err(e)) = iter.next() {
            return Some(e);
        }
    }
    None
}

impl Iterator for ZipFolders<'_> {
    type Item = Result<ScanPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = take_error(&mut self.iter_a) {
            return self.fail(e);
        }
        if let Some(e) = take_error(&mut self.iter_b) {
            return self.fail(e);
        }

        let ordering = match (self.iter_a.peek(), self.iter_b.peek()) {
            (None, None) => {
                self.finish();
                return None;
            }
            (Some(Ok(a)), Some(Ok(b))) => a.relative_path().cmp(b.relative_path()),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            // errors were taken above
            _ => return None,
        };

        let pair = match ordering {
            std::cmp::Ordering::Less => (self.iter_a.next().and_then(Result::ok), None),
            std::cmp::Ordering::Greater => (None, self.iter_b.next().and_then(Result::ok)),
            std::cmp::Ordering::Equal => (
                self.iter_a.next().and_then(Result::ok),
                self.iter_b.next().and_then(Result::ok),
            ),
        };
        Some(Ok(pair))
    }
}

/// Iterate over the union of two folders, pairing entries by relative path.
///
/// `policy_a` filters the first folder and `policy_b` the second. The
/// reporter receives local scan warnings from both sides and is closed when
/// the merge completes.
pub fn zip_folders<'a>(
    folder_a: &'a Folder,
    folder_b: &'a Folder,
    reporter: Option<&'a dyn ScanReporter>,
    policy_a: &'a ScanPolicy,
    policy_b: &'a ScanPolicy,
) -> ZipFolders<'a> {
    ZipFolders::new(
        folder_a.all_files(reporter, policy_a),
        folder_b.all_files(reporter, policy_b),
        reporter,
    )
}
