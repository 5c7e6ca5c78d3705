//! "Already fetched today" checks.
//!
//! A file is fresh when its modification time, in local time, falls on the
//! run date. Content is never inspected.

use chrono::{DateTime, Local, NaiveDate};
use std::path::Path;
use tracing::debug;

/// Returns the local date a file was last modified, or `None` if it does
/// not exist or has no modification time.
#[must_use]
pub fn modified_on(path: &Path) -> Option<NaiveDate> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).date_naive())
}

/// Returns true if every path exists and was modified on `today`.
///
/// An empty set of paths is never fresh.
#[must_use]
pub fn is_fresh<P: AsRef<Path>>(paths: &[P], today: NaiveDate) -> bool {
    if paths.is_empty() {
        return false;
    }
    paths.iter().all(|path| {
        let path = path.as_ref();
        let fresh = modified_on(path) == Some(today);
        if !fresh {
            debug!(path = %path.display(), "artifact missing or stale");
        }
        fresh
    })
}
