//! Run counters: periodic progress and the final summary.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Counts at a point during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Mapping rows read so far.
    pub seen: u64,
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Pairs read but not yet handed to the store.
    pub pending: u64,
}

/// Outcome of a completed run.
///
/// `total == written + skipped + failed` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Mapping rows read.
    pub total: u64,
    /// Records durably stored (duplicates counted per row).
    pub written: u64,
    /// Rows with no usable file or identifier.
    pub skipped: u64,
    /// Rows lost to store write failures.
    pub failed: u64,
    pub elapsed: Duration,
}

impl IngestSummary {
    /// Records written per second.
    pub fn rate(&self) -> f64 {
        per_second(self.written, self.elapsed)
    }
}

pub(crate) fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} written={} skipped={} failed={} elapsed={:.1}s ({:.0} records/s)",
            self.total,
            self.written,
            self.skipped,
            self.failed,
            self.elapsed.as_secs_f64(),
            self.rate()
        )
    }
}
