//! Rate limiting for search-as-you-type callers
//!
//! Each call waits the minimum query interval; if another call arrived in
//! the meantime the earlier one is dropped, so only the last query of a
//! burst runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct SearchDebouncer {
    interval: Duration,
    latest: AtomicU64,
}

impl SearchDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            latest: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `f` after the interval unless superseded. Returns `None` when a
    /// newer call arrived first.
    pub async fn run<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        if self.latest.load(Ordering::SeqCst) != ticket {
            tracing::trace!("Search {} superseded", ticket);
            return None;
        }
        Some(f())
    }
}
