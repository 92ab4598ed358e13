//! Cancellation tokens for filter and search requests.
//!
//! Every new request takes a fresh version from a [`SearchVersionTracker`];
//! tokens handed to older requests then report themselves cancelled, which is
//! how a newer filter request supersedes one still in flight.
//!
//! ## Sparse Checking
//!
//! For scans over very large catalogs, `is_cancelled_sparse()` only checks
//! every 4,096 iterations to keep atomic reads out of the hot loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How often long-running loops should check whether execution was cancelled.
/// Using a power of 2 allows efficient modulo via bitwise AND.
pub const CANCEL_CHECK_INTERVAL: usize = 0x1000; // 4,096

/// Tracks the active request version for cancellation.
#[derive(Debug, Default, Clone)]
pub struct SearchVersionTracker {
    active_version: Arc<AtomicU64>,
}

impl SearchVersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the active version and returns the new version number.
    ///
    /// This effectively cancels any in-flight requests using older versions.
    pub fn next_version(&self) -> u64 {
        self.active_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the current active version without incrementing.
    pub fn current_version(&self) -> u64 {
        self.active_version.load(Ordering::SeqCst)
    }

    /// Creates a cancellation token for the given version.
    pub fn token_for_version(&self, version: u64) -> CancellationToken {
        CancellationToken {
            active_version: Some(self.active_version.clone()),
            version,
        }
    }

    /// Allocates a new version and returns its token.
    pub fn next_token(&self) -> CancellationToken {
        let version = self.next_version();
        self.token_for_version(version)
    }
}

/// A cancellation token for terminating long-running operations.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    /// `None` for tokens that are never cancelled.
    active_version: Option<Arc<AtomicU64>>,
    version: u64,
}

impl CancellationToken {
    /// Creates a cancellation token that is never cancelled.
    #[inline]
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Checks if this token is still active.
    ///
    /// Returns `Some(())` if still active, `None` if cancelled.
    /// This enables use with the `?` operator for early returns.
    #[inline]
    pub fn is_cancelled(&self) -> Option<()> {
        match &self.active_version {
            Some(active) if active.load(Ordering::Relaxed) != self.version => None,
            _ => Some(()),
        }
    }

    /// Sparse cancellation check - only checks every `CANCEL_CHECK_INTERVAL` iterations.
    #[inline]
    pub fn is_cancelled_sparse(&self, counter: usize) -> Option<()> {
        if counter & (CANCEL_CHECK_INTERVAL - 1) == 0 {
            self.is_cancelled()
        } else {
            Some(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_token_is_never_cancelled() {
        let token = CancellationToken::noop();
        assert!(token.is_cancelled().is_some());
    }

    #[test]
    fn newer_version_cancels_older_tokens() {
        let tracker = SearchVersionTracker::new();
        let first = tracker.next_token();
        assert!(first.is_cancelled().is_some());

        let second = tracker.next_token();
        assert!(first.is_cancelled().is_none());
        assert!(second.is_cancelled().is_some());
        assert_eq!(tracker.current_version(), second.version());
    }

    #[test]
    fn sparse_check_only_reads_on_interval() {
        let tracker = SearchVersionTracker::new();
        let token = tracker.next_token();
        tracker.next_version();

        assert!(token.is_cancelled_sparse(1).is_some());
        assert!(token.is_cancelled_sparse(CANCEL_CHECK_INTERVAL).is_none());
    }

    #[test]
    fn cloned_trackers_share_versions() {
        let tracker = SearchVersionTracker::new();
        let handle = tracker.clone();
        let token = tracker.next_token();
        handle.next_version();
        assert!(token.is_cancelled().is_none());
    }
}
