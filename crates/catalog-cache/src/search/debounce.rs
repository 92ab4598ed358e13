//! Debounced, last-request-wins execution of filter jobs.

use std::time::Duration;

use crate::cancel::{CancellationToken, SearchVersionTracker};
use crate::config::DEFAULT_DEBOUNCE_WINDOW;

/// Coalesces bursts of requests into one run of the newest.
///
/// Every request takes a new version, waits out the window and only runs if
/// no newer request arrived meanwhile. A result finished after a newer request
/// was issued is dropped. Clones share versioning, so a request through any
/// clone supersedes requests through the others.
#[derive(Debug, Clone)]
pub struct FilterDebouncer {
    window: Duration,
    tracker: SearchVersionTracker,
}

impl Default for FilterDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl FilterDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            tracker: SearchVersionTracker::new(),
        }
    }

    /// Supersedes every pending or running request.
    pub fn cancel_pending(&self) {
        self.tracker.next_version();
    }

    /// Runs `job` once the window passes without a newer request.
    ///
    /// Returns `None` when superseded, either while waiting or while `job`
    /// ran. `job` receives the request's token and may return `None` to
    /// report that it noticed the cancellation itself.
    pub async fn run<T, F>(&self, job: F) -> Option<T>
    where
        F: FnOnce(&CancellationToken) -> Option<T>,
    {
        let token = self.tracker.next_token();
        tokio::time::sleep(self.window).await;

        if token.is_cancelled().is_none() {
            log::debug!("filter request {} superseded before running", token.version());
            return None;
        }
        let result = job(&token)?;
        if token.is_cancelled().is_none() {
            log::debug!("dropping stale result of filter request {}", token.version());
            return None;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn burst_runs_only_the_newest_request() {
        let debouncer = FilterDebouncer::default();
        let runs = AtomicUsize::new(0);
        let job = |label: &'static str| {
            let runs = &runs;
            move |_: &CancellationToken| {
                runs.fetch_add(1, Ordering::SeqCst);
                Some(label)
            }
        };

        let (first, second, third) = tokio::join!(
            debouncer.run(job("first")),
            debouncer.run(job("second")),
            debouncer.run(job("third")),
        );

        assert_eq!((first, second, third), (None, None, Some("third")));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_inside_the_window_supersedes_the_pending_one() {
        let debouncer = FilterDebouncer::new(Duration::from_millis(100));
        let (early, late) = tokio::join!(debouncer.run(|_| Some(1)), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            debouncer.run(|_| Some(2)).await
        });
        assert_eq!(early, None);
        assert_eq!(late, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn requests_outside_the_window_all_run() {
        let debouncer = FilterDebouncer::default();
        assert_eq!(debouncer.run(|_| Some("a")).await, Some("a"));
        assert_eq!(debouncer.run(|_| Some("b")).await, Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn result_finished_after_a_newer_request_is_dropped() {
        let debouncer = FilterDebouncer::default();
        let result = debouncer
            .run(|_| {
                debouncer.cancel_pending();
                Some("stale")
            })
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_versions() {
        let debouncer = FilterDebouncer::default();
        let clone = debouncer.clone();
        let (original, cloned) =
            tokio::join!(debouncer.run(|_| Some(1)), clone.run(|_| Some(2)));
        assert_eq!(original, None);
        assert_eq!(cloned, Some(2));
    }
}
