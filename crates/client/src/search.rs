//! Debounced search input.
//!
//! Raw input is visible immediately; the committed term (the one that feeds
//! cache keys) only changes after the input has been quiet for the debounce
//! window. Every commit returns pagination to the first page.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use bugdesk_core::PageParams;

/// Published search state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    /// Text as typed.
    pub raw: String,
    /// Debounced term used for queries.
    pub committed: String,
    pub page: PageParams,
    /// Number of commits so far.
    pub commits: u64,
}

impl SearchState {
    /// Committed term, or `None` when blank.
    #[must_use]
    pub fn term(&self) -> Option<String> {
        let term = self.committed.trim();
        (!term.is_empty()).then(|| term.to_string())
    }
}

/// Turns keystrokes into a quiesced search term.
pub struct SearchDebouncer {
    state: Arc<watch::Sender<SearchState>>,
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SearchDebouncer {
    #[must_use]
    pub fn new(window: Duration, page_size: u32) -> Self {
        let (state, _) = watch::channel(SearchState {
            raw: String::new(),
            committed: String::new(),
            page: PageParams::first(page_size),
            commits: 0,
        });
        Self {
            state: Arc::new(state),
            window,
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a keystroke and restart the quiescence timer.
    pub fn input(&self, raw: impl Into<String>) {
        let raw = raw.into();
        self.state.send_modify(|state| state.raw.clone_from(&raw));

        let state = Arc::clone(&self.state);
        let window = self.window;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            commit(&state, raw);
        });

        if let Some(previous) = self.pending().replace(task) {
            previous.abort();
        }
    }

    /// Commit the current raw input now.
    pub fn flush(&self) {
        if let Some(previous) = self.pending().take() {
            previous.abort();
        }
        let raw = self.state.borrow().raw.clone();
        commit(&self.state, raw);
    }

    /// Select another page of the committed term's results.
    pub fn set_page(&self, page_number: u32) {
        self.state
            .send_modify(|state| state.page = state.page.with_page(page_number));
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> SearchState {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        if let Some(task) = self.pending().take() {
            task.abort();
        }
    }
}

fn commit(state: &watch::Sender<SearchState>, raw: String) {
    state.send_if_modified(|state| {
        if state.committed == raw {
            return false;
        }
        debug!(term = %raw, "Committed search term");
        state.committed = raw;
        state.page = state.page.with_page(1);
        state.commits += 1;
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const WINDOW: Duration = Duration::from_millis(300);

    #[tokio::test(start_paused = true)]
    async fn test_rapid_input_commits_once() {
        let search = SearchDebouncer::new(WINDOW, 10);
        search.set_page(3);

        for raw in ["a", "ab", "abc"] {
            search.input(raw);
            assert_eq!(search.snapshot().raw, raw);
            sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(search.snapshot().commits, 0);
        assert_eq!(search.snapshot().page.page_number, 3);

        sleep(Duration::from_millis(250)).await;
        let state = search.snapshot();
        assert_eq!(state.committed, "abc");
        assert_eq!(state.commits, 1);
        assert_eq!(state.page.page_number, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_waits_for_full_window() {
        let search = SearchDebouncer::new(WINDOW, 10);
        search.input("crash");

        sleep(Duration::from_millis(299)).await;
        assert_eq!(search.snapshot().committed, "");

        sleep(Duration::from_millis(2)).await;
        assert_eq!(search.snapshot().term().as_deref(), Some("crash"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_term_does_not_reset_page() {
        let search = SearchDebouncer::new(WINDOW, 10);
        search.input("crash");
        search.flush();
        search.set_page(2);

        search.input("crash");
        sleep(WINDOW * 2).await;
        let state = search.snapshot();
        assert_eq!(state.commits, 1);
        assert_eq!(state.page.page_number, 2);
    }

    #[tokio::test]
    async fn test_flush_commits_immediately() {
        let search = SearchDebouncer::new(WINDOW, 10);
        let mut rx = search.subscribe();
        search.input("login");
        search.flush();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().committed, "login");
        assert_eq!(search.snapshot().term().as_deref(), Some("login"));
    }
}
