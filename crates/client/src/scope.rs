//! Scoped acquisition with exactly-once release.
//!
//! A [`ViewScope`] collects the resources a view acquires (preview managers,
//! cache subscriptions, pending timers) and releases them together when the
//! view is torn down, either explicitly with [`ViewScope::close`] or when the
//! scope is dropped. Each release action runs exactly once, in reverse order
//! of acquisition.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

type Release = Box<dyn FnOnce() + Send>;

/// Owner of a view's resources.
pub struct ViewScope {
    name: String,
    state: Mutex<ScopeState>,
}

#[derive(Default)]
struct ScopeState {
    releases: Vec<Release>,
    closed: bool,
}

impl std::fmt::Debug for ViewScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ViewScope")
            .field("name", &self.name)
            .field("pending_releases", &state.releases.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl ViewScope {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ScopeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a release action. On a closed scope it runs immediately.
    pub fn on_release(&self, release: impl FnOnce() + Send + 'static) {
        let mut state = self.state();
        if state.closed {
            drop(state);
            release();
            return;
        }
        state.releases.push(Box::new(release));
    }

    /// Keep `value` alive until the scope closes, then drop it.
    pub fn hold<T: Send + 'static>(&self, value: T) {
        self.on_release(move || drop(value));
    }

    /// Whether the scope has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Run every release action. Later calls do nothing.
    pub fn close(&self) {
        let releases = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.releases)
        };
        debug!(scope = %self.name, count = releases.len(), "Closing view scope");
        for release in releases.into_iter().rev() {
            release();
        }
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.close();
    }
}
