//! Loading State Tracker
//!
//! Named busy flags per logical operation. Purely advisory: the UI reads them
//! and the loader uses them to scope in-flight work.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

// == Loading State ==
#[derive(Debug)]
pub struct LoadingState {
    flags: Mutex<HashMap<String, bool>>,
    /// Bumped on every real transition
    changes: watch::Sender<u64>,
}

impl Default for LoadingState {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingState {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            flags: Mutex::new(HashMap::new()),
            changes,
        }
    }

    // == Set Loading ==
    /// Sets the flag for `key`.
    ///
    /// Does nothing, and sends no change notification, when the flag already
    /// has this value. Returns whether a transition happened.
    pub fn set_loading(&self, key: &str, loading: bool) -> bool {
        {
            let mut flags = self.flags.lock();
            let current = flags.get(key).copied().unwrap_or(false);
            if current == loading {
                return false;
            }
            flags.insert(key.to_string(), loading);
        }
        trace!(key, loading, "loading state changed");
        self.changes.send_modify(|n| *n += 1);
        true
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.flags.lock().get(key).copied().unwrap_or(false)
    }

    pub fn is_any_loading(&self) -> bool {
        self.flags.lock().values().any(|busy| *busy)
    }

    /// Keys currently busy, sorted.
    pub fn loading_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .flags
            .lock()
            .iter()
            .filter(|(_, busy)| **busy)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    // == With Loading ==
    /// Runs `fut` with `key` marked busy and returns its output unchanged.
    ///
    /// The flag is cleared when the future completes either way, and also
    /// when it is dropped before completion.
    pub async fn with_loading<F, T>(&self, key: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.set_loading(key, true);
        let _guard = LoadingGuard { state: self, key };
        fut.await
    }

    /// Receiver whose value increments on every flag transition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Number of transitions since creation.
    pub fn transitions(&self) -> u64 {
        *self.changes.borrow()
    }

    /// Drops every flag (logout).
    pub fn clear(&self) {
        let had_busy = {
            let mut flags = self.flags.lock();
            let busy = flags.values().any(|b| *b);
            flags.clear();
            busy
        };
        if had_busy {
            self.changes.send_modify(|n| *n += 1);
        }
    }
}

struct LoadingGuard<'a> {
    state: &'a LoadingState,
    key: &'a str,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.set_loading(self.key, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_loading_is_idempotent() {
        let state = LoadingState::new();

        assert!(state.set_loading("course", true));
        assert!(!state.set_loading("course", true));
        assert_eq!(state.transitions(), 1);
        assert!(state.is_loading("course"));
    }

    #[test]
    fn test_unknown_key_is_not_loading() {
        let state = LoadingState::new();
        assert!(!state.is_loading("never"));
        assert!(!state.set_loading("never", false));
        assert_eq!(state.transitions(), 0);
    }

    #[test]
    fn test_any_loading_and_keys() {
        let state = LoadingState::new();
        state.set_loading("topic", true);
        state.set_loading("course", true);
        state.set_loading("highlights", false);

        assert!(state.is_any_loading());
        assert_eq!(state.loading_keys(), vec!["course", "topic"]);

        state.set_loading("topic", false);
        state.set_loading("course", false);
        assert!(!state.is_any_loading());
    }

    #[tokio::test]
    async fn test_with_loading_success() {
        let state = LoadingState::new();
        let value = state
            .with_loading("course", async {
                assert!(state.is_loading("course"));
                42
            })
            .await;

        assert_eq!(value, 42);
        assert!(!state.is_loading("course"));
    }

    #[tokio::test]
    async fn test_with_loading_clears_on_error() {
        let state = LoadingState::new();
        let result: Result<(), &str> = state.with_loading("course", async { Err("boom") }).await;

        assert_eq!(result, Err("boom"));
        assert!(!state.is_loading("course"));
        assert_eq!(state.transitions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_loading_clears_on_drop() {
        let state = LoadingState::new();
        let slow = state.with_loading("topic", tokio::time::sleep(Duration::from_secs(10)));

        let timed_out = tokio::time::timeout(Duration::from_secs(1), slow).await;
        assert!(timed_out.is_err());
        assert!(!state.is_loading("topic"));
    }

    #[tokio::test]
    async fn test_subscribe_sees_transitions() {
        let state = LoadingState::new();
        let mut rx = state.subscribe();

        state.set_loading("course", true);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        state.set_loading("course", true);
        assert!(!rx.has_changed().unwrap());
    }
}
