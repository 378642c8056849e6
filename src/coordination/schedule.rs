//! Debounce/Throttle Scheduler
//!
//! Coalesces bursts of calls to a named operation. Operations are identified
//! by explicit string keys; per-key timer handles and throttle windows live in
//! one registry, so two keys never interfere.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

type Task<A> = Arc<dyn Fn(A) -> BoxFuture<'static, ()> + Send + Sync>;

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    /// Pending debounce timers
    timers: Mutex<HashMap<String, Timer>>,
    /// Start of the current throttle window per key
    windows: Mutex<HashMap<String, Instant>>,
    next_id: AtomicU64,
}

// == Scheduler ==
/// Session-scoped registry for debounced and throttled operations.
#[derive(Clone, Default)]
pub struct Scheduler {
    registry: Arc<Registry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    // == Debounce ==
    /// Wraps `f` so that it runs only after `delay` passes without another
    /// call for `key`; the last call's arguments win.
    pub fn debounce<A, F, Fut>(&self, key: impl Into<String>, delay: Duration, f: F) -> Debounced<A>
    where
        A: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Debounced {
            key: key.into(),
            delay,
            registry: Arc::clone(&self.registry),
            task: Arc::new(move |args| f(args).boxed()),
        }
    }

    // == Throttle ==
    /// Wraps `f` so that the first call in each `interval` window for `key`
    /// runs immediately and the rest of the window's calls are dropped.
    pub fn throttle<A, F, Fut>(&self, key: impl Into<String>, interval: Duration, f: F) -> Throttled<A>
    where
        A: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Throttled {
            key: key.into(),
            interval,
            registry: Arc::clone(&self.registry),
            task: Arc::new(move |args| f(args).boxed()),
        }
    }

    /// Whether a debounced call for `key` is waiting to fire.
    pub fn is_pending(&self, key: &str) -> bool {
        self.registry.timers.lock().contains_key(key)
    }

    /// Discards the pending debounced call for `key`.
    pub fn cancel(&self, key: &str) -> bool {
        match self.registry.timers.lock().remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Discards every pending call and forgets throttle windows (logout).
    pub fn cancel_all(&self) {
        for (_, timer) in self.registry.timers.lock().drain() {
            timer.handle.abort();
        }
        self.registry.windows.lock().clear();
    }
}

impl Registry {
    fn enter_window(&self, key: &str, interval: Duration) -> bool {
        let mut windows = self.windows.lock();
        match windows.get(key) {
            Some(start) if start.elapsed() < interval => false,
            _ => {
                windows.insert(key.to_string(), Instant::now());
                true
            }
        }
    }
}

// == Debounced ==
pub struct Debounced<A> {
    key: String,
    delay: Duration,
    registry: Arc<Registry>,
    task: Task<A>,
}

impl<A: Send + 'static> Debounced<A> {
    /// Schedules `args`, replacing any call still waiting for this key.
    pub fn call(&self, args: A) {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.registry);
        let task = Arc::clone(&self.task);
        let key = self.key.clone();
        let delay = self.delay;

        let mut timers = self.registry.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = registry.timers.lock();
                if !timers.get(&key).is_some_and(|t| t.id == id) {
                    return;
                }
                // Once running, a newer call must not abort this one
                timers.remove(&key);
            }
            task(args).await;
        });

        if let Some(previous) = timers.insert(self.key.clone(), Timer { id, handle }) {
            debug!(key = %self.key, "debounced call superseded");
            previous.handle.abort();
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

// == Throttled ==
pub struct Throttled<A> {
    key: String,
    interval: Duration,
    registry: Arc<Registry>,
    task: Task<A>,
}

impl<A: Send + 'static> Throttled<A> {
    /// Runs `f(args)` on a new task if this is the first call of the window.
    ///
    /// Returns the task handle, or `None` when the call was dropped.
    pub fn call(&self, args: A) -> Option<JoinHandle<()>> {
        if !self.registry.enter_window(&self.key, self.interval) {
            debug!(key = %self.key, "throttled call dropped");
            return None;
        }
        Some(tokio::spawn((self.task)(args)))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
