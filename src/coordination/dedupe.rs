//! Request Coordinator
//!
//! At most one in-flight fetch per cache key. Concurrent callers for the same
//! key await one shared future and all observe its single result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;

type SharedRequest<T> = Shared<BoxFuture<'static, Result<T>>>;

struct Pending<T> {
    /// Distinguishes this request from a later one under the same key
    id: u64,
    request: SharedRequest<T>,
}

// == Request Coordinator ==
pub struct RequestCoordinator<T> {
    pending: Arc<Mutex<HashMap<String, Pending<T>>>>,
    next_id: AtomicU64,
}

impl<T> Default for RequestCoordinator<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    // == Dedupe ==
    /// Returns the result of the in-flight request for `key`, starting one
    /// with `request` if there is none.
    ///
    /// The pending entry is removed by the request itself as soon as it
    /// settles, on success and on failure, before any waiter is woken. If
    /// every caller stops awaiting, the entry stays and the next caller for
    /// the key drives the same request to completion.
    ///
    /// `request` runs while the pending map is locked and must only build
    /// the future, not touch this coordinator.
    pub async fn dedupe<F, Fut>(&self, key: &str, request: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(existing) => {
                    debug!(key, "joining in-flight request");
                    existing.request.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let shared = self.settling(key.to_string(), id, request());
                    pending.insert(
                        key.to_string(),
                        Pending {
                            id,
                            request: shared.clone(),
                        },
                    );
                    shared
                }
            }
        };
        shared.await
    }

    fn settling<Fut>(&self, key: String, id: u64, fut: Fut) -> SharedRequest<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let pending = Arc::clone(&self.pending);
        async move {
            let result = fut.await;
            let mut pending = pending.lock();
            if pending.get(&key).is_some_and(|p| p.id == id) {
                pending.remove(&key);
            }
            result
        }
        .boxed()
        .shared()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Forgets every in-flight request (logout). Requests already awaited
    /// keep running for their callers.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoaderError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counted_fetch(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl Future<Output = Result<u32>> + Send + 'static {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_call_sites_share_one_fetch() {
        let coordinator = RequestCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            coordinator.dedupe("topic_5", || counted_fetch(&calls, 5)),
            coordinator.dedupe("topic_5", || counted_fetch(&calls, 99)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, Ok(5));
        assert_eq!(b, Ok(5));
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_concurrent_callers() {
        let coordinator = RequestCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_ref = &calls;
        let results = futures::future::join_all(
            (0..10).map(|i| coordinator.dedupe("questions_1", move || counted_fetch(calls_ref, i))),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == Ok(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_do_not_share() {
        let coordinator = RequestCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            coordinator.dedupe("topic_1", || counted_fetch(&calls, 1)),
            coordinator.dedupe("topic_2", || counted_fetch(&calls, 2)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!((a, b), (Ok(1), Ok(2)));
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_cleared() {
        let coordinator: RequestCoordinator<u32> = RequestCoordinator::new();

        let result = coordinator
            .dedupe("topic_1", || async { Err(LoaderError::Fetch("down".into())) })
            .await;
        assert_eq!(result, Err(LoaderError::Fetch("down".into())));
        assert!(!coordinator.is_pending("topic_1"));

        // Next call issues a fresh request
        let result = coordinator.dedupe("topic_1", || async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_fetch_again() {
        let coordinator = RequestCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        coordinator.dedupe("k", || counted_fetch(&calls, 1)).await.unwrap();
        coordinator.dedupe("k", || counted_fetch(&calls, 2)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
