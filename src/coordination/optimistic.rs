//! Optimistic Mutation Engine
//!
//! Applies a local patch to the observable state before the authoritative
//! call, reconciles with its response, and invalidates the touched cache
//! keys strictly after the acknowledgment.
//!
//! Failed mutations are rolled back: the intent's rollback closure runs and
//! the cache is left untouched, so readers keep the last authoritative data.
//! An intent can carry a liveness check; when it fails by the time the
//! operation settles, no reconcile, rollback or invalidation runs.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::cache::Invalidate;
use crate::error::Result;

type Patch<S> = Box<dyn FnOnce(&mut S) + Send>;
type Reconcile<S, R> = Box<dyn FnOnce(&mut S, &R) + Send>;
type Liveness = Box<dyn Fn() -> bool + Send>;

// == Mutation Intent ==
/// Everything the engine needs to run one optimistic mutation.
pub struct MutationIntent<S, R> {
    label: String,
    apply: Option<Patch<S>>,
    operation: BoxFuture<'static, Result<R>>,
    reconcile: Option<Reconcile<S, R>>,
    rollback: Option<Patch<S>>,
    invalidate: Vec<String>,
    live: Option<Liveness>,
}

impl<S, R> MutationIntent<S, R> {
    /// Starts an intent around the authoritative `operation`.
    pub fn new<Fut>(label: impl Into<String>, operation: Fut) -> Self
    where
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self {
            label: label.into(),
            apply: None,
            operation: operation.boxed(),
            reconcile: None,
            rollback: None,
            invalidate: Vec::new(),
            live: None,
        }
    }

    /// Local patch applied before the operation is awaited.
    pub fn apply(mut self, patch: impl FnOnce(&mut S) + Send + 'static) -> Self {
        self.apply = Some(Box::new(patch));
        self
    }

    /// Aligns local state with the authoritative response.
    pub fn reconcile(mut self, reconcile: impl FnOnce(&mut S, &R) + Send + 'static) -> Self {
        self.reconcile = Some(Box::new(reconcile));
        self
    }

    /// Reverts the local patch when the operation fails.
    pub fn rollback(mut self, patch: impl FnOnce(&mut S) + Send + 'static) -> Self {
        self.rollback = Some(Box::new(patch));
        self
    }

    /// Cache key invalidated once the operation succeeds.
    pub fn invalidate(mut self, key: impl Into<String>) -> Self {
        self.invalidate.push(key.into());
        self
    }

    /// Settlement only touches state and cache while `live` holds.
    pub fn while_live(mut self, live: impl Fn() -> bool + Send + 'static) -> Self {
        self.live = Some(Box::new(live));
        self
    }
}

// == Optimistic Engine ==
pub struct OptimisticEngine<S> {
    state: Arc<RwLock<S>>,
    cache: Arc<dyn Invalidate>,
}

impl<S> Clone for OptimisticEngine<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S> OptimisticEngine<S> {
    pub fn new(state: Arc<RwLock<S>>, cache: Arc<dyn Invalidate>) -> Self {
        Self { state, cache }
    }

    pub fn state(&self) -> &Arc<RwLock<S>> {
        &self.state
    }

    // == Mutate ==
    /// Runs `intent` and returns the authoritative response or its error.
    pub async fn mutate<R>(&self, intent: MutationIntent<S, R>) -> Result<R> {
        let MutationIntent {
            label,
            apply,
            operation,
            reconcile,
            rollback,
            invalidate,
            live,
        } = intent;

        if let Some(apply) = apply {
            apply(&mut self.state.write());
        }

        let result = operation.await;
        if live.is_some_and(|live| !live()) {
            debug!(mutation = %label, "mutation settled after its state was dropped");
            return result;
        }

        match result {
            Ok(response) => {
                if let Some(reconcile) = reconcile {
                    reconcile(&mut self.state.write(), &response);
                }
                for key in &invalidate {
                    self.cache.invalidate_key(key);
                }
                debug!(mutation = %label, invalidated = ?invalidate, "mutation acknowledged");
                Ok(response)
            }
            Err(err) => {
                if let Some(rollback) = rollback {
                    rollback(&mut self.state.write());
                }
                warn!(mutation = %label, error = %err, "mutation failed, local patch rolled back");
                Err(err)
            }
        }
    }
}
