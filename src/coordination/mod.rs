//! Coordination Module
//!
//! Primitives that control the effective concurrency of related async loads:
//! loading flags, request deduplication, debounce/throttle, the circuit
//! breaker and optimistic mutations.

mod breaker;
mod dedupe;
mod loading;
mod optimistic;
mod schedule;

pub use breaker::CircuitBreaker;
pub use dedupe::RequestCoordinator;
pub use loading::LoadingState;
pub use optimistic::{MutationIntent, OptimisticEngine};
pub use schedule::{Debounced, Scheduler, Throttled};
