//! Course Cache - client-side data cache and load coordination
//!
//! TTL caching, request deduplication, debounce/throttle scheduling, a
//! circuit breaker and optimistic mutations, composed into a course loader
//! with a local HTTP bridge.

pub mod api;
pub mod cache;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod loader;
pub mod models;
pub mod service;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use loader::{CourseLoader, LoadOutcome, ViewState};
pub use tasks::spawn_cleanup_task;
