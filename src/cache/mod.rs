//! Cache Module
//!
//! Provides session-scoped in-memory caching with TTL expiration.

mod entry;
mod keys;
mod session;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use keys::{CacheKey, CacheKind};
pub use session::{Invalidate, SessionCache};
pub use stats::CacheStats;
pub use store::TtlCache;
