//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the bridge serves.
//!
//! # Tasks
//! - TTL Sweep: Removes expired entries from the session cache

mod cleanup;

pub use cleanup::spawn_cleanup_task;
