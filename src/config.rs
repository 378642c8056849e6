//! Configuration Module
//!
//! Handles loading the loader's TTLs, coordination limits and bridge settings
//! from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Loader configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// TTL in seconds for the course list (near-static)
    pub course_list_ttl: u64,
    /// TTL in seconds for assembled courses and topic lists
    pub course_ttl: u64,
    /// TTL in seconds for per-topic question lists
    pub question_ttl: u64,
    /// TTL in seconds for per-user progress records
    pub progress_ttl: u64,
    /// TTL in seconds for per-user highlight lists
    pub highlight_ttl: u64,
    /// Maximum course load attempts inside one cool-down window
    pub breaker_ceiling: usize,
    /// Cool-down window of the circuit breaker in milliseconds
    pub breaker_cooldown_ms: u64,
    /// Number of question fetches issued concurrently during a course load
    pub fetch_batch_size: usize,
    /// Minimum interval between two mutation-triggered course refreshes
    pub refresh_throttle_ms: u64,
    /// Quiet period before a highlight note edit is saved
    pub note_debounce_ms: u64,
    /// User whose progress and highlights this session reads
    pub user_id: String,
    /// HTTP bridge port
    pub server_port: u16,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Optional JSON seed file for the in-process data service
    pub seed_path: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `COURSE_LIST_TTL` - Course list TTL in seconds (default: 1800)
    /// - `COURSE_TTL` - Course/topic TTL in seconds (default: 600)
    /// - `QUESTION_TTL` - Question TTL in seconds (default: 300)
    /// - `PROGRESS_TTL` - Progress TTL in seconds (default: 300)
    /// - `HIGHLIGHT_TTL` - Highlight TTL in seconds (default: 300)
    /// - `BREAKER_CEILING` - Attempts allowed per window (default: 10)
    /// - `BREAKER_COOLDOWN_MS` - Breaker window in ms (default: 5000)
    /// - `FETCH_BATCH_SIZE` - Concurrent question fetches (default: 5)
    /// - `REFRESH_THROTTLE_MS` - Refresh throttle interval in ms (default: 1000)
    /// - `NOTE_DEBOUNCE_MS` - Note save debounce in ms (default: 500)
    /// - `SESSION_USER_ID` - Session user (default: "local-user")
    /// - `SERVER_PORT` - HTTP bridge port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `SEED_PATH` - Seed data file (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            course_list_ttl: env_or("COURSE_LIST_TTL", defaults.course_list_ttl),
            course_ttl: env_or("COURSE_TTL", defaults.course_ttl),
            question_ttl: env_or("QUESTION_TTL", defaults.question_ttl),
            progress_ttl: env_or("PROGRESS_TTL", defaults.progress_ttl),
            highlight_ttl: env_or("HIGHLIGHT_TTL", defaults.highlight_ttl),
            breaker_ceiling: env_or("BREAKER_CEILING", defaults.breaker_ceiling),
            breaker_cooldown_ms: env_or("BREAKER_COOLDOWN_MS", defaults.breaker_cooldown_ms),
            fetch_batch_size: env_or("FETCH_BATCH_SIZE", defaults.fetch_batch_size).max(1),
            refresh_throttle_ms: env_or("REFRESH_THROTTLE_MS", defaults.refresh_throttle_ms),
            note_debounce_ms: env_or("NOTE_DEBOUNCE_MS", defaults.note_debounce_ms),
            user_id: env::var("SESSION_USER_ID").unwrap_or(defaults.user_id),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            seed_path: env::var("SEED_PATH").ok().filter(|p| !p.is_empty()),
        }
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.breaker_cooldown_ms)
    }

    pub fn refresh_throttle(&self) -> Duration {
        Duration::from_millis(self.refresh_throttle_ms)
    }

    pub fn note_debounce(&self) -> Duration {
        Duration::from_millis(self.note_debounce_ms)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            course_list_ttl: 1800,
            course_ttl: 600,
            question_ttl: 300,
            progress_ttl: 300,
            highlight_ttl: 300,
            breaker_ceiling: 10,
            breaker_cooldown_ms: 5000,
            fetch_batch_size: 5,
            refresh_throttle_ms: 1000,
            note_debounce_ms: 500,
            user_id: "local-user".to_string(),
            server_port: 3000,
            cleanup_interval: 60,
            seed_path: None,
        }
    }
}
