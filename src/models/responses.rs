//! Response DTOs for the loader bridge API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheKind, CacheStats};
use crate::domain::{Highlight, ProgressSummary};
use crate::loader::{LoadOutcome, ViewState};

/// Response body for POST /courses/:id/load and POST /topics/:id/select
#[derive(Debug, Clone, Serialize)]
pub struct LoadResponse {
    pub id: String,
    pub outcome: LoadOutcome,
    /// Set when the load failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadResponse {
    pub fn new(id: impl Into<String>, outcome: LoadOutcome, error: Option<String>) -> Self {
        Self {
            id: id.into(),
            outcome,
            error: error.filter(|_| outcome == LoadOutcome::Failed),
        }
    }
}

/// Response body for GET /topics/:id/highlights
#[derive(Debug, Clone, Serialize)]
pub struct HighlightsResponse {
    pub topic_id: String,
    pub outcome: LoadOutcome,
    pub highlights: Vec<Highlight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body for PUT /topics/:id/completed
#[derive(Debug, Clone, Serialize)]
pub struct ProgressResponse {
    pub topic_id: String,
    pub completed: bool,
    pub progress: ProgressSummary,
}

/// Response body for PATCH /highlights/:id
#[derive(Debug, Clone, Serialize)]
pub struct UpdateHighlightResponse {
    pub id: String,
    /// Stored highlight, absent when the save was debounced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Highlight>,
    pub scheduled: bool,
}

/// Response body for DELETE /cache/:kind
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub kind: CacheKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub removed: usize,
}

/// Response body for POST /retry
#[derive(Debug, Clone, Serialize)]
pub struct RetryResponse {
    pub retried: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<LoadOutcome>,
}

impl From<Option<LoadOutcome>> for RetryResponse {
    fn from(outcome: Option<LoadOutcome>) -> Self {
        Self {
            retried: outcome.is_some(),
            outcome,
        }
    }
}

/// Plain acknowledgement (DELETE /highlights/:id, POST /logout)
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for GET /state
#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub view: ViewState,
    /// Operations currently in flight
    pub loading: Vec<String>,
}

/// Statistics of one entity store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatsResponse {
    pub name: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub total_entries: usize,
    pub hit_rate: f64,
}

impl StoreStatsResponse {
    pub fn new(name: &'static str, stats: &CacheStats) -> Self {
        Self {
            name,
            hits: stats.hits,
            misses: stats.misses,
            invalidations: stats.invalidations,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Totals over every store
    #[serde(flatten)]
    pub total: StoreStatsResponse,
    pub stores: Vec<StoreStatsResponse>,
    /// Course load attempts counting against the breaker
    pub breaker_in_flight: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_response_hides_error_unless_failed() {
        let resp = LoadResponse::new("c1", LoadOutcome::Cached, Some("stale".to_string()));
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"id":"c1","outcome":"cached"}"#);

        let resp = LoadResponse::new("c1", LoadOutcome::Failed, Some("boom".to_string()));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""error":"boom""#));
    }

    #[test]
    fn test_store_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            invalidations: 5,
            total_entries: 3,
        };
        let resp = StoreStatsResponse::new("course", &stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_retry_response_from_outcome() {
        let resp = RetryResponse::from(None);
        assert!(!resp.retried);
        let json = serde_json::to_string(&RetryResponse::from(Some(LoadOutcome::Loaded))).unwrap();
        assert_eq!(json, r#"{"retried":true,"outcome":"loaded"}"#);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
