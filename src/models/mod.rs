//! Request and Response models for the loader bridge API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{CompletionRequest, InvalidateQuery, UpdateHighlightRequest};
pub use responses::{
    HealthResponse, HighlightsResponse, InvalidateResponse, LoadResponse, MessageResponse,
    ProgressResponse, RetryResponse, StateResponse, StatsResponse, StoreStatsResponse,
    UpdateHighlightResponse,
};
