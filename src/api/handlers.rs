//! API Handlers
//!
//! HTTP request handlers exposing the course loader to a UI shell.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::cache::CacheKind;
use crate::config::Config;
use crate::domain::{find_topic, Course, Highlight, NewHighlight, Question, Topic};
use crate::error::{LoaderError, Result};
use crate::loader::{CourseLoader, LoadOutcome, COURSE_LOADS};
use crate::models::{
    CompletionRequest, HealthResponse, HighlightsResponse, InvalidateQuery, InvalidateResponse,
    LoadResponse, MessageResponse, ProgressResponse, RetryResponse, StateResponse, StatsResponse,
    StoreStatsResponse, UpdateHighlightRequest, UpdateHighlightResponse,
};
use crate::service::DataService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session-scoped loader; clones share the session
    pub loader: CourseLoader,
}

impl AppState {
    pub fn new(loader: CourseLoader) -> Self {
        Self { loader }
    }

    /// Creates a loader over `service` configured from `config`.
    pub fn from_config(config: &Config, service: Arc<dyn DataService>) -> Self {
        Self::new(CourseLoader::new(service, config))
    }
}

/// Handler for GET /courses
pub async fn list_courses_handler(State(state): State<AppState>) -> Result<Json<Vec<Course>>> {
    Ok(Json(state.loader.fetch_courses().await?))
}

/// Handler for GET /courses/:id/topics
pub async fn list_topics_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<Topic>>> {
    Ok(Json(state.loader.fetch_topics(&course_id).await?))
}

/// Handler for GET /topics/:id/questions
pub async fn list_questions_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<Json<Vec<Question>>> {
    Ok(Json(state.loader.fetch_questions(&topic_id).await?))
}

/// Handler for POST /courses/:id/load
///
/// Breaker refusals answer 429; fetch failures are reported in the body.
pub async fn load_course_handler(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<LoadResponse>> {
    let outcome = state.loader.load_course(&course_id).await;
    if outcome == LoadOutcome::Rejected {
        return Err(LoaderError::CircuitOpen(COURSE_LOADS.to_string()));
    }
    Ok(Json(LoadResponse::new(
        course_id,
        outcome,
        state.loader.last_error(),
    )))
}

/// Handler for POST /topics/:id/select
pub async fn select_topic_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Result<Json<LoadResponse>> {
    let outcome = state.loader.select_topic(&topic_id).await?;
    Ok(Json(LoadResponse::new(
        topic_id,
        outcome,
        state.loader.last_error(),
    )))
}

/// Handler for PUT /topics/:id/completed
pub async fn completion_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<ProgressResponse>> {
    state
        .loader
        .mark_topic_completed(&topic_id, req.completed)
        .await?;

    let view = state.loader.state();
    let course = view
        .current_course
        .ok_or_else(|| LoaderError::NotFound("no course loaded".to_string()))?;
    let completed = find_topic(&course.topics, &topic_id).is_some_and(|t| t.completed);

    Ok(Json(ProgressResponse {
        topic_id,
        completed,
        progress: course.progress,
    }))
}

/// Handler for GET /topics/:id/highlights
pub async fn list_highlights_handler(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
) -> Json<HighlightsResponse> {
    let outcome = state.loader.load_highlights(&topic_id).await;
    let view = state.loader.state();
    let highlights = if view.highlights_topic.as_deref() == Some(topic_id.as_str()) {
        view.highlights
    } else {
        Vec::new()
    };

    Json(HighlightsResponse {
        topic_id,
        outcome,
        highlights,
        error: view.last_error.filter(|_| outcome == LoadOutcome::Failed),
    })
}

/// Handler for POST /highlights
pub async fn add_highlight_handler(
    State(state): State<AppState>,
    Json(req): Json<NewHighlight>,
) -> Result<Json<Highlight>> {
    Ok(Json(state.loader.add_highlight(req).await?))
}

/// Handler for PATCH /highlights/:id
///
/// With `debounce` set the save is scheduled and the response returns
/// before it runs.
pub async fn update_highlight_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateHighlightRequest>,
) -> Result<Json<UpdateHighlightResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(LoaderError::InvalidRequest(error_msg));
    }

    if req.debounce {
        state.loader.update_highlight_note_debounced(&id, req.note);
        return Ok(Json(UpdateHighlightResponse {
            id,
            highlight: None,
            scheduled: true,
        }));
    }

    let stored = state.loader.update_highlight(&id, req.note).await?;
    Ok(Json(UpdateHighlightResponse {
        id,
        highlight: Some(stored),
        scheduled: false,
    }))
}

/// Handler for DELETE /highlights/:id
pub async fn delete_highlight_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.loader.delete_highlight(&id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Highlight '{}' deleted successfully",
        id
    ))))
}

/// Handler for DELETE /cache/:kind
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<InvalidateResponse>> {
    let kind: CacheKind = kind.parse().map_err(LoaderError::InvalidRequest)?;
    let removed = state.loader.invalidate_cache(kind, query.id.as_deref());

    Ok(Json(InvalidateResponse {
        kind,
        id: query.id,
        removed,
    }))
}

/// Handler for POST /retry
pub async fn retry_handler(State(state): State<AppState>) -> Json<RetryResponse> {
    Json(state.loader.retry_operation().await.into())
}

/// Handler for POST /logout
pub async fn logout_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.loader.logout();
    Json(MessageResponse::new("Session cleared"))
}

/// Handler for GET /state
pub async fn state_handler(State(state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        view: state.loader.state(),
        loading: state.loader.loading().loading_keys(),
    })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.loader.cache();
    let stores = cache
        .stats()
        .into_iter()
        .map(|(name, stats)| StoreStatsResponse::new(name, &stats))
        .collect();

    Json(StatsResponse {
        total: StoreStatsResponse::new("total", &cache.total_stats()),
        stores,
        breaker_in_flight: state.loader.breaker().in_flight(COURSE_LOADS),
    })
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
