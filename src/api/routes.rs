//! API Routes
//!
//! Configures the Axum router with every loader bridge endpoint.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    add_highlight_handler, completion_handler, delete_highlight_handler, health_handler,
    invalidate_handler, list_courses_handler, list_highlights_handler, list_questions_handler,
    list_topics_handler, load_course_handler, logout_handler, retry_handler, select_topic_handler,
    state_handler, stats_handler, update_highlight_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin, the UI shell is served separately
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/courses", get(list_courses_handler))
        .route("/courses/:id/topics", get(list_topics_handler))
        .route("/courses/:id/load", post(load_course_handler))
        .route("/topics/:id/questions", get(list_questions_handler))
        .route("/topics/:id/select", post(select_topic_handler))
        .route("/topics/:id/completed", put(completion_handler))
        .route("/topics/:id/highlights", get(list_highlights_handler))
        .route("/highlights", post(add_highlight_handler))
        .route(
            "/highlights/:id",
            delete(delete_highlight_handler).patch(update_highlight_handler),
        )
        .route("/cache/:kind", delete(invalidate_handler))
        .route("/retry", post(retry_handler))
        .route("/logout", post(logout_handler))
        .route("/state", get(state_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
