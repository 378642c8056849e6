//! API Module
//!
//! Local HTTP bridge between a UI shell and the course loader.
//!
//! # Endpoints
//! - `GET /courses`, `GET /courses/:id/topics`, `GET /topics/:id/questions` - Cached lists
//! - `POST /courses/:id/load` - Load a course into the view
//! - `POST /topics/:id/select` - Select a topic of the current course
//! - `PUT /topics/:id/completed` - Mark progress
//! - `GET /topics/:id/highlights`, `POST /highlights` - Highlights of a topic
//! - `PATCH /highlights/:id`, `DELETE /highlights/:id` - Edit or remove a highlight
//! - `DELETE /cache/:kind` - Invalidate cached entries (optional `?id=`)
//! - `POST /retry`, `POST /logout` - Session control
//! - `GET /state`, `GET /stats`, `GET /health` - Observability

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
