//! Remote Data Service Module
//!
//! The CRUD surface the loader consumes. Transport and persistence are the
//! implementor's concern; every call resolves to data or an opaque error.

mod memory;

use async_trait::async_trait;

use crate::domain::{Course, Highlight, NewHighlight, ProgressRecord, Question, Topic};

pub use memory::{MemoryDataService, SeedData};

// == Data Service ==
#[async_trait]
pub trait DataService: Send + Sync {
    /// Course headers, without topics.
    async fn list_courses(&self) -> anyhow::Result<Vec<Course>>;

    /// Flat topic list of a course; `children` is empty.
    async fn list_topics(&self, course_id: &str) -> anyhow::Result<Vec<Topic>>;

    async fn list_questions(&self, topic_id: &str) -> anyhow::Result<Vec<Question>>;

    /// Progress records of `user_id` for the topics of `course_id`.
    async fn list_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> anyhow::Result<Vec<ProgressRecord>>;

    async fn upsert_progress(
        &self,
        user_id: &str,
        topic_id: &str,
        completed: bool,
    ) -> anyhow::Result<ProgressRecord>;

    async fn list_highlights(
        &self,
        topic_id: &str,
        user_id: &str,
    ) -> anyhow::Result<Vec<Highlight>>;

    /// Stores a highlight; the service assigns its id and creation time.
    async fn insert_highlight(
        &self,
        user_id: &str,
        highlight: NewHighlight,
    ) -> anyhow::Result<Highlight>;

    async fn update_highlight(&self, id: &str, note: Option<String>) -> anyhow::Result<Highlight>;

    async fn delete_highlight(&self, id: &str) -> anyhow::Result<()>;
}
