//! Domain Models
//!
//! Entities served by the remote data service and assembled by the loader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ProgressSummary;

// == Course ==
/// A fully assembled course: topic tree with questions and completion flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Root topics; each node owns its children
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub progress: ProgressSummary,
}

impl Course {
    /// Creates a course header without topics, as returned by `list_courses`.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            topics: Vec::new(),
            progress: ProgressSummary::default(),
        }
    }
}

// == Topic ==
/// A node of the course topic tree.
///
/// The remote service returns topics as a flat list with `parent_id` links and
/// empty `children`; the tree is derived by [`crate::domain::build_tree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub course_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<Topic>,
    #[serde(default)]
    pub level: u32,
    /// Sibling ordering
    #[serde(default)]
    pub order_index: i32,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub completed: bool,
}

impl Topic {
    pub fn new(
        id: impl Into<String>,
        course_id: impl Into<String>,
        parent_id: Option<&str>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            course_id: course_id.into(),
            parent_id: parent_id.map(str::to_string),
            children: Vec::new(),
            level: 0,
            order_index: 0,
            title: title.into(),
            content: String::new(),
            questions: Vec::new(),
            completed: false,
        }
    }

    pub fn with_order(mut self, order_index: i32) -> Self {
        self.order_index = order_index;
        self
    }
}

// == Question ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub topic_id: String,
    pub prompt: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub order_index: i32,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        topic_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            topic_id: topic_id.into(),
            prompt: prompt.into(),
            answer: String::new(),
            order_index: 0,
        }
    }
}

// == Progress Record ==
/// Per-user completion state of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub topic_id: String,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

// == Highlight ==
/// A user's highlighted text range inside a topic's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub highlighted_text: String,
    pub position_start: usize,
    pub position_end: usize,
    #[serde(default)]
    pub context_before: Option<String>,
    #[serde(default)]
    pub context_after: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Highlight creation intent; the service assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHighlight {
    pub topic_id: String,
    pub highlighted_text: String,
    pub position_start: usize,
    pub position_end: usize,
    #[serde(default)]
    pub context_before: Option<String>,
    #[serde(default)]
    pub context_after: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl NewHighlight {
    /// Returns an error message if the range is unusable, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.topic_id.is_empty() {
            return Some("Topic id cannot be empty".to_string());
        }
        if self.highlighted_text.is_empty() {
            return Some("Highlighted text cannot be empty".to_string());
        }
        if self.position_end <= self.position_start {
            return Some("Highlight end must be after its start".to_string());
        }
        None
    }

    /// Materializes the intent as a highlight owned by `user_id`.
    pub fn into_highlight(self, id: impl Into<String>, user_id: impl Into<String>) -> Highlight {
        Highlight {
            id: id.into(),
            user_id: user_id.into(),
            topic_id: self.topic_id,
            highlighted_text: self.highlighted_text,
            position_start: self.position_start,
            position_end: self.position_end,
            context_before: self.context_before,
            context_after: self.context_after,
            note: self.note,
            created_at: Utc::now(),
        }
    }
}

/// Inserts `highlight` keeping the list ordered by `position_start`.
pub fn insert_ordered(highlights: &mut Vec<Highlight>, highlight: Highlight) {
    let at = highlights.partition_point(|h| h.position_start <= highlight.position_start);
    highlights.insert(at, highlight);
}
