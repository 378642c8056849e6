//! Observable View State
//!
//! What UI collaborators read: current course and topic, the highlights of the
//! current topic, and the last error. Also holds the local patches the loader
//! hands to the optimistic engine.

use serde::Serialize;

use crate::domain::{find_topic, find_topic_mut, insert_ordered, Course, Highlight, Topic};

// == View State ==
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewState {
    pub current_course: Option<Course>,
    pub current_topic: Option<Topic>,
    /// Topic the `highlights` list belongs to
    pub highlights_topic: Option<String>,
    pub highlights: Vec<Highlight>,
    /// Single shared slot for the last user-facing error
    pub last_error: Option<String>,
    /// Bumped each time the course progress aggregate actually changes
    pub progress_revision: u64,
}

// == Load Outcome ==
/// How a load request was served. Loads never raise; failures land in
/// `ViewState::last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Fetched from the data service
    Loaded,
    /// Served from cache or from data already in view
    Cached,
    /// Refused by the circuit breaker
    Rejected,
    /// Fetch failed; see `last_error`
    Failed,
    /// Settled after a logout; nothing was cached or published
    Discarded,
}

impl ViewState {
    /// Completion flag of a topic in the current course.
    pub fn topic_completed(&self, topic_id: &str) -> Option<bool> {
        let course = self.current_course.as_ref()?;
        find_topic(&course.topics, topic_id).map(|t| t.completed)
    }

    // == Completion Patch ==
    /// Sets a topic's completion flag in the current course (and current
    /// topic) and updates the progress aggregate from the delta.
    pub fn set_completion(&mut self, topic_id: &str, completed: bool) -> bool {
        let Some(course) = self.current_course.as_mut() else {
            return false;
        };
        let Some(topic) = find_topic_mut(&mut course.topics, topic_id) else {
            return false;
        };
        let was = topic.completed;
        topic.completed = completed;

        if let Some(current) = self.current_topic.as_mut().filter(|t| t.id == topic_id) {
            current.completed = completed;
        }

        let changed = course.progress.apply_change(was, completed);
        if changed {
            self.progress_revision += 1;
        }
        changed
    }

    // == Highlight Patches ==
    fn shows_topic(&self, topic_id: &str) -> bool {
        self.highlights_topic.as_deref() == Some(topic_id)
    }

    pub fn insert_highlight(&mut self, highlight: Highlight) {
        if self.shows_topic(&highlight.topic_id) {
            insert_ordered(&mut self.highlights, highlight);
        }
    }

    pub fn find_highlight(&self, id: &str) -> Option<&Highlight> {
        self.highlights.iter().find(|h| h.id == id)
    }

    pub fn remove_highlight(&mut self, id: &str) -> Option<Highlight> {
        let index = self.highlights.iter().position(|h| h.id == id)?;
        Some(self.highlights.remove(index))
    }

    /// Swaps a placeholder for the stored highlight.
    pub fn replace_highlight(&mut self, id: &str, highlight: Highlight) {
        if self.remove_highlight(id).is_some() {
            self.insert_highlight(highlight);
        }
    }

    pub fn set_highlight_note(&mut self, id: &str, note: Option<String>) {
        if let Some(highlight) = self.highlights.iter_mut().find(|h| h.id == id) {
            highlight.note = note;
        }
    }
}
