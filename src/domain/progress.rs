//! Progress Aggregate Module
//!
//! Course-level completion statistics, maintained incrementally on mutation.

use serde::{Deserialize, Serialize};

use crate::domain::tree::{count_completed, count_topics};
use crate::domain::Topic;

// == Progress Summary ==
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSummary {
    /// Number of completed topics
    pub completed: usize,
    /// Number of topics in the course
    pub total: usize,
    /// completed / total * 100, or 0.0 for an empty course
    pub percentage: f64,
}

impl ProgressSummary {
    pub fn new(completed: usize, total: usize) -> Self {
        let completed = completed.min(total);
        Self {
            completed,
            total,
            percentage: percentage(completed, total),
        }
    }

    /// Counts the whole tree. Used once per assembled course.
    pub fn from_tree(tree: &[Topic]) -> Self {
        Self::new(count_completed(tree), count_topics(tree))
    }

    // == Apply Change ==
    /// Applies one topic's completion change in O(1).
    ///
    /// Returns `false` without touching the aggregate when the flag did not
    /// actually change.
    pub fn apply_change(&mut self, was_completed: bool, completed: bool) -> bool {
        match (was_completed, completed) {
            (false, true) if self.completed < self.total => self.completed += 1,
            (true, false) if self.completed > 0 => self.completed -= 1,
            _ => return false,
        }
        self.percentage = percentage(self.completed, self.total);
        true
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}
