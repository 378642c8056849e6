//! Domain Module
//!
//! Course, topic, question, progress and highlight entities plus the derived
//! topic tree and progress aggregate.

mod models;
mod progress;
mod tree;

pub use models::{insert_ordered, Course, Highlight, NewHighlight, ProgressRecord, Question, Topic};
pub use progress::ProgressSummary;
pub use tree::{build_tree, count_completed, count_topics, find_topic, find_topic_mut, flatten};
