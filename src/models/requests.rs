//! Request DTOs for the loader bridge API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.
//! New highlights are posted as `domain::NewHighlight` directly.

use serde::Deserialize;

/// Request body for PUT /topics/:id/completed
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub completed: bool,
}

/// Request body for PATCH /highlights/:id
///
/// # Fields
/// - `note`: New note, `null` clears it
/// - `debounce`: Save once edits pause instead of immediately
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateHighlightRequest {
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub debounce: bool,
}

impl UpdateHighlightRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        match &self.note {
            Some(note) if note.len() > 10_000 => {
                Some("Note exceeds maximum length of 10000 characters".to_string())
            }
            _ => None,
        }
    }
}

/// Query string of DELETE /cache/:kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateQuery {
    /// Entity id; the whole class is invalidated when absent
    #[serde(default)]
    pub id: Option<String>,
}
