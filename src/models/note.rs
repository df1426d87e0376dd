use serde::{Deserialize, Serialize};

use crate::clock::Instant;

/// A free-text label with recency tracking.
///
/// Notes power "recently used" suggestions. `text` is the unique key:
/// using an existing text refreshes `last_used` instead of adding a second note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub text: String,
    pub last_used: Instant,
}

/// Input for recording use of a note text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertNoteInput {
    pub text: String,
    pub now: Instant,
}

/// Normalize user-supplied note text; `None` when nothing remains.
pub fn normalize_note_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
