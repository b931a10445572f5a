//! Wire representation of notes and the local/remote conversions.
//!
//! The remote store keeps each note at `{principal}/notes/{id}` as an object
//! of scalar fields `{id, title, content, timestamp}`. Conversions are pure:
//! missing or malformed scalars default to empty string / zero instead of
//! failing the batch, and a wire note whose `id` is empty after mapping is
//! discarded because it cannot be addressed. The local `state` flag is never
//! transmitted.

use serde::{Deserialize, Serialize};

use crate::note::{Note, SyncState};

/// A note as stored in the remote tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireNote {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl WireNote {
    /// Serialize a local note for upload.
    pub fn from_note(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            content: note.body.clone(),
            timestamp: note.modified_at,
        }
    }

    /// Convert a pulled wire note into a local record.
    ///
    /// Pulled notes are always `Synced`: the remote copy is the source of
    /// truth once fetched. Returns `None` when the id is empty.
    pub fn into_note(self) -> Option<Note> {
        if self.id.is_empty() {
            return None;
        }
        Some(Note {
            id: self.id,
            title: self.title,
            body: self.content,
            modified_at: self.timestamp,
            state: SyncState::Synced,
        })
    }
}

/// Decode a remote subtree snapshot (`{id -> note}` object) into wire notes.
///
/// Entries that are not objects decode through serde defaults to an empty
/// wire note and are later discarded by [`WireNote::into_note`]. The map key
/// is ignored; the embedded `id` field is authoritative.
pub fn decode_subtree(value: &serde_json::Value) -> Vec<WireNote> {
    match value {
        serde_json::Value::Object(entries) => entries
            .values()
            .map(|child| {
                serde_json::from_value(child.clone()).unwrap_or(WireNote {
                    id: String::new(),
                    title: String::new(),
                    content: String::new(),
                    timestamp: 0,
                })
            })
            .collect(),
        // Absent subtree: the remote returns `null` for an empty namespace.
        _ => Vec::new(),
    }
}
