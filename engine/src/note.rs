//! The note entity and its sync bookkeeping.

use crate::{NoteId, Timestamp};
use serde::{Deserialize, Serialize};

/// Whether the latest local state of a note has been confirmed written to
/// the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Locally mutated since the last confirmed remote write.
    Pending,
    /// Confirmed on the remote, or received from a remote pull.
    Synced,
}

impl SyncState {
    /// Encode for the local store (`0` pending, `1` synced).
    pub(crate) fn to_i64(self) -> i64 {
        match self {
            SyncState::Pending => 0,
            SyncState::Synced => 1,
        }
    }

    pub(crate) fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(SyncState::Pending),
            1 => Some(SyncState::Synced),
            _ => None,
        }
    }
}

/// A note record.
///
/// `modified_at` is a caller-supplied display ordering key in milliseconds
/// since epoch; it is never consulted for conflict resolution. `state` is
/// purely local bookkeeping and is never transmitted to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Opaque identifier, client-generated.
    pub id: NoteId,
    pub title: String,
    pub body: String,
    /// Milliseconds since epoch, display ordering only.
    pub modified_at: Timestamp,
    pub state: SyncState,
}

impl Note {
    /// Create a new note with a fresh random id, stamped with the current
    /// wall-clock time, in `Pending` state.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            body: body.into(),
            modified_at: chrono::Utc::now().timestamp_millis(),
            state: SyncState::Pending,
        }
    }

    /// Replace title and body, refresh `modified_at`, and downgrade to
    /// `Pending`. Edits are full-replace; there is no field-level patching.
    pub fn edited(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.title = title.into();
        self.body = body.into();
        self.modified_at = chrono::Utc::now().timestamp_millis();
        self.state = SyncState::Pending;
        self
    }

    /// Copy of this note with the given sync state.
    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = state;
        self
    }

    /// Whether this note still awaits a confirmed remote write.
    pub fn is_pending(&self) -> bool {
        self.state == SyncState::Pending
    }
}
