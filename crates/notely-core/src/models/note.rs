//! Note model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const LOCAL_ID_PREFIX: &str = "local-";

/// A note identifier.
///
/// Server ids are opaque strings (`notes-jT-jjsyz61J8XKiI`). Notes created
/// while offline get a client id with a `local-` prefix and a UUID v7 body,
/// which is replaced by the server id on the next refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Wrap an id issued by the API.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a client-side id for an optimistic local note.
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7()))
    }

    /// Whether this id was generated on the client.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NoteId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("note id cannot be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A note as exchanged with the notes API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    pub title: String,
    pub body: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Partition flag: archived notes live outside the main list
    #[serde(default)]
    pub archived: bool,
    /// Last local modification, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Note {
    /// Build an unsynced note from a draft, with a client-generated id.
    #[must_use]
    pub fn local(draft: &NoteDraft) -> Self {
        Self::drafted(NoteId::local(), draft, Utc::now())
    }

    /// Build an active note holding `draft`, created and last modified at `at`.
    #[must_use]
    pub fn drafted(id: NoteId, draft: &NoteDraft, at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title.clone(),
            body: draft.body.clone(),
            created_at: at,
            archived: false,
            last_modified: Some(at),
        }
    }

    /// Get the title, falling back to the first body line, truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.body.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }

    /// Timestamp used for recency ordering.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.last_modified.unwrap_or(self.created_at)
    }
}

/// Request body for create and update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub body: String,
}

impl NoteDraft {
    /// Build a draft, trimming the title and rejecting an empty one.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidInput("note title cannot be empty".to_string()));
        }
        Ok(Self {
            title,
            body: body.into(),
        })
    }
}

/// Shallow patch applied to a stored note.
///
/// Has no `archived` field: partition moves only happen
/// through archive/unarchive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl NoteUpdate {
    /// Patch that replaces title and body and stamps the modification time.
    #[must_use]
    pub fn from_draft(draft: &NoteDraft) -> Self {
        Self {
            title: Some(draft.title.clone()),
            body: Some(draft.body.clone()),
            last_modified: Some(Utc::now()),
        }
    }

    /// Merge the present fields into `note`.
    pub fn apply(&self, note: &mut Note) {
        if let Some(title) = &self.title {
            note.title.clone_from(title);
        }
        if let Some(body) = &self.body {
            note.body.clone_from(body);
        }
        if let Some(last_modified) = self.last_modified {
            note.last_modified = Some(last_modified);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_local_unique() {
        let id1 = NoteId::local();
        let id2 = NoteId::local();
        assert_ne!(id1, id2);
        assert!(id1.is_local());
        assert!(!NoteId::new("notes-jT-jjsyz61J8XKiI").is_local());
    }

    #[test]
    fn test_note_id_parse_rejects_blank() {
        assert!("  ".parse::<NoteId>().is_err());
        let id: NoteId = " notes-abc ".parse().unwrap();
        assert_eq!(id.as_str(), "notes-abc");
    }

    #[test]
    fn test_note_deserializes_api_shape() {
        let raw = r#"{
            "id": "notes-jT-jjsyz61J8XKiI",
            "title": "Welcome to Notes, Dimas!",
            "body": "Welcome to Notes, Dimas! This is your first note.",
            "createdAt": "2022-07-28T10:03:12.594Z",
            "archived": false
        }"#;
        let note: Note = serde_json::from_str(raw).unwrap();
        assert_eq!(note.id.as_str(), "notes-jT-jjsyz61J8XKiI");
        assert!(!note.archived);
        assert_eq!(note.last_modified, None);

        let encoded = serde_json::to_value(&note).unwrap();
        assert!(encoded.get("createdAt").is_some());
        assert!(encoded.get("lastModified").is_none());
    }

    #[test]
    fn test_draft_rejects_empty_title() {
        assert!(NoteDraft::new("  ", "body").is_err());
        let draft = NoteDraft::new(" Groceries ", "milk").unwrap();
        assert_eq!(draft.title, "Groceries");
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let mut note = Note::local(&NoteDraft::new("Title", "Body").unwrap());
        let update = NoteUpdate {
            body: Some("New body".to_string()),
            ..Default::default()
        };
        update.apply(&mut note);
        assert_eq!(note.title, "Title");
        assert_eq!(note.body, "New body");
    }

    #[test]
    fn test_preview_falls_back_to_body() {
        let mut note = Note::local(&NoteDraft::new("Title", "First line\nSecond").unwrap());
        assert_eq!(note.preview(3), "Tit");
        note.title = String::new();
        assert_eq!(note.preview(50), "First line");
    }
}
