//! Note entity.

use crate::model::{RowId, UserId};
use crate::validation::{require, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the `notes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: RowId,
    pub user_id: UserId,
    pub title: String,
    /// Rich-text body as produced by the editor widget.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub bg_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set on every edit; `None` for never-edited notes.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Case-insensitive substring match over title and content.
    pub fn matches(&self, needle_lowercase: &str) -> bool {
        self.title.to_lowercase().contains(needle_lowercase)
            || self.content.to_lowercase().contains(needle_lowercase)
    }
}

/// Insert payload for a new note. The store stamps `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)
    }

    /// Returns a copy with surrounding whitespace removed from the title.
    pub(crate) fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            ..self.clone()
        }
    }
}

/// Partial update; absent fields are left untouched server-side.
/// `Some(None)` on a color resets it to the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<Option<String>>,
    /// Stamped by [`crate::NoteStore::update`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl NotePatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_none()
            && self.content.is_none()
            && self.bg_color.is_none()
            && self.text_color.is_none()
        {
            return Err(ValidationError::EmptyPatch);
        }
        if let Some(title) = self.title.as_deref() {
            require("title", title)?;
        }
        Ok(())
    }
}
