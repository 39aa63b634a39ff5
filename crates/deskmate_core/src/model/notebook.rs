//! Shared notebook aggregate and its remote row shapes.
//!
//! # Responsibility
//! - Assemble one `SharedNotebook` from a notebook row with embedded
//!   collaborator and content rows.
//!
//! # Invariants
//! - The collaborator list is a set keyed by `user_id`; duplicates coming
//!   from the server are dropped on assembly.
//! - The owner is always reported as a collaborator once assembled from a
//!   complete notebook.

use crate::model::{RowId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorRole {
    Owner,
    #[default]
    Editor,
}

/// One row of `notebook_collaborators`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: RowId,
    pub notebook_id: RowId,
    pub user_id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: CollaboratorRole,
}

/// One row of `notebook_content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct NotebookContentRow {
    pub id: RowId,
    pub notebook_id: RowId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One row of `shared_notebooks`, optionally with embedded children.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct NotebookRow {
    pub id: RowId,
    pub title: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notebook_collaborators: Vec<Collaborator>,
    #[serde(default)]
    pub notebook_content: Vec<NotebookContentRow>,
}

/// Notebook as presented to callers: title, free-text content and the
/// collaborator set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedNotebook {
    pub id: RowId,
    pub title: String,
    pub owner_id: UserId,
    pub content: String,
    /// Id of the backing `notebook_content` row, if one exists.
    pub content_id: Option<RowId>,
    pub collaborators: Vec<Collaborator>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SharedNotebook {
    pub fn is_collaborator(&self, user_id: UserId) -> bool {
        self.collaborators
            .iter()
            .any(|collaborator| collaborator.user_id == user_id)
    }

    /// Case-insensitive lookup by collaborator e-mail.
    pub fn collaborator_by_email(&self, email: &str) -> Option<&Collaborator> {
        let wanted = email.trim().to_lowercase();
        self.collaborators.iter().find(|collaborator| {
            collaborator
                .email
                .as_deref()
                .is_some_and(|value| value.to_lowercase() == wanted)
        })
    }

    pub fn collaborator_ids(&self) -> Vec<UserId> {
        self.collaborators
            .iter()
            .map(|collaborator| collaborator.user_id)
            .collect()
    }

    pub(crate) fn push_collaborator(&mut self, collaborator: Collaborator) {
        if !self.is_collaborator(collaborator.user_id) {
            self.collaborators.push(collaborator);
        }
    }
}

impl SharedNotebook {
    /// Assembles the aggregate from a notebook row and its embedded children.
    pub(crate) fn from_row(row: NotebookRow) -> Self {
        let mut seen = BTreeSet::new();
        let collaborators = row
            .notebook_collaborators
            .into_iter()
            .filter(|collaborator| seen.insert(collaborator.user_id))
            .collect();
        let content_row = row.notebook_content.into_iter().next();
        let updated_at = row
            .updated_at
            .or_else(|| content_row.as_ref().and_then(|content| content.updated_at))
            .unwrap_or(row.created_at);

        Self {
            id: row.id,
            title: row.title,
            owner_id: row.owner_id,
            content: content_row
                .as_ref()
                .map(|content| content.content.clone())
                .unwrap_or_default(),
            content_id: content_row.map(|content| content.id),
            collaborators,
            created_at: row.created_at,
            updated_at,
        }
    }
}
