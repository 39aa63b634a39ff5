//! Calendar event entity.
//!
//! # Invariants
//! - `end_at >= start_at`; drafts violating this never reach the backend.

use crate::model::{RowId, UserId};
use crate::validation::{require, ValidationError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One row of the `events` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: RowId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether the event starts on `date` (UTC calendar day).
    pub fn starts_on(&self, date: NaiveDate) -> bool {
        self.start_at.date_naive() == date
    }
}

/// Insert payload for a new event. The store stamps `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub location: String,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            start_at,
            end_at,
            location: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        if self.end_at < self.start_at {
            return Err(ValidationError::EndBeforeStart);
        }
        Ok(())
    }
}
