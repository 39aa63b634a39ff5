//! Task entity and its due-date / reminder descriptors.

use crate::model::{RowId, UserId};
use crate::validation::{require, ValidationError};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Symbolic due-date descriptor; `Custom` pairs with `Task::custom_date`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDate {
    #[default]
    Today,
    Tomorrow,
    Recurring,
    Custom,
}

/// Reminder descriptor; `Custom` pairs with `Task::custom_reminder`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reminder {
    #[serde(rename = "none")]
    None,
    #[default]
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "4hours")]
    FourHours,
    #[serde(rename = "custom")]
    Custom,
}

/// One row of the `tasks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: RowId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: DueDate,
    #[serde(default)]
    pub custom_date: Option<NaiveDate>,
    #[serde(default)]
    pub reminder: Reminder,
    #[serde(default)]
    pub custom_reminder: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    /// Free-form assignee label.
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Resolves the due descriptor against `today`.
    ///
    /// Recurring tasks and custom tasks without a date have no single day.
    pub fn due_on(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self.due_date {
            DueDate::Today => Some(today),
            DueDate::Tomorrow => today.checked_add_days(Days::new(1)),
            DueDate::Recurring => None,
            DueDate::Custom => self.custom_date,
        }
    }
}

/// Insert payload for a new task. The store stamps `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub due_date: DueDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_date: Option<NaiveDate>,
    pub reminder: Reminder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_reminder: Option<DateTime<Utc>>,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        check_descriptors(
            self.due_date,
            self.custom_date,
            self.reminder,
            self.custom_reminder,
        )
    }
}

/// Partial update; absent fields are left untouched server-side.
///
/// Clearable columns take a nested option: `Some(None)` sends `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DueDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<Reminder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_reminder: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<String>>,
}

impl TaskPatch {
    pub fn completed(done: bool) -> Self {
        Self {
            completed: Some(done),
            ..Self::default()
        }
    }

    /// Checks the patch on its own: something to change, no blank title.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if *self == Self::default() {
            return Err(ValidationError::EmptyPatch);
        }
        if let Some(title) = self.title.as_deref() {
            require("title", title)?;
        }
        Ok(())
    }

    /// Checks the descriptors `current` would carry once patched. Patches
    /// that leave every descriptor alone skip that check.
    pub fn validate_for(&self, current: &Task) -> Result<(), ValidationError> {
        self.validate()?;
        let touches_descriptors = self.due_date.is_some()
            || self.custom_date.is_some()
            || self.reminder.is_some()
            || self.custom_reminder.is_some();
        if !touches_descriptors {
            return Ok(());
        }
        check_descriptors(
            self.due_date.unwrap_or(current.due_date),
            self.custom_date.unwrap_or(current.custom_date),
            self.reminder.unwrap_or(current.reminder),
            self.custom_reminder.unwrap_or(current.custom_reminder),
        )
    }
}

fn check_descriptors(
    due_date: DueDate,
    custom_date: Option<NaiveDate>,
    reminder: Reminder,
    custom_reminder: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    if due_date == DueDate::Custom && custom_date.is_none() {
        return Err(ValidationError::MissingCustomDate);
    }
    if reminder == Reminder::Custom && custom_reminder.is_none() {
        return Err(ValidationError::MissingCustomReminder);
    }
    Ok(())
}
