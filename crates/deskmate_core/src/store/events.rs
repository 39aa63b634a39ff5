//! Events store. Events are created and deleted, never edited.

use crate::cache::snapshot_cache::SnapshotCache;
use crate::model::event::{Event, EventDraft};
use crate::model::{RowId, UserId};
use crate::remote::{RemoteStore, Table};
use crate::store::{Entity, StoreResult, TableStore};
use chrono::{DateTime, NaiveDate, Utc};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Default number of entries returned by [`EventStore::upcoming`].
pub const DEFAULT_UPCOMING_LIMIT: usize = 5;

impl Entity for Event {
    const TABLE: Table = Table::Events;

    fn id(&self) -> RowId {
        self.id
    }

    fn owner_id(&self) -> UserId {
        self.user_id
    }
}

/// Mirror of the user's `events` rows.
pub struct EventStore {
    table: TableStore<Event>,
}

impl EventStore {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            table: TableStore::new(remote),
        }
    }

    pub fn with_cache(self, cache: Arc<SnapshotCache>) -> Self {
        Self {
            table: self.table.with_cache(cache),
        }
    }

    /// Creates an event; an end before the start is rejected locally.
    pub fn create(&mut self, draft: &EventDraft) -> StoreResult<Event> {
        draft.validate()?;
        let draft = EventDraft {
            title: draft.title.trim().to_string(),
            ..draft.clone()
        };
        self.table.create(&draft)
    }

    pub fn delete(&mut self, id: RowId) -> StoreResult<()> {
        self.table.delete(id)
    }

    /// Events starting at or after `now`, soonest first, at most `limit`.
    pub fn upcoming(&self, now: DateTime<Utc>, limit: usize) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .table
            .items()
            .iter()
            .filter(|event| event.start_at >= now)
            .collect();
        events.sort_by_key(|event| event.start_at);
        events.truncate(limit);
        events
    }

    pub fn on_date(&self, date: NaiveDate) -> Vec<&Event> {
        self.table
            .items()
            .iter()
            .filter(|event| event.starts_on(date))
            .collect()
    }
}

impl Deref for EventStore {
    type Target = TableStore<Event>;

    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

impl DerefMut for EventStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.table
    }
}
