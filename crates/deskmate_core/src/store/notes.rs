//! Notes store.

use crate::cache::snapshot_cache::SnapshotCache;
use crate::model::note::{Note, NoteDraft, NotePatch};
use crate::model::{RowId, UserId};
use crate::remote::{RemoteStore, Table};
use crate::store::{Entity, StoreResult, TableStore};
use chrono::Utc;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

impl Entity for Note {
    const TABLE: Table = Table::Notes;

    fn id(&self) -> RowId {
        self.id
    }

    fn owner_id(&self) -> UserId {
        self.user_id
    }
}

/// Mirror of the user's `notes` rows.
pub struct NoteStore {
    table: TableStore<Note>,
}

impl NoteStore {
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

    /// Creates a note with a trimmed, non-empty title.
    pub fn create(&mut self, draft: &NoteDraft) -> StoreResult<Note> {
        draft.validate()?;
        self.table.create(&draft.normalized())
    }

    /// Applies `patch` and stamps `updated_at`.
    pub fn update(&mut self, id: RowId, patch: NotePatch) -> StoreResult<Note> {
        patch.validate()?;
        let patch = NotePatch {
            title: patch.title.map(|title| title.trim().to_string()),
            updated_at: Some(Utc::now()),
            ..patch
        };
        self.table.update(id, &patch)
    }

    pub fn delete(&mut self, id: RowId) -> StoreResult<()> {
        self.table.delete(id)
    }

    /// Notes whose title or content contains `query`, ignoring case.
    /// A blank query matches every note.
    pub fn search(&self, query: &str) -> Vec<&Note> {
        let needle = query.trim().to_lowercase();
        self.table
            .items()
            .iter()
            .filter(|note| note.matches(&needle))
            .collect()
    }

    /// Up to `limit` notes, newest first.
    pub fn recent(&self, limit: usize) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.table.items().iter().collect();
        notes.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        notes.truncate(limit);
        notes
    }
}

impl Deref for NoteStore {
    type Target = TableStore<Note>;

    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

impl DerefMut for NoteStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.table
    }
}

#[cfg(test)]
mod tests {
    use super::NoteStore;
    use crate::model::note::NoteDraft;
    use crate::remote::memory::MemoryBackend;
    use crate::remote::AuthApi;
    use std::sync::Arc;

    #[test]
    fn search_and_recent_read_local_list() {
        let backend = Arc::new(MemoryBackend::new());
        let user = backend.add_user("ada@example.com", "secret1", None);
        backend.sign_in("ada@example.com", "secret1").unwrap();

        let mut store = NoteStore::new(backend);
        store.set_owner(Some(user));
        store.create(&NoteDraft::new("Groceries", "milk")).unwrap();
        store.create(&NoteDraft::new("Ideas", "Buy MILK frother")).unwrap();

        assert_eq!(store.search("milk").len(), 2);
        assert_eq!(store.search("idea").len(), 1);
        assert_eq!(store.search("  ").len(), 2);
        assert_eq!(store.recent(1).len(), 1);
    }
}
