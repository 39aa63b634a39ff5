//! Tasks store.

use crate::cache::snapshot_cache::SnapshotCache;
use crate::model::task::{Task, TaskDraft, TaskPatch};
use crate::model::{RowId, UserId};
use crate::remote::{RemoteStore, Table};
use crate::store::{Entity, StoreResult, TableStore};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

impl Entity for Task {
    const TABLE: Table = Table::Tasks;

    fn id(&self) -> RowId {
        self.id
    }

    fn owner_id(&self) -> UserId {
        self.user_id
    }
}

/// Mirror of the user's `tasks` rows.
pub struct TaskStore {
    table: TableStore<Task>,
}

impl TaskStore {
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

    pub fn create(&mut self, draft: &TaskDraft) -> StoreResult<Task> {
        draft.validate()?;
        let draft = TaskDraft {
            title: draft.title.trim().to_string(),
            ..draft.clone()
        };
        self.table.create(&draft)
    }

    /// Descriptor checks see the stored task, so a patch may rely on a
    /// `custom_date` the task already carries.
    pub fn update(&mut self, id: RowId, patch: &TaskPatch) -> StoreResult<Task> {
        match self.table.get(id) {
            Some(current) => patch.validate_for(current)?,
            None => patch.validate()?,
        }
        self.table.update(id, patch)
    }

    pub fn set_completed(&mut self, id: RowId, completed: bool) -> StoreResult<Task> {
        self.update(id, &TaskPatch::completed(completed))
    }

    pub fn delete(&mut self, id: RowId) -> StoreResult<()> {
        self.table.delete(id)
    }

    /// Tasks not yet completed, in list order.
    pub fn pending(&self) -> Vec<&Task> {
        self.table
            .items()
            .iter()
            .filter(|task| !task.completed)
            .collect()
    }
}

impl Deref for TaskStore {
    type Target = TableStore<Task>;

    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

impl DerefMut for TaskStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.table
    }
}
