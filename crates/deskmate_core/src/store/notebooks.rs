//! Shared notebook store.
//!
//! # Responsibility
//! - Mirror notebooks owned by the user, with collaborators and content.
//! - Keep a separate read-mostly list of notebooks shared with the user.
//! - Drive the multi-row create and delete sequences.
//!
//! # Invariants
//! - A created notebook has an owner collaborator row and a content row, or
//!   nothing is kept locally and the rows already written are deleted again.
//! - Deletion runs collaborators, content, notebook, and stops at the first
//!   failing step.
//! - The owner can never be removed from the collaborator set.

use crate::cache::snapshot_cache::{SnapshotCache, SnapshotKey};
use crate::model::notebook::{
    Collaborator, CollaboratorRole, NotebookContentRow, NotebookRow, SharedNotebook,
};
use crate::model::session::{AuthUser, UserProfile};
use crate::model::{RowId, UserId};
use crate::remote::{Embed, Filter, RemoteError, RemoteResult, RemoteStore, Table};
use crate::store::{decode_rows, log_failure, save_snapshot, SagaStep, StoreError, StoreResult};
use crate::validation::{require, validate_email, ValidationError};
use chrono::Utc;
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

const NOTEBOOK_EMBEDS: [Embed; 2] = [
    Embed::new(Table::NotebookCollaborators, "notebook_id"),
    Embed::new(Table::NotebookContent, "notebook_id"),
];

pub struct NotebookStore {
    remote: Arc<dyn RemoteStore>,
    cache: Option<Arc<SnapshotCache>>,
    owner: Option<AuthUser>,
    items: Vec<SharedNotebook>,
    shared: Vec<SharedNotebook>,
    active: Option<RowId>,
    loading: bool,
}

impl NotebookStore {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            cache: None,
            owner: None,
            items: Vec::new(),
            shared: Vec::new(),
            active: None,
            loading: false,
        }
    }

    pub fn with_cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Notebooks owned by the bound user.
    pub fn items(&self) -> &[SharedNotebook] {
        &self.items
    }

    /// Notebooks other users share with the bound user.
    pub fn shared(&self) -> &[SharedNotebook] {
        &self.shared
    }

    /// Looks `id` up among owned, then shared notebooks.
    pub fn get(&self, id: RowId) -> Option<&SharedNotebook> {
        self.items
            .iter()
            .chain(self.shared.iter())
            .find(|notebook| notebook.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner.as_ref().map(|user| user.id)
    }

    /// Binds the store to `user`. Lists and the active notebook are cleared
    /// when the user changes.
    pub fn set_owner(&mut self, user: Option<&AuthUser>) {
        if self.owner() != user.map(|user| user.id) {
            self.items.clear();
            self.shared.clear();
            self.active = None;
        }
        self.owner = user.cloned();
    }

    pub fn active(&self) -> Option<&SharedNotebook> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn set_active(&mut self, id: RowId) -> StoreResult<()> {
        if self.get(id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    pub fn restore_cached(&mut self) -> StoreResult<usize> {
        let owner = self.require_owner()?;
        let Some(cache) = self.cache.as_ref() else {
            return Ok(0);
        };
        match cache.load::<SharedNotebook>(&SnapshotKey::new(Table::SharedNotebooks, owner)) {
            Ok(Some(notebooks)) => {
                self.items = notebooks
                    .into_iter()
                    .filter(|notebook| notebook.owner_id == owner)
                    .collect();
                Ok(self.items.len())
            }
            Ok(None) => Ok(0),
            Err(err) => {
                warn!("event=cache_restore module=store status=error table=shared_notebooks error={err}");
                Ok(0)
            }
        }
    }

    /// Reloads owned notebooks with their collaborators and content.
    pub fn fetch_all(&mut self) -> StoreResult<usize> {
        let owner = self.require_owner()?;
        let filter = Filter::new().eq("owner_id", owner);

        self.loading = true;
        let fetched = self.select_notebooks(&filter);
        self.loading = false;

        match fetched {
            Ok(notebooks) => {
                self.items = notebooks
                    .into_iter()
                    .filter(|notebook| notebook.owner_id == owner)
                    .collect();
                if self.active.is_some_and(|id| self.get(id).is_none()) {
                    self.active = None;
                }
                info!(
                    "event=store_fetch module=store status=ok table=shared_notebooks count={}",
                    self.items.len()
                );
                self.persist();
                Ok(self.items.len())
            }
            Err(err) => {
                self.items.clear();
                log_failure("store_fetch", Table::SharedNotebooks, &err);
                Err(err)
            }
        }
    }

    /// Reloads notebooks where the user collaborates without owning them.
    pub fn fetch_shared(&mut self) -> StoreResult<usize> {
        let owner = self.require_owner()?;

        self.loading = true;
        let fetched = self.load_shared(owner);
        self.loading = false;

        match fetched {
            Ok(notebooks) => {
                self.shared = notebooks;
                info!(
                    "event=store_fetch_shared module=store status=ok count={}",
                    self.shared.len()
                );
                Ok(self.shared.len())
            }
            Err(err) => {
                self.shared.clear();
                log_failure("store_fetch_shared", Table::SharedNotebooks, &err);
                Err(err)
            }
        }
    }

    /// Creates a notebook with its owner collaborator and an empty content
    /// row, and makes it the active notebook.
    ///
    /// A failure after the notebook row exists deletes the rows already
    /// written and reports [`StoreError::PartialFailure`].
    pub fn create(&mut self, title: &str) -> StoreResult<SharedNotebook> {
        require("title", title)?;
        let user = self.owner.clone().ok_or(StoreError::NotAuthenticated)?;

        let mut row: NotebookRow = self
            .insert_one(
                Table::SharedNotebooks,
                json!({ "title": title.trim(), "owner_id": user.id }),
            )
            .map_err(StoreError::from)
            .inspect_err(|err| log_failure("notebook_create", Table::SharedNotebooks, err))?;

        let collaborator: Collaborator = match self.insert_one(
            Table::NotebookCollaborators,
            json!({
                "notebook_id": row.id,
                "user_id": user.id,
                "email": user.email,
                "role": CollaboratorRole::Owner,
            }),
        ) {
            Ok(collaborator) => collaborator,
            Err(source) => {
                let compensated = self.compensate(row.id, user.id, false);
                return Err(saga_failure(
                    SagaStep::CreateOwnerCollaborator,
                    compensated,
                    source,
                ));
            }
        };

        let content: NotebookContentRow = match self.insert_one(
            Table::NotebookContent,
            json!({ "notebook_id": row.id, "content": "" }),
        ) {
            Ok(content) => content,
            Err(source) => {
                let compensated = self.compensate(row.id, user.id, true);
                return Err(saga_failure(SagaStep::CreateContent, compensated, source));
            }
        };

        row.notebook_collaborators = vec![collaborator];
        row.notebook_content = vec![content];
        let notebook = SharedNotebook::from_row(row);
        info!(
            "event=notebook_create module=store status=ok id={}",
            notebook.id
        );
        self.active = Some(notebook.id);
        self.items.push(notebook.clone());
        self.persist();
        Ok(notebook)
    }

    pub fn rename(&mut self, id: RowId, title: &str) -> StoreResult<SharedNotebook> {
        require("title", title)?;
        let owner = self.require_owner()?;
        let index = self.owned_position(id)?;

        let filter = Filter::new().eq("id", id).eq("owner_id", owner);
        let patch = json!({ "title": title.trim(), "updated_at": Utc::now() });
        let row: NotebookRow = self
            .remote
            .update(Table::SharedNotebooks, &filter, patch)
            .map_err(StoreError::from)
            .and_then(decode_rows::<NotebookRow>)
            .and_then(|rows| rows.into_iter().next().ok_or(StoreError::NotFound(id)))
            .inspect_err(|err| log_failure("notebook_rename", Table::SharedNotebooks, err))?;

        let notebook = &mut self.items[index];
        notebook.title = row.title;
        notebook.updated_at = row.updated_at.unwrap_or_else(Utc::now);
        let renamed = notebook.clone();
        self.persist();
        Ok(renamed)
    }

    /// Replaces the notebook body, creating its content row if missing.
    ///
    /// Works on owned and shared notebooks alike.
    pub fn save_content(&mut self, id: RowId, content: &str) -> StoreResult<SharedNotebook> {
        self.require_owner()?;
        let notebook = self.get(id).ok_or(StoreError::NotFound(id))?;

        let saved = match notebook.content_id {
            Some(content_id) => self
                .remote
                .update(
                    Table::NotebookContent,
                    &Filter::new().eq("id", content_id),
                    json!({ "content": content, "updated_at": Utc::now() }),
                )
                .map_err(StoreError::from)
                .and_then(decode_rows::<NotebookContentRow>)
                .and_then(|rows| {
                    rows.into_iter()
                        .next()
                        .ok_or(StoreError::NotFound(content_id))
                }),
            None => self
                .insert_one(
                    Table::NotebookContent,
                    json!({ "notebook_id": id, "content": content, "updated_at": Utc::now() }),
                )
                .map_err(StoreError::from),
        }
        .inspect_err(|err| log_failure("notebook_save_content", Table::NotebookContent, err))?;

        let notebook = self.get_mut(id).ok_or(StoreError::NotFound(id))?;
        notebook.content = saved.content;
        notebook.content_id = Some(saved.id);
        notebook.updated_at = saved.updated_at.unwrap_or_else(Utc::now);
        let updated = notebook.clone();
        self.persist();
        Ok(updated)
    }

    /// Invites the account registered under `email` as an editor.
    ///
    /// Already-present collaborators are left as they are.
    pub fn add_collaborator(&mut self, id: RowId, email: &str) -> StoreResult<SharedNotebook> {
        validate_email(email)?;
        self.require_owner()?;
        let index = self.owned_position(id)?;
        let email = email.trim();
        if self.items[index].collaborator_by_email(email).is_some() {
            return Ok(self.items[index].clone());
        }

        let profile = self
            .remote
            .select(Table::Users, &Filter::new().eq("email", email), &[])
            .map_err(StoreError::from)
            .and_then(decode_rows::<UserProfile>)
            .inspect_err(|err| log_failure("notebook_invite", Table::Users, err))?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::UserNotFound(email.to_string()))
            .inspect_err(|_| {
                warn!("event=notebook_invite module=store status=error error_code=user_not_found");
            })?;

        if self.items[index].is_collaborator(profile.id) {
            return Ok(self.items[index].clone());
        }

        let collaborator: Collaborator = self
            .insert_one(
                Table::NotebookCollaborators,
                json!({
                    "notebook_id": id,
                    "user_id": profile.id,
                    "email": profile.email,
                    "role": CollaboratorRole::Editor,
                }),
            )
            .map_err(StoreError::from)
            .inspect_err(|err| {
                log_failure("notebook_invite", Table::NotebookCollaborators, err)
            })?;

        info!("event=notebook_invite module=store status=ok id={id}");
        let notebook = &mut self.items[index];
        notebook.push_collaborator(collaborator);
        let updated = notebook.clone();
        self.persist();
        Ok(updated)
    }

    pub fn remove_collaborator(
        &mut self,
        id: RowId,
        user_id: UserId,
    ) -> StoreResult<SharedNotebook> {
        self.require_owner()?;
        let index = self.owned_position(id)?;
        let notebook = &self.items[index];
        if user_id == notebook.owner_id {
            return Err(ValidationError::CannotRemoveOwner.into());
        }
        if !notebook.is_collaborator(user_id) {
            return Err(StoreError::NotFound(user_id));
        }

        let filter = Filter::new().eq("notebook_id", id).eq("user_id", user_id);
        self.remote
            .delete(Table::NotebookCollaborators, &filter)
            .map_err(StoreError::from)
            .inspect_err(|err| {
                log_failure("notebook_uninvite", Table::NotebookCollaborators, err)
            })?;

        let notebook = &mut self.items[index];
        notebook
            .collaborators
            .retain(|collaborator| collaborator.user_id != user_id);
        let updated = notebook.clone();
        self.persist();
        Ok(updated)
    }

    /// Deletes collaborators, content, then the notebook row.
    ///
    /// The first failing step aborts the rest; the local entry is kept.
    pub fn delete(&mut self, id: RowId) -> StoreResult<()> {
        let owner = self.require_owner()?;
        let index = self.owned_position(id)?;

        let steps = [
            (
                SagaStep::DeleteCollaborators,
                Table::NotebookCollaborators,
                Filter::new().eq("notebook_id", id),
            ),
            (
                SagaStep::DeleteContent,
                Table::NotebookContent,
                Filter::new().eq("notebook_id", id),
            ),
            (
                SagaStep::DeleteNotebook,
                Table::SharedNotebooks,
                Filter::new().eq("id", id).eq("owner_id", owner),
            ),
        ];
        for (step, table, filter) in steps {
            if let Err(source) = self.remote.delete(table, &filter) {
                return Err(saga_failure(step, false, source));
            }
        }

        info!("event=notebook_delete module=store status=ok id={id}");
        self.items.remove(index);
        if self.active == Some(id) {
            self.active = None;
        }
        self.persist();
        Ok(())
    }

    fn require_owner(&self) -> StoreResult<UserId> {
        self.owner().ok_or(StoreError::NotAuthenticated)
    }

    fn owned_position(&self, id: RowId) -> StoreResult<usize> {
        self.items
            .iter()
            .position(|notebook| notebook.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn get_mut(&mut self, id: RowId) -> Option<&mut SharedNotebook> {
        self.items
            .iter_mut()
            .chain(self.shared.iter_mut())
            .find(|notebook| notebook.id == id)
    }

    fn select_notebooks(&self, filter: &Filter) -> StoreResult<Vec<SharedNotebook>> {
        let rows = self
            .remote
            .select(Table::SharedNotebooks, filter, &NOTEBOOK_EMBEDS)?;
        Ok(decode_rows::<NotebookRow>(rows)?
            .into_iter()
            .map(SharedNotebook::from_row)
            .collect())
    }

    fn load_shared(&self, user: UserId) -> StoreResult<Vec<SharedNotebook>> {
        let memberships: Vec<Collaborator> = decode_rows(self.remote.select(
            Table::NotebookCollaborators,
            &Filter::new().eq("user_id", user),
            &[],
        )?)?;
        let notebook_ids: BTreeSet<RowId> = memberships
            .into_iter()
            .map(|membership| membership.notebook_id)
            .collect();

        let mut shared = Vec::new();
        for notebook_id in notebook_ids {
            let found = self.select_notebooks(&Filter::new().eq("id", notebook_id))?;
            shared.extend(found.into_iter().filter(|notebook| notebook.owner_id != user));
        }
        Ok(shared)
    }

    /// Inserts one row and decodes the stored representation.
    fn insert_one<T: DeserializeOwned>(&self, table: Table, row: Value) -> RemoteResult<T> {
        let stored = self.remote.insert(table, row)?;
        let first = stored
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::decode(format!("insert into `{table}` returned no row")))?;
        serde_json::from_value(first).map_err(|err| RemoteError::decode(err.to_string()))
    }

    /// Removes rows written by an interrupted create. Returns whether every
    /// compensating delete succeeded.
    fn compensate(&self, notebook_id: RowId, owner: UserId, has_collaborator: bool) -> bool {
        let mut undo = Vec::with_capacity(2);
        if has_collaborator {
            undo.push((
                Table::NotebookCollaborators,
                Filter::new().eq("notebook_id", notebook_id),
            ));
        }
        undo.push((
            Table::SharedNotebooks,
            Filter::new().eq("id", notebook_id).eq("owner_id", owner),
        ));

        let mut complete = true;
        for (table, filter) in undo {
            if let Err(err) = self.remote.delete(table, &filter) {
                error!(
                    "event=notebook_compensate module=store status=error table={table} notebook_id={notebook_id} error={err}"
                );
                complete = false;
            }
        }
        complete
    }

    fn persist(&self) {
        if let (Some(cache), Some(owner)) = (self.cache.as_ref(), self.owner()) {
            save_snapshot(
                cache,
                SnapshotKey::new(Table::SharedNotebooks, owner),
                &self.items,
            );
        }
    }
}

fn saga_failure(step: SagaStep, compensated: bool, source: RemoteError) -> StoreError {
    warn!(
        "event=notebook_saga module=store status=error step={step} compensated={compensated} error={source}"
    );
    StoreError::PartialFailure {
        step,
        compensated,
        source,
    }
}
