//! Domain stores mirroring remote tables for the signed-in user.
//!
//! # Responsibility
//! - Keep an ordered in-memory list per table, scoped to one owner.
//! - Reconcile that list only from confirmed server responses.
//!
//! # Invariants
//! - Local state never changes when a remote call fails.
//! - Rows whose owner differs from the bound owner are never kept.
//! - Created rows are appended in server-returned form, never re-sorted.
//! - The cache snapshot is rewritten after every confirmed response; cache
//!   failures are logged and do not fail the operation.

use crate::cache::snapshot_cache::{SnapshotCache, SnapshotKey};
use crate::logging::sanitize_message;
use crate::model::{RowId, UserId};
use crate::remote::{Filter, RemoteError, RemoteStore, Table};
use crate::validation::ValidationError;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod auth;
pub mod events;
pub mod notebooks;
pub mod notes;
pub mod tasks;

pub type StoreResult<T> = Result<T, StoreError>;

/// Step of a multi-row notebook write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    CreateNotebook,
    CreateOwnerCollaborator,
    CreateContent,
    DeleteCollaborators,
    DeleteContent,
    DeleteNotebook,
}

impl SagaStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateNotebook => "create_notebook",
            Self::CreateOwnerCollaborator => "create_owner_collaborator",
            Self::CreateContent => "create_content",
            Self::DeleteCollaborators => "delete_collaborators",
            Self::DeleteContent => "delete_content",
            Self::DeleteNotebook => "delete_notebook",
        }
    }
}

impl Display for SagaStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Input rejected before any remote call.
    Validation(ValidationError),
    Remote(RemoteError),
    /// No owner is bound; nothing was sent.
    NotAuthenticated,
    /// A session is already held; sign out before signing in again.
    AlreadyAuthenticated,
    /// Id is not in the local list, or the server no longer has it.
    NotFound(RowId),
    /// No account matches the e-mail used for an invitation.
    UserNotFound(String),
    /// Server response could not be decoded into the entity.
    InvalidRow(String),
    /// A multi-row write stopped at `step`. `compensated` tells whether the
    /// rows written before it were removed again.
    PartialFailure {
        step: SagaStep,
        compensated: bool,
        source: RemoteError,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "remote call failed: {err}"),
            Self::NotAuthenticated => write!(f, "not signed in"),
            Self::AlreadyAuthenticated => write!(f, "already signed in; sign out first"),
            Self::NotFound(id) => write!(f, "row {id} not found"),
            Self::UserNotFound(email) => write!(f, "no user is registered as `{email}`"),
            Self::InvalidRow(reason) => write!(f, "unexpected row from server: {reason}"),
            Self::PartialFailure {
                step,
                compensated,
                source,
            } => {
                let cleanup = if *compensated {
                    "earlier steps were rolled back"
                } else {
                    "earlier steps were kept"
                };
                write!(f, "step `{step}` failed ({cleanup}): {source}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Remote(err) | Self::PartialFailure { source: err, .. } => Some(err),
            Self::NotAuthenticated
            | Self::AlreadyAuthenticated
            | Self::NotFound(_)
            | Self::UserNotFound(_)
            | Self::InvalidRow(_) => None,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RemoteError> for StoreError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

/// Row type owned directly by one user through its table's owner column.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    const TABLE: Table;

    fn id(&self) -> RowId;
    fn owner_id(&self) -> UserId;
}

/// Remote-authoritative mirror of one owned table.
pub struct TableStore<E: Entity> {
    remote: Arc<dyn RemoteStore>,
    cache: Option<Arc<SnapshotCache>>,
    owner: Option<UserId>,
    items: Vec<E>,
    loading: bool,
}

impl<E: Entity> TableStore<E> {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            cache: None,
            owner: None,
            items: Vec::new(),
            loading: false,
        }
    }

    pub fn with_cache(mut self, cache: Arc<SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Entities in server order, created ones appended.
    pub fn items(&self) -> &[E] {
        &self.items
    }

    pub fn get(&self, id: RowId) -> Option<&E> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    /// Binds the store to `owner`; the list is cleared when it changes.
    pub fn set_owner(&mut self, owner: Option<UserId>) {
        if self.owner != owner {
            self.items.clear();
            self.owner = owner;
        }
    }

    /// Hydrates the list from the local snapshot of the bound owner.
    ///
    /// Returns how many entities were restored.
    pub fn restore_cached(&mut self) -> StoreResult<usize> {
        let owner = self.require_owner()?;
        let Some(cache) = self.cache.as_ref() else {
            return Ok(0);
        };
        let key = SnapshotKey::new(E::TABLE, owner);
        match cache.load::<E>(&key) {
            Ok(Some(items)) => {
                self.items = items
                    .into_iter()
                    .filter(|item| item.owner_id() == owner)
                    .collect();
                Ok(self.items.len())
            }
            Ok(None) => Ok(0),
            Err(err) => {
                warn!(
                    "event=cache_restore module=store status=error table={} error={}",
                    E::TABLE,
                    err
                );
                Ok(0)
            }
        }
    }

    /// Reloads every row owned by the bound owner.
    ///
    /// On failure the list is left empty and the error is returned.
    pub fn fetch_all(&mut self) -> StoreResult<usize> {
        let owner = self.require_owner()?;
        let filter = owner_filter(E::TABLE, owner);

        self.loading = true;
        let fetched = self
            .remote
            .select(E::TABLE, &filter, &[])
            .map_err(StoreError::from)
            .and_then(decode_rows::<E>);
        self.loading = false;

        match fetched {
            Ok(rows) => {
                self.items = rows
                    .into_iter()
                    .filter(|item| item.owner_id() == owner)
                    .collect();
                info!(
                    "event=store_fetch module=store status=ok table={} count={}",
                    E::TABLE,
                    self.items.len()
                );
                self.persist();
                Ok(self.items.len())
            }
            Err(err) => {
                self.items.clear();
                log_failure("store_fetch", E::TABLE, &err);
                Err(err)
            }
        }
    }

    /// Inserts `draft` stamped with the owner and appends the stored row.
    pub(crate) fn create(&mut self, draft: &impl Serialize) -> StoreResult<E> {
        let owner = self.require_owner()?;
        let mut payload = to_object(draft)?;
        if let Some(column) = E::TABLE.owner_column() {
            payload.insert(column.to_string(), Value::String(owner.to_string()));
        }

        let created = self
            .remote
            .insert(E::TABLE, Value::Object(payload))
            .map_err(StoreError::from)
            .and_then(decode_rows::<E>)
            .and_then(|rows| {
                rows.into_iter()
                    .find(|item| item.owner_id() == owner)
                    .ok_or_else(|| StoreError::InvalidRow("insert returned no row".to_string()))
            })
            .inspect_err(|err| log_failure("store_create", E::TABLE, err))?;

        info!(
            "event=store_create module=store status=ok table={} id={}",
            E::TABLE,
            created.id()
        );
        self.items.push(created.clone());
        self.persist();
        Ok(created)
    }

    /// Sends `patch` for `id` and replaces the local entry with the result.
    pub(crate) fn update(&mut self, id: RowId, patch: &impl Serialize) -> StoreResult<E> {
        let owner = self.require_owner()?;
        let index = self.position(id)?;
        let payload = to_object(patch)?;
        let filter = owner_filter(E::TABLE, owner).eq("id", id);

        let updated = self
            .remote
            .update(E::TABLE, &filter, Value::Object(payload))
            .map_err(StoreError::from)
            .and_then(decode_rows::<E>)
            .and_then(|rows| {
                rows.into_iter()
                    .find(|item| item.id() == id && item.owner_id() == owner)
                    .ok_or(StoreError::NotFound(id))
            })
            .inspect_err(|err| log_failure("store_update", E::TABLE, err))?;

        info!(
            "event=store_update module=store status=ok table={} id={}",
            E::TABLE,
            id
        );
        self.items[index] = updated.clone();
        self.persist();
        Ok(updated)
    }

    pub(crate) fn delete(&mut self, id: RowId) -> StoreResult<()> {
        let owner = self.require_owner()?;
        let index = self.position(id)?;
        let filter = owner_filter(E::TABLE, owner).eq("id", id);

        self.remote
            .delete(E::TABLE, &filter)
            .map_err(StoreError::from)
            .inspect_err(|err| log_failure("store_delete", E::TABLE, err))?;

        info!(
            "event=store_delete module=store status=ok table={} id={}",
            E::TABLE,
            id
        );
        self.items.remove(index);
        self.persist();
        Ok(())
    }

    fn require_owner(&self) -> StoreResult<UserId> {
        self.owner.ok_or(StoreError::NotAuthenticated)
    }

    fn position(&self, id: RowId) -> StoreResult<usize> {
        self.items
            .iter()
            .position(|item| item.id() == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn persist(&self) {
        if let (Some(cache), Some(owner)) = (self.cache.as_ref(), self.owner) {
            save_snapshot(cache, SnapshotKey::new(E::TABLE, owner), &self.items);
        }
    }
}

/// Filter selecting rows owned by `owner`; empty for tables without an
/// owner column.
pub(crate) fn owner_filter(table: Table, owner: UserId) -> Filter {
    match table.owner_column() {
        Some(column) => Filter::new().eq(column, owner),
        None => Filter::new(),
    }
}

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> StoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|err| StoreError::InvalidRow(err.to_string()))
        })
        .collect()
}

/// Serializes a draft or patch into a JSON object payload.
pub(crate) fn to_object(value: &impl Serialize) -> StoreResult<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::InvalidRow(format!(
            "payload must be an object, got {other}"
        ))),
        Err(err) => Err(StoreError::InvalidRow(err.to_string())),
    }
}

pub(crate) fn save_snapshot<T: Serialize>(cache: &SnapshotCache, key: SnapshotKey, items: &[T]) {
    if let Err(err) = cache.save(&key, items) {
        warn!("event=cache_save module=store status=error key={key} error={err}");
    }
}

pub(crate) fn log_failure(event: &str, table: Table, err: &StoreError) {
    warn!(
        "event={event} module=store status=error table={table} error={}",
        sanitize_message(&err.to_string())
    );
}
