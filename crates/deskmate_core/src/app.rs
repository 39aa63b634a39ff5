//! Composition root.
//!
//! # Responsibility
//! - Build the auth store and every domain store once, over one backend
//!   and an optional snapshot cache.
//! - Keep every domain store bound to the signed-in user.
//!
//! # Invariants
//! - All stores are bound to the same owner as the auth session after
//!   every `sync_session`.
//! - Binding never fetches. It shows the cached snapshot of the new owner
//!   until the caller runs `reload`.
//! - No state lives outside a `Workspace` value.

use crate::cache::snapshot_cache::{SnapshotCache, SnapshotKey};
use crate::model::session::Registration;
use crate::model::UserId;
use crate::remote::{AuthApi, Backend, RemoteStore, Table};
use crate::store::auth::AuthStore;
use crate::store::events::EventStore;
use crate::store::notebooks::NotebookStore;
use crate::store::notes::NoteStore;
use crate::store::tasks::TaskStore;
use crate::store::{StoreError, StoreResult};
use crate::validation::{LoginForm, RegisterForm};
use chrono::{DateTime, TimeZone, Utc};
use log::{info, warn};
use std::sync::Arc;

/// Outcome of rebinding and reloading the domain stores.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Owner the stores are bound to afterwards.
    pub user: Option<UserId>,
    /// Entities hydrated from the snapshot cache while binding.
    pub restored: usize,
    /// Whether the stores were fetched again.
    pub reloaded: bool,
    /// Per-table fetch failures; the affected lists are empty.
    pub failures: Vec<(Table, StoreError)>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Workspace {
    auth: AuthStore,
    notes: NoteStore,
    tasks: TaskStore,
    events: EventStore,
    notebooks: NotebookStore,
    cache: Option<Arc<SnapshotCache>>,
    bound_user: Option<UserId>,
}

impl Workspace {
    pub fn new<B: Backend + 'static>(backend: Arc<B>, cache: Option<Arc<SnapshotCache>>) -> Self {
        let auth_api: Arc<dyn AuthApi> = backend.clone();
        let remote: Arc<dyn RemoteStore> = backend;

        let mut notes = NoteStore::new(remote.clone());
        let mut tasks = TaskStore::new(remote.clone());
        let mut events = EventStore::new(remote.clone());
        let mut notebooks = NotebookStore::new(remote.clone());
        if let Some(cache) = cache.as_ref() {
            notes = notes.with_cache(cache.clone());
            tasks = tasks.with_cache(cache.clone());
            events = events.with_cache(cache.clone());
            notebooks = notebooks.with_cache(cache.clone());
        }

        Self {
            auth: AuthStore::new(auth_api, remote),
            notes,
            tasks,
            events,
            notebooks,
            cache,
            bound_user: None,
        }
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    /// Direct access for operations that do not change the session user,
    /// such as password reset or profile loading.
    pub fn auth_mut(&mut self) -> &mut AuthStore {
        &mut self.auth
    }

    pub fn notes(&self) -> &NoteStore {
        &self.notes
    }

    pub fn notes_mut(&mut self) -> &mut NoteStore {
        &mut self.notes
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskStore {
        &mut self.tasks
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventStore {
        &mut self.events
    }

    pub fn notebooks(&self) -> &NotebookStore {
        &self.notebooks
    }

    pub fn notebooks_mut(&mut self) -> &mut NotebookStore {
        &mut self.notebooks
    }

    /// Restores a surviving session and binds the stores to it. The lists
    /// show the cached snapshot until [`Workspace::reload`] runs.
    pub fn start(&mut self) -> StoreResult<SyncReport> {
        self.auth.restore_session()?;
        Ok(self.sync_session())
    }

    /// Rebinds every store when the session user changed and hydrates the
    /// lists from the snapshot cache. Nothing is fetched; an unchanged user
    /// leaves the stores untouched.
    pub fn sync_session(&mut self) -> SyncReport {
        let user = self.auth.user_id();
        let mut report = SyncReport {
            user,
            ..SyncReport::default()
        };
        if user == self.bound_user {
            return report;
        }

        info!(
            "event=workspace_bind module=app status=start signed_in={}",
            user.is_some()
        );
        self.bound_user = user;
        self.notes.set_owner(user);
        self.tasks.set_owner(user);
        self.events.set_owner(user);
        self.notebooks.set_owner(self.auth.user());

        if user.is_some() {
            report.restored = self.restore_cached();
        }
        report
    }

    /// Fetches every store again for the bound user.
    pub fn reload(&mut self) -> SyncReport {
        let mut report = SyncReport {
            user: self.bound_user,
            ..SyncReport::default()
        };
        if self.bound_user.is_none() {
            return report;
        }

        let fetches = [
            (Table::Notes, self.notes.fetch_all()),
            (Table::Tasks, self.tasks.fetch_all()),
            (Table::Events, self.events.fetch_all()),
            (Table::SharedNotebooks, self.notebooks.fetch_all()),
            (Table::NotebookCollaborators, self.notebooks.fetch_shared()),
        ];
        for (table, result) in fetches {
            if let Err(err) = result {
                report.failures.push((table, err));
            }
        }
        report.reloaded = true;

        if report.is_clean() {
            info!("event=workspace_reload module=app status=ok");
        } else {
            warn!(
                "event=workspace_reload module=app status=error failed_tables={}",
                report.failures.len()
            );
        }
        report
    }

    /// Drains backend session changes; rebinds when the user changed.
    pub fn poll(&mut self) -> Option<SyncReport> {
        if self.auth.poll_auth_events() || self.auth.user_id() != self.bound_user {
            return Some(self.sync_session());
        }
        None
    }

    pub fn login(&mut self, form: &LoginForm) -> StoreResult<SyncReport> {
        let result = self.auth.login(form);
        let report = self.sync_session();
        result.map(|_| report)
    }

    pub fn register(&mut self, form: &RegisterForm) -> StoreResult<(Registration, SyncReport)> {
        let registration = self.auth.register(form)?;
        Ok((registration, self.sync_session()))
    }

    pub fn logout(&mut self) -> StoreResult<SyncReport> {
        self.auth.logout()?;
        Ok(self.sync_session())
    }

    /// When `table` was last written to the snapshot cache for the bound
    /// user, if a cache is configured and holds a snapshot.
    pub fn cached_at(&self, table: Table) -> Option<DateTime<Utc>> {
        let (cache, owner) = self.cache.as_ref().zip(self.bound_user)?;
        let saved_at = cache
            .saved_at(&SnapshotKey::new(table, owner))
            .inspect_err(|err| {
                warn!("event=cache_saved_at module=app status=error table={table} error={err}");
            })
            .ok()??;
        Utc.timestamp_millis_opt(saved_at).single()
    }

    fn restore_cached(&mut self) -> usize {
        let restored = [
            self.notes.restore_cached(),
            self.tasks.restore_cached(),
            self.events.restore_cached(),
            self.notebooks.restore_cached(),
        ];
        let count: usize = restored.into_iter().flatten().sum();
        if count > 0 {
            info!("event=workspace_restore module=app status=ok items={count}");
        }
        count
    }
}
