//! In-process backend with the hosted service's observable behavior.
//!
//! # Responsibility
//! - Serve table CRUD and e-mail/password auth from process memory.
//! - Record every call in a journal and inject one-shot failures, so
//!   callers can assert call order and "no remote call" outcomes.
//!
//! # Invariants
//! - Data calls require a signed-in session.
//! - With row security on, owned tables only expose and accept rows of the
//!   session user; notebooks are additionally readable by collaborators.
//! - Inserted rows get a server `id` and `created_at` when absent.
//! - `(notebook_id, user_id)` is unique in `notebook_collaborators`.

use crate::model::session::{AuthEvent, AuthUser, Registration, Session};
use crate::model::UserId;
use crate::remote::{
    ensure_filtered, value_text, AuthApi, AuthBroadcast, Embed, Filter, RemoteError,
    RemoteErrorCode, RemoteResult, RemoteStore, Table,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SESSION_TTL_SECS: i64 = 3600;

/// Data operation kind recorded in the call journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Select,
    Insert,
    Update,
    Delete,
}

/// Auth operation kind recorded in the call journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOp {
    SignUp,
    SignIn,
    SignOut,
    CurrentSession,
    ResetPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub table: Table,
}

struct MemoryUser {
    id: UserId,
    email: String,
    password: String,
    name: Option<String>,
}

struct MemoryState {
    tables: BTreeMap<Table, Vec<Value>>,
    users: Vec<MemoryUser>,
    session: Option<Session>,
    row_security: bool,
    require_confirmation: bool,
    calls: Vec<RemoteCall>,
    auth_calls: Vec<AuthOp>,
    failures: Vec<(RemoteOp, Table, RemoteError)>,
    auth_failures: Vec<(AuthOp, RemoteError)>,
    reset_requests: Vec<String>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            users: Vec::new(),
            session: None,
            row_security: true,
            require_confirmation: false,
            calls: Vec::new(),
            auth_calls: Vec::new(),
            failures: Vec::new(),
            auth_failures: Vec::new(),
            reset_requests: Vec::new(),
        }
    }
}

impl MemoryState {
    fn session_user(&self) -> RemoteResult<UserId> {
        self.session
            .as_ref()
            .map(Session::user_id)
            .ok_or_else(|| RemoteError::unauthorized("no active session"))
    }

    fn take_failure(&mut self, op: RemoteOp, table: Table) -> Option<RemoteError> {
        let index = self
            .failures
            .iter()
            .position(|(failed_op, failed_table, _)| *failed_op == op && *failed_table == table)?;
        Some(self.failures.remove(index).2)
    }

    fn take_auth_failure(&mut self, op: AuthOp) -> Option<RemoteError> {
        let index = self
            .auth_failures
            .iter()
            .position(|(failed_op, _)| *failed_op == op)?;
        Some(self.auth_failures.remove(index).1)
    }

    /// Journals the call, then applies injected failures and the session
    /// requirement in that order.
    fn begin(&mut self, op: RemoteOp, table: Table) -> RemoteResult<UserId> {
        self.calls.push(RemoteCall { op, table });
        if let Some(err) = self.take_failure(op, table) {
            return Err(err);
        }
        self.session_user()
    }

    fn owns(&self, table: Table, row: &Value, user: UserId) -> bool {
        if !self.row_security {
            return true;
        }
        match table.owner_column() {
            Some(column) => row
                .get(column)
                .is_some_and(|owner| value_text(owner) == user.to_string()),
            None => true,
        }
    }

    fn readable(&self, table: Table, row: &Value, user: UserId) -> bool {
        if self.owns(table, row, user) {
            return true;
        }
        table == Table::SharedNotebooks && self.is_collaborator(row, user)
    }

    fn is_collaborator(&self, notebook: &Value, user: UserId) -> bool {
        let Some(notebook_id) = notebook.get("id").map(value_text) else {
            return false;
        };
        let filter = Filter::new()
            .eq("notebook_id", notebook_id)
            .eq("user_id", user);
        self.rows(Table::NotebookCollaborators)
            .iter()
            .any(|row| filter.matches(row))
    }

    fn rows(&self, table: Table) -> &[Value] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn violates_unique(&self, table: Table, row: &Value) -> bool {
        if table != Table::NotebookCollaborators {
            return false;
        }
        let (Some(notebook_id), Some(user_id)) = (row.get("notebook_id"), row.get("user_id"))
        else {
            return false;
        };
        let filter = Filter::new()
            .eq("notebook_id", value_text(notebook_id))
            .eq("user_id", value_text(user_id));
        self.rows(table).iter().any(|existing| filter.matches(existing))
    }

    fn with_embeds(&self, mut row: Value, embeds: &[Embed]) -> Value {
        let parent_id = row.get("id").map(value_text).unwrap_or_default();
        if let Value::Object(fields) = &mut row {
            for embed in embeds {
                let filter = Filter::new().eq(embed.foreign_key, &parent_id);
                let children: Vec<Value> = self
                    .rows(embed.table)
                    .iter()
                    .filter(|child| filter.matches(child))
                    .cloned()
                    .collect();
                fields.insert(embed.table.as_str().to_string(), Value::Array(children));
            }
        }
        row
    }

    fn open_session(&mut self, user_index: usize) -> Option<Session> {
        let user = self.users.get(user_index)?;
        let session = Session {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Some(Utc::now().timestamp() + SESSION_TTL_SECS),
            user: auth_user(user),
        };
        self.session = Some(session.clone());
        Some(session)
    }
}

/// Backend serving everything from memory; see the module docs.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    events: AuthBroadcast,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers an account directly, bypassing the journal.
    pub fn add_user(&self, email: &str, password: &str, name: Option<&str>) -> UserId {
        let mut state = self.state();
        let id = Uuid::new_v4();
        insert_user(&mut state, id, email, password, name);
        id
    }

    /// Inserts a row directly, bypassing the journal and row security.
    pub fn seed_row(&self, table: Table, row: Value) -> Value {
        let stored = stamp_server_columns(row);
        self.state()
            .tables
            .entry(table)
            .or_default()
            .push(stored.clone());
        stored
    }

    /// Snapshot of every row in `table`.
    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.state().rows(table).to_vec()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    pub fn auth_calls(&self) -> Vec<AuthOp> {
        self.state().auth_calls.clone()
    }

    /// Clears both journals.
    pub fn clear_calls(&self) {
        let mut state = self.state();
        state.calls.clear();
        state.auth_calls.clear();
    }

    /// Makes the next matching data call fail with `error`.
    pub fn fail_next(&self, op: RemoteOp, table: Table, error: RemoteError) {
        self.state().failures.push((op, table, error));
    }

    /// Makes the next matching auth call fail with `error`.
    pub fn fail_next_auth(&self, op: AuthOp, error: RemoteError) {
        self.state().auth_failures.push((op, error));
    }

    /// Turns owner filtering off, exposing every row to every session.
    pub fn set_row_security(&self, enabled: bool) {
        self.state().row_security = enabled;
    }

    /// When set, sign-up returns no session until confirmation.
    pub fn set_require_confirmation(&self, required: bool) {
        self.state().require_confirmation = required;
    }

    pub fn reset_requests(&self) -> Vec<String> {
        self.state().reset_requests.clone()
    }

    /// Revokes the session server-side, as an admin or expiry would.
    pub fn revoke_session(&self) {
        let revoked = self.state().session.take().is_some();
        if revoked {
            self.events.emit(&AuthEvent::SignedOut);
        }
    }

    /// Rotates the session tokens out-of-band.
    pub fn rotate_tokens(&self) -> Option<Session> {
        let rotated = {
            let mut state = self.state();
            let session = state.session.as_mut()?;
            session.access_token = Uuid::new_v4().to_string();
            session.refresh_token = Uuid::new_v4().to_string();
            session.clone()
        };
        self.events.emit(&AuthEvent::TokenRefreshed(rotated.clone()));
        Some(rotated)
    }
}

impl RemoteStore for MemoryBackend {
    fn select(&self, table: Table, filter: &Filter, embeds: &[Embed]) -> RemoteResult<Vec<Value>> {
        let mut state = self.state();
        let user = state.begin(RemoteOp::Select, table)?;
        let rows = state
            .rows(table)
            .iter()
            .filter(|row| filter.matches(row) && state.readable(table, row, user))
            .map(|row| state.with_embeds(row.clone(), embeds))
            .collect();
        Ok(rows)
    }

    fn insert(&self, table: Table, row: Value) -> RemoteResult<Vec<Value>> {
        let mut state = self.state();
        let user = state.begin(RemoteOp::Insert, table)?;
        if !row.is_object() {
            return Err(RemoteError::rejected("insert payload must be an object"));
        }
        if !state.owns(table, &row, user) {
            return Err(RemoteError::unauthorized(format!(
                "new row violates row-level security policy for table \"{table}\""
            )));
        }
        if state.violates_unique(table, &row) {
            return Err(RemoteError::new(
                RemoteErrorCode::Conflict,
                format!("duplicate key value violates unique constraint on \"{table}\""),
            ));
        }

        let stored = stamp_server_columns(row);
        state.tables.entry(table).or_default().push(stored.clone());
        Ok(vec![stored])
    }

    fn update(&self, table: Table, filter: &Filter, patch: Value) -> RemoteResult<Vec<Value>> {
        let mut state = self.state();
        let user = state.begin(RemoteOp::Update, table)?;
        ensure_filtered(table, filter)?;
        let Value::Object(changes) = patch else {
            return Err(RemoteError::rejected("update payload must be an object"));
        };

        let targets: Vec<usize> = state
            .rows(table)
            .iter()
            .enumerate()
            .filter(|(_, row)| filter.matches(row) && state.owns(table, row, user))
            .map(|(index, _)| index)
            .collect();

        let mut updated = Vec::with_capacity(targets.len());
        if let Some(rows) = state.tables.get_mut(&table) {
            for index in targets {
                if let Some(Value::Object(fields)) = rows.get_mut(index) {
                    for (key, value) in &changes {
                        fields.insert(key.clone(), value.clone());
                    }
                    updated.push(Value::Object(fields.clone()));
                }
            }
        }
        Ok(updated)
    }

    fn delete(&self, table: Table, filter: &Filter) -> RemoteResult<()> {
        let mut state = self.state();
        let user = state.begin(RemoteOp::Delete, table)?;
        ensure_filtered(table, filter)?;

        let keep: Vec<bool> = state
            .rows(table)
            .iter()
            .map(|row| !(filter.matches(row) && state.owns(table, row, user)))
            .collect();
        if let Some(rows) = state.tables.get_mut(&table) {
            let mut flags = keep.into_iter();
            rows.retain(|_| flags.next().unwrap_or(true));
        }
        Ok(())
    }
}

impl AuthApi for MemoryBackend {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> RemoteResult<Registration> {
        let registration = {
            let mut state = self.state();
            state.auth_calls.push(AuthOp::SignUp);
            if let Some(err) = state.take_auth_failure(AuthOp::SignUp) {
                return Err(err);
            }
            if find_user(&state, email).is_some() {
                return Err(RemoteError::new(
                    RemoteErrorCode::Conflict,
                    "User already registered",
                ));
            }

            let id = Uuid::new_v4();
            let index = insert_user(&mut state, id, email, password, name);
            let session = if state.require_confirmation {
                None
            } else {
                state.open_session(index)
            };
            let user = state
                .users
                .get(index)
                .map(auth_user)
                .ok_or_else(|| RemoteError::new(RemoteErrorCode::Server, "user vanished"))?;
            Registration { user, session }
        };

        if let Some(session) = registration.session.as_ref() {
            self.events.emit(&AuthEvent::SignedIn(session.clone()));
        }
        Ok(registration)
    }

    fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Session> {
        let session = {
            let mut state = self.state();
            state.auth_calls.push(AuthOp::SignIn);
            if let Some(err) = state.take_auth_failure(AuthOp::SignIn) {
                return Err(err);
            }
            let index = find_user(&state, email)
                .filter(|index| {
                    state
                        .users
                        .get(*index)
                        .is_some_and(|user| user.password == password)
                })
                .ok_or_else(|| RemoteError::unauthorized("Invalid login credentials"))?;
            state
                .open_session(index)
                .ok_or_else(|| RemoteError::unauthorized("Invalid login credentials"))?
        };

        self.events.emit(&AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn sign_out(&self) -> RemoteResult<()> {
        let had_session = {
            let mut state = self.state();
            state.auth_calls.push(AuthOp::SignOut);
            if let Some(err) = state.take_auth_failure(AuthOp::SignOut) {
                return Err(err);
            }
            state.session.take().is_some()
        };
        if had_session {
            self.events.emit(&AuthEvent::SignedOut);
        }
        Ok(())
    }

    fn current_session(&self) -> RemoteResult<Option<Session>> {
        let mut state = self.state();
        state.auth_calls.push(AuthOp::CurrentSession);
        if let Some(err) = state.take_auth_failure(AuthOp::CurrentSession) {
            return Err(err);
        }
        Ok(state.session.clone())
    }

    fn reset_password_for_email(&self, email: &str) -> RemoteResult<()> {
        let mut state = self.state();
        state.auth_calls.push(AuthOp::ResetPassword);
        if let Some(err) = state.take_auth_failure(AuthOp::ResetPassword) {
            return Err(err);
        }
        state.reset_requests.push(email.to_string());
        Ok(())
    }

    fn subscribe(&self) -> Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

fn find_user(state: &MemoryState, email: &str) -> Option<usize> {
    let wanted = email.trim().to_lowercase();
    state
        .users
        .iter()
        .position(|user| user.email.to_lowercase() == wanted)
}

/// Adds the account and its `users` profile row; returns the user index.
fn insert_user(
    state: &mut MemoryState,
    id: UserId,
    email: &str,
    password: &str,
    name: Option<&str>,
) -> usize {
    state.users.push(MemoryUser {
        id,
        email: email.trim().to_string(),
        password: password.to_string(),
        name: name.map(str::to_string),
    });
    let profile = stamp_server_columns(json!({
        "id": id,
        "email": email.trim(),
        "name": name,
    }));
    state.tables.entry(Table::Users).or_default().push(profile);
    state.users.len() - 1
}

fn auth_user(user: &MemoryUser) -> AuthUser {
    let metadata = match user.name.as_deref() {
        Some(name) => json!({ "name": name }),
        None => Value::Object(Map::new()),
    };
    AuthUser {
        id: user.id,
        email: Some(user.email.clone()),
        user_metadata: metadata,
    }
}

fn stamp_server_columns(mut row: Value) -> Value {
    if let Value::Object(fields) = &mut row {
        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
    }
    row
}
