//! Remote data client boundary.
//!
//! # Responsibility
//! - Define table-scoped CRUD (`RemoteStore`) and auth (`AuthApi`) contracts.
//! - Provide the uniform result envelope: `Ok` carries data, `Err` carries a
//!   classified [`RemoteError`]. Nothing panics past this boundary.
//!
//! # Invariants
//! - Filters are conjunctions of equality predicates only.
//! - `insert` and `update` return the affected rows.
//! - `update` and `delete` refuse an empty filter.
//! - No retries, batching or cross-table transactions happen here.

use crate::model::session::AuthEvent;
use crate::model::session::{Registration, Session};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

pub mod http;
pub mod memory;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Coarse classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorCode {
    /// Missing, expired or rejected credentials; row-security denial.
    Unauthorized,
    NotFound,
    /// Unique or foreign-key constraint violation.
    Conflict,
    /// Request rejected as malformed by the service.
    Rejected,
    Network,
    Timeout,
    Server,
    /// Response body did not have the expected shape.
    Decode,
}

impl RemoteErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Rejected => "rejected",
            Self::Network => "network_error",
            Self::Timeout => "timeout",
            Self::Server => "server_error",
            Self::Decode => "decode_error",
        }
    }
}

/// Error half of the remote result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: RemoteErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorCode::Unauthorized, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorCode::Rejected, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorCode::Decode, message)
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl Error for RemoteError {}

/// Remote tables known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Notes,
    Tasks,
    Events,
    SharedNotebooks,
    NotebookCollaborators,
    NotebookContent,
    Users,
}

impl Table {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Tasks => "tasks",
            Self::Events => "events",
            Self::SharedNotebooks => "shared_notebooks",
            Self::NotebookCollaborators => "notebook_collaborators",
            Self::NotebookContent => "notebook_content",
            Self::Users => "users",
        }
    }

    /// Column naming the owning user, for tables owned directly by one.
    pub const fn owner_column(self) -> Option<&'static str> {
        match self {
            Self::Notes | Self::Tasks | Self::Events => Some("user_id"),
            Self::SharedNotebooks => Some("owner_id"),
            Self::NotebookCollaborators | Self::NotebookContent | Self::Users => None,
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conjunction of `column = value` predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality predicate. Values compare in their text form.
    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.clauses.push((column.into(), value.to_string()));
        self
    }

    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluates the filter against a JSON row object.
    pub fn matches(&self, row: &Value) -> bool {
        self.clauses.iter().all(|(column, expected)| {
            row.get(column)
                .is_some_and(|actual| value_text(actual) == *expected)
        })
    }
}

/// Child table embedded into a parent select through `foreign_key`, which
/// references the parent's `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embed {
    pub table: Table,
    pub foreign_key: &'static str,
}

impl Embed {
    pub const fn new(table: Table, foreign_key: &'static str) -> Self {
        Self { table, foreign_key }
    }
}

/// Table-scoped CRUD against the hosted database.
pub trait RemoteStore: Send + Sync {
    /// Rows of `table` matching `filter`, each carrying `embeds` as arrays
    /// keyed by child table name.
    fn select(&self, table: Table, filter: &Filter, embeds: &[Embed]) -> RemoteResult<Vec<Value>>;
    /// Inserts one row object and returns the stored row(s).
    fn insert(&self, table: Table, row: Value) -> RemoteResult<Vec<Value>>;
    /// Merges `patch` into matching rows and returns them.
    fn update(&self, table: Table, filter: &Filter, patch: Value) -> RemoteResult<Vec<Value>>;
    fn delete(&self, table: Table, filter: &Filter) -> RemoteResult<()>;
}

/// E-mail/password authentication against the hosted auth service.
pub trait AuthApi: Send + Sync {
    fn sign_up(&self, email: &str, password: &str, name: Option<&str>)
        -> RemoteResult<Registration>;
    fn sign_in(&self, email: &str, password: &str) -> RemoteResult<Session>;
    fn sign_out(&self) -> RemoteResult<()>;
    /// Current session, refreshed first when it is about to expire.
    fn current_session(&self) -> RemoteResult<Option<Session>>;
    fn reset_password_for_email(&self, email: &str) -> RemoteResult<()>;
    /// New receiver for session changes made after this call.
    fn subscribe(&self) -> Receiver<AuthEvent>;
}

/// Anything usable as the single backend of a [`crate::Workspace`].
pub trait Backend: RemoteStore + AuthApi {}

impl<T: RemoteStore + AuthApi> Backend for T {}

/// Fan-out of auth events to every live subscriber.
#[derive(Default)]
pub(crate) struct AuthBroadcast {
    subscribers: Mutex<Vec<Sender<AuthEvent>>>,
}

impl AuthBroadcast {
    pub(crate) fn subscribe(&self) -> Receiver<AuthEvent> {
        let (sender, receiver) = channel();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.push(sender);
        receiver
    }

    /// Delivers `event`; subscribers whose receiver was dropped are pruned.
    pub(crate) fn emit(&self, event: &AuthEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }
}

pub(crate) fn ensure_filtered(table: Table, filter: &Filter) -> RemoteResult<()> {
    if filter.is_empty() {
        return Err(RemoteError::rejected(format!(
            "refusing unfiltered write on `{table}`"
        )));
    }
    Ok(())
}

/// Text form of a JSON scalar used for equality filters.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
