//! Core data-synchronization layer for Deskmate.
//! Domain stores mirror remote tables for the signed-in user; this crate is
//! the single owner of that mirroring contract.

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod store;
pub mod validation;

pub use app::{SyncReport, Workspace};
pub use cache::snapshot_cache::{CacheError, SnapshotCache, SnapshotKey};
pub use config::{ClientConfig, ConfigError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::event::{Event, EventDraft};
pub use model::note::{Note, NoteDraft, NotePatch};
pub use model::notebook::{Collaborator, CollaboratorRole, SharedNotebook};
pub use model::session::{AuthEvent, AuthUser, Registration, Session, UserProfile};
pub use model::task::{DueDate, Priority, Reminder, Task, TaskDraft, TaskPatch};
pub use model::{RowId, UserId};
pub use remote::http::HttpBackend;
pub use remote::memory::MemoryBackend;
pub use remote::{
    AuthApi, Backend, Embed, Filter, RemoteError, RemoteErrorCode, RemoteResult, RemoteStore,
    Table,
};
pub use store::auth::{AuthPhase, AuthStore};
pub use store::events::EventStore;
pub use store::notebooks::NotebookStore;
pub use store::notes::NoteStore;
pub use store::tasks::TaskStore;
pub use store::{Entity, SagaStep, StoreError, StoreResult, TableStore};
pub use validation::{LoginForm, RegisterForm, ValidationError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
