//! Typed entities mirrored from the hosted backend.
//!
//! # Responsibility
//! - Define the row shapes the stores decode server responses into.
//! - Define draft/patch shapes sent on create/update.
//!
//! # Invariants
//! - Every persisted entity carries the owning user's id.
//! - Ids and timestamps are assigned by the server on insert.

use uuid::Uuid;

pub mod event;
pub mod note;
pub mod notebook;
pub mod session;
pub mod task;

/// Opaque identifier of an authenticated user.
pub type UserId = Uuid;

/// Server-assigned row identifier.
pub type RowId = Uuid;
