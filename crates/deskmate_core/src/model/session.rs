//! Auth session types.
//!
//! # Invariants
//! - Token material is never printed by `Debug`.

use crate::model::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

/// Authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// Display name from sign-up metadata, if any.
    pub fn name(&self) -> Option<&str> {
        self.user_metadata.get("name").and_then(|value| value.as_str())
    }
}

/// Signed-in session; presence of one is what "authenticated" means.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry in unix seconds, when the service reports one.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Whether the access token expires within `leeway_secs` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, leeway_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now.timestamp() + leeway_secs)
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Result of a sign-up call. `session` is `None` while the service waits
/// for e-mail confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub user: AuthUser,
    pub session: Option<Session>,
}

/// Session change pushed by the backend, including out-of-band changes
/// such as token refresh or server-side revocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(AuthUser),
}

/// Row of the `users` profile table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
