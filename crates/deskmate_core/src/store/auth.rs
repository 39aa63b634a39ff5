//! Auth store: the session that scopes every other store.
//!
//! # Responsibility
//! - Drive sign-in, sign-up, sign-out and password reset.
//! - Follow session changes the backend pushes out-of-band.
//!
//! # Invariants
//! - `is_authenticated()` is exactly `session.is_some()`.
//! - Phases move `Anonymous -> Authenticating -> Authenticated` and
//!   `Authenticated -> LoggingOut -> Anonymous`; a failed sign-in ends in
//!   `Anonymous`, a failed sign-out returns to `Authenticated`.
//! - Sign-in and sign-up are refused while a session is held.
//! - Credentials and tokens are never logged.

use crate::model::session::{AuthEvent, AuthUser, Registration, Session, UserProfile};
use crate::model::UserId;
use crate::remote::{AuthApi, Filter, RemoteStore, Table};
use crate::store::{decode_rows, StoreError, StoreResult};
use crate::validation::{validate_email, LoginForm, RegisterForm};
use log::{info, warn};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Anonymous,
    Authenticating,
    Authenticated,
    LoggingOut,
}

impl AuthPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::LoggingOut => "logging_out",
        }
    }
}

pub struct AuthStore {
    auth: Arc<dyn AuthApi>,
    remote: Arc<dyn RemoteStore>,
    events: Receiver<AuthEvent>,
    session: Option<Session>,
    profile: Option<UserProfile>,
    phase: AuthPhase,
    loading: bool,
}

impl AuthStore {
    /// Subscribes to backend session changes immediately.
    pub fn new(auth: Arc<dyn AuthApi>, remote: Arc<dyn RemoteStore>) -> Self {
        let events = auth.subscribe();
        Self {
            auth,
            remote,
            events,
            session: None,
            profile: None,
            phase: AuthPhase::Anonymous,
            loading: false,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.session.as_ref().map(|session| &session.user)
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.session.as_ref().map(Session::user_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Profile row loaded by [`AuthStore::fetch_profile`].
    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    /// Adopts whatever session the backend still holds, e.g. at startup.
    pub fn restore_session(&mut self) -> StoreResult<Option<&AuthUser>> {
        self.begin(AuthPhase::Authenticating);
        let restored = self.auth.current_session();
        self.loading = false;

        match restored {
            Ok(session) => {
                info!(
                    "event=auth_restore module=auth status=ok restored={}",
                    session.is_some()
                );
                self.adopt(session);
                Ok(self.user())
            }
            Err(err) => {
                warn!("event=auth_restore module=auth status=error error={err}");
                self.adopt(None);
                Err(err.into())
            }
        }
    }

    /// Signs in. Fails with `AlreadyAuthenticated` while a session is held.
    pub fn login(&mut self, form: &LoginForm) -> StoreResult<Session> {
        form.validate()?;
        self.ensure_signed_out()?;
        self.begin(AuthPhase::Authenticating);
        let result = self.auth.sign_in(form.email.trim(), &form.password);
        self.loading = false;

        match result {
            Ok(session) => {
                info!(
                    "event=auth_login module=auth status=ok user_id={}",
                    session.user_id()
                );
                self.adopt(Some(session.clone()));
                Ok(session)
            }
            Err(err) => {
                warn!(
                    "event=auth_login module=auth status=error error_code={}",
                    err.code.as_str()
                );
                self.adopt(None);
                Err(err.into())
            }
        }
    }

    /// Creates an account. Without a session in the result the service
    /// waits for e-mail confirmation and the store stays anonymous.
    pub fn register(&mut self, form: &RegisterForm) -> StoreResult<Registration> {
        form.validate()?;
        self.ensure_signed_out()?;
        self.begin(AuthPhase::Authenticating);
        let result = self
            .auth
            .sign_up(form.email.trim(), &form.password, form.display_name());
        self.loading = false;

        match result {
            Ok(registration) => {
                info!(
                    "event=auth_register module=auth status=ok user_id={} confirmed={}",
                    registration.user.id,
                    registration.session.is_some()
                );
                self.adopt(registration.session.clone());
                Ok(registration)
            }
            Err(err) => {
                warn!(
                    "event=auth_register module=auth status=error error_code={}",
                    err.code.as_str()
                );
                self.adopt(None);
                Err(err.into())
            }
        }
    }

    /// Signs out. Without a session this is a no-op.
    pub fn logout(&mut self) -> StoreResult<()> {
        if self.session.is_none() {
            return Ok(());
        }
        self.begin(AuthPhase::LoggingOut);
        let result = self.auth.sign_out();
        self.loading = false;

        match result {
            Ok(()) => {
                info!("event=auth_logout module=auth status=ok");
                self.adopt(None);
                Ok(())
            }
            Err(err) => {
                warn!("event=auth_logout module=auth status=error error={err}");
                self.phase = AuthPhase::Authenticated;
                Err(err.into())
            }
        }
    }

    pub fn request_password_reset(&mut self, email: &str) -> StoreResult<()> {
        validate_email(email)?;
        self.loading = true;
        let result = self.auth.reset_password_for_email(email.trim());
        self.loading = false;
        result
            .inspect(|_| info!("event=auth_reset module=auth status=ok"))
            .inspect_err(|err| warn!("event=auth_reset module=auth status=error error={err}"))
            .map_err(StoreError::from)
    }

    /// Loads the `users` row of the signed-in user.
    pub fn fetch_profile(&mut self) -> StoreResult<&UserProfile> {
        let user_id = self.user_id().ok_or(StoreError::NotAuthenticated)?;
        let profile = self
            .remote
            .select(Table::Users, &Filter::new().eq("id", user_id), &[])
            .map_err(StoreError::from)
            .and_then(decode_rows::<UserProfile>)?
            .into_iter()
            .find(|profile| profile.id == user_id)
            .ok_or(StoreError::NotFound(user_id))?;
        Ok(self.profile.insert(profile))
    }

    /// Applies pending backend session changes. Returns whether the
    /// signed-in user changed.
    pub fn poll_auth_events(&mut self) -> bool {
        let before = self.user_id();
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
        before != self.user_id()
    }

    fn apply(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                self.adopt(Some(session));
            }
            AuthEvent::SignedOut => {
                if self.session.is_some() {
                    info!("event=auth_signed_out module=auth status=ok source=backend");
                }
                self.adopt(None);
            }
            AuthEvent::UserUpdated(user) => {
                if let Some(session) = self
                    .session
                    .as_mut()
                    .filter(|session| session.user.id == user.id)
                {
                    session.user = user;
                }
            }
        }
    }

    /// Applies queued session changes first; events older than a new
    /// sign-in attempt must not be replayed over its outcome.
    fn ensure_signed_out(&mut self) -> StoreResult<()> {
        self.poll_auth_events();
        if self.session.is_some() {
            warn!("event=auth_sign_in module=auth status=error reason=already_authenticated");
            return Err(StoreError::AlreadyAuthenticated);
        }
        Ok(())
    }

    fn begin(&mut self, phase: AuthPhase) {
        self.phase = phase;
        self.loading = true;
    }

    fn adopt(&mut self, session: Option<Session>) {
        if session.as_ref().map(Session::user_id) != self.user_id() {
            self.profile = None;
        }
        self.phase = if session.is_some() {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Anonymous
        };
        self.session = session;
    }
}
