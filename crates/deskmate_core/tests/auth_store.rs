use deskmate_core::remote::memory::AuthOp;
use deskmate_core::{
    AuthPhase, AuthStore, LoginForm, MemoryBackend, RegisterForm, RemoteError, RemoteErrorCode,
    StoreError, ValidationError,
};
use std::sync::Arc;

#[test]
fn mismatched_confirmation_is_rejected_without_remote_call() {
    let (backend, mut store) = fresh();

    let err = store
        .register(&RegisterForm::new("ada@example.com", "abc", "xyz"))
        .unwrap_err();
    assert_eq!(err, StoreError::Validation(ValidationError::PasswordMismatch));
    assert!(backend.auth_calls().is_empty());
    assert_eq!(store.phase(), AuthPhase::Anonymous);
}

#[test]
fn register_signs_in_when_confirmation_is_not_required() {
    let (_backend, mut store) = fresh();
    let form = RegisterForm::new("ada@example.com", "secret1", "secret1").with_name("Ada");

    let registration = store.register(&form).unwrap();
    assert!(registration.session.is_some());
    assert_eq!(registration.user.name(), Some("Ada"));
    assert!(store.is_authenticated());
    assert_eq!(store.phase(), AuthPhase::Authenticated);
}

#[test]
fn register_waits_for_confirmation_when_required() {
    let (backend, mut store) = fresh();
    backend.set_require_confirmation(true);

    let registration = store
        .register(&RegisterForm::new("ada@example.com", "secret1", "secret1"))
        .unwrap();
    assert!(registration.session.is_none());
    assert!(!store.is_authenticated());
    assert_eq!(store.phase(), AuthPhase::Anonymous);
}

#[test]
fn failed_login_returns_to_anonymous() {
    let (backend, mut store) = fresh();
    backend.add_user("ada@example.com", "secret1", None);

    let err = store
        .login(&LoginForm::new("ada@example.com", "wrong"))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Remote(RemoteError {
            code: RemoteErrorCode::Unauthorized,
            ..
        })
    ));
    assert_eq!(store.phase(), AuthPhase::Anonymous);
    assert!(store.session().is_none());
}

#[test]
fn authenticated_iff_session_present() {
    let (backend, mut store) = fresh();
    let user = backend.add_user("ada@example.com", "secret1", None);
    assert_eq!(store.is_authenticated(), store.session().is_some());

    store
        .login(&LoginForm::new(" ada@example.com ", "secret1"))
        .unwrap();
    assert_eq!(store.user_id(), Some(user));
    assert_eq!(store.is_authenticated(), store.session().is_some());

    store.logout().unwrap();
    assert_eq!(store.phase(), AuthPhase::Anonymous);
    assert_eq!(store.is_authenticated(), store.session().is_some());
    assert!(!store.is_authenticated());
}

#[test]
fn sign_in_while_signed_in_is_refused_without_remote_call() {
    let (backend, mut store) = signed_in();
    let before = backend.auth_calls().len();

    assert_eq!(
        store.login(&LoginForm::new("ada@example.com", "wrong1")).unwrap_err(),
        StoreError::AlreadyAuthenticated
    );
    assert_eq!(
        store
            .register(&RegisterForm::new("bob@example.com", "secret1", "secret1"))
            .unwrap_err(),
        StoreError::AlreadyAuthenticated
    );
    assert_eq!(backend.auth_calls().len(), before);
    assert_eq!(store.phase(), AuthPhase::Authenticated);
    assert!(!store.poll_auth_events());
    assert!(store.is_authenticated());
}

#[test]
fn queued_sign_in_is_not_replayed_after_failed_login() {
    let (backend, mut store) = signed_in();
    store.logout().unwrap();

    assert!(store
        .login(&LoginForm::new("ada@example.com", "wrong1"))
        .is_err());
    assert!(!store.poll_auth_events());
    assert!(!store.is_authenticated());
    assert_eq!(store.phase(), AuthPhase::Anonymous);
    assert!(deskmate_core::AuthApi::current_session(backend.as_ref())
        .unwrap()
        .is_none());
}

#[test]
fn failed_logout_keeps_session() {
    let (backend, mut store) = signed_in();
    backend.fail_next_auth(
        AuthOp::SignOut,
        RemoteError::new(RemoteErrorCode::Network, "offline"),
    );

    assert!(store.logout().is_err());
    assert_eq!(store.phase(), AuthPhase::Authenticated);
    assert!(store.is_authenticated());
}

#[test]
fn out_of_band_revocation_signs_out() {
    let (backend, mut store) = signed_in();
    assert!(!store.poll_auth_events());

    backend.revoke_session();
    assert!(store.poll_auth_events());
    assert!(!store.is_authenticated());
    assert_eq!(store.phase(), AuthPhase::Anonymous);
}

#[test]
fn token_refresh_keeps_user() {
    let (backend, mut store) = signed_in();
    let before = store.session().unwrap().access_token.clone();

    let rotated = backend.rotate_tokens().unwrap();
    assert!(!store.poll_auth_events());
    assert_ne!(store.session().unwrap().access_token, before);
    assert_eq!(store.session().unwrap().access_token, rotated.access_token);
}

#[test]
fn restore_session_adopts_backend_session() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("ada@example.com", "secret1", None);
    let session = deskmate_core::AuthApi::sign_in(backend.as_ref(), "ada@example.com", "secret1")
        .unwrap();

    let mut store = AuthStore::new(backend.clone(), backend);
    let restored = store.restore_session().unwrap().map(|user| user.id);
    assert_eq!(restored, Some(session.user_id()));
    assert_eq!(store.phase(), AuthPhase::Authenticated);
}

#[test]
fn password_reset_validates_then_delegates() {
    let (backend, mut store) = fresh();

    assert!(matches!(
        store.request_password_reset("not-an-email"),
        Err(StoreError::Validation(ValidationError::InvalidEmail(_)))
    ));
    store.request_password_reset(" ada@example.com").unwrap();
    assert_eq!(backend.reset_requests(), vec!["ada@example.com".to_string()]);
}

#[test]
fn profile_is_read_from_users_table() {
    let (_backend, mut store) = signed_in();

    let profile = store.fetch_profile().unwrap();
    assert_eq!(profile.email, "ada@example.com");
    assert_eq!(profile.name.as_deref(), Some("Ada"));
}

fn fresh() -> (Arc<MemoryBackend>, AuthStore) {
    let backend = Arc::new(MemoryBackend::new());
    let store = AuthStore::new(backend.clone(), backend.clone());
    (backend, store)
}

fn signed_in() -> (Arc<MemoryBackend>, AuthStore) {
    let (backend, mut store) = fresh();
    backend.add_user("ada@example.com", "secret1", Some("Ada"));
    store
        .login(&LoginForm::new("ada@example.com", "secret1"))
        .unwrap();
    (backend, store)
}
