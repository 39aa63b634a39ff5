use deskmate_core::remote::memory::{RemoteCall, RemoteOp};
use deskmate_core::{
    AuthApi, AuthPhase, LoginForm, MemoryBackend, NoteDraft, RegisterForm, RemoteError,
    RemoteErrorCode, SnapshotCache, StoreError, Table, TaskDraft, Workspace,
};
use serde_json::json;
use std::sync::Arc;

#[test]
fn login_binds_and_loads_every_store() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.add_user("ada@example.com", "secret1", None);
    backend.seed_row(Table::Notes, json!({ "user_id": user, "title": "seeded" }));
    backend.seed_row(Table::Tasks, json!({ "user_id": user, "title": "todo" }));
    let mut workspace = Workspace::new(backend, None);

    let bound = workspace
        .login(&LoginForm::new("ada@example.com", "secret1"))
        .unwrap();
    assert_eq!(bound.user, Some(user));
    assert!(!bound.reloaded);
    assert!(workspace.notes().items().is_empty());

    let report = workspace.reload();
    assert!(report.reloaded);
    assert!(report.is_clean());
    assert_eq!(workspace.notes().items().len(), 1);
    assert_eq!(workspace.tasks().items().len(), 1);
    assert_eq!(workspace.notes().owner(), Some(user));
    assert_eq!(workspace.notebooks().owner(), Some(user));
}

#[test]
fn logout_clears_every_store() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("ada@example.com", "secret1", None);
    let mut workspace = Workspace::new(backend, None);
    workspace
        .login(&LoginForm::new("ada@example.com", "secret1"))
        .unwrap();
    workspace
        .notes_mut()
        .create(&NoteDraft::new("X", "Y"))
        .unwrap();
    workspace.notebooks_mut().create("Trip").unwrap();

    let report = workspace.logout().unwrap();
    assert_eq!(report.user, None);
    assert!(!workspace.auth().is_authenticated());
    assert!(workspace.notes().items().is_empty());
    assert!(workspace.notebooks().items().is_empty());
    assert!(workspace.notebooks().active().is_none());
}

#[test]
fn fetch_failures_are_reported_per_table() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("ada@example.com", "secret1", None);
    backend.fail_next(RemoteOp::Select, Table::Tasks, RemoteError::rejected("boom"));
    let mut workspace = Workspace::new(backend, None);

    workspace
        .login(&LoginForm::new("ada@example.com", "secret1"))
        .unwrap();
    let report = workspace.reload();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, Table::Tasks);
    assert!(workspace.tasks().items().is_empty());
}

#[test]
fn server_side_revocation_is_followed_on_poll() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("ada@example.com", "secret1", None);
    let mut workspace = Workspace::new(backend.clone(), None);
    workspace
        .login(&LoginForm::new("ada@example.com", "secret1"))
        .unwrap();
    workspace
        .tasks_mut()
        .create(&TaskDraft::new("t"))
        .unwrap();
    assert!(workspace.poll().is_none());

    backend.revoke_session();
    let report = workspace.poll().unwrap();
    assert_eq!(report.user, None);
    assert!(workspace.tasks().items().is_empty());
}

#[test]
fn start_shows_cached_lists_until_reload() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = Arc::new(SnapshotCache::in_memory().unwrap());
    backend.add_user("ada@example.com", "secret1", None);

    let mut first = Workspace::new(backend.clone(), Some(cache.clone()));
    first
        .login(&LoginForm::new("ada@example.com", "secret1"))
        .unwrap();
    first.notes_mut().create(&NoteDraft::new("X", "Y")).unwrap();

    let mut second = Workspace::new(backend.clone(), Some(cache));
    let report = second.start().unwrap();
    assert!(second.auth().is_authenticated());
    assert!(!report.reloaded);
    assert_eq!(report.restored, 1);
    assert_eq!(second.notes().items()[0].title, "X");
    assert!(second.cached_at(Table::Notes).is_some());
    assert!(second.cached_at(Table::Events).is_none());
    let notes_select = RemoteCall {
        op: RemoteOp::Select,
        table: Table::Notes,
    };
    assert!(!backend.calls().contains(&notes_select));

    backend.fail_next(RemoteOp::Select, Table::Notes, RemoteError::rejected("offline"));
    let report = second.reload();
    assert_eq!(report.failures[0].0, Table::Notes);
    assert!(second.notes().items().is_empty());
}

#[test]
fn start_without_cache_restores_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.add_user("ada@example.com", "secret1", None);
    backend.seed_row(Table::Notes, json!({ "user_id": user, "title": "remote" }));
    backend.sign_in("ada@example.com", "secret1").unwrap();

    let mut workspace = Workspace::new(backend, None);
    let report = workspace.start().unwrap();
    assert_eq!(report.restored, 0);
    assert!(workspace.notes().items().is_empty());
    assert!(workspace.cached_at(Table::Notes).is_none());

    workspace.reload();
    assert_eq!(workspace.notes().items().len(), 1);
}

#[test]
fn second_login_is_refused_and_keeps_backend_in_step() {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.add_user("ada@example.com", "secret1", None);
    let mut workspace = Workspace::new(backend.clone(), None);
    workspace
        .login(&LoginForm::new("ada@example.com", "secret1"))
        .unwrap();
    let sign_ins = backend.auth_calls().len();

    let err = workspace
        .login(&LoginForm::new("ada@example.com", "wrong1"))
        .unwrap_err();
    assert_eq!(err, StoreError::AlreadyAuthenticated);
    assert_eq!(backend.auth_calls().len(), sign_ins);
    assert_eq!(workspace.auth().user_id(), Some(user));
    let held = backend.current_session().unwrap().map(|session| session.user_id());
    assert_eq!(held, workspace.auth().user_id());
    assert!(workspace.poll().is_none());
    assert_eq!(workspace.auth().phase(), AuthPhase::Authenticated);
}

#[test]
fn failed_login_after_logout_is_not_undone_by_poll() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("ada@example.com", "secret1", None);
    let mut workspace = Workspace::new(backend.clone(), None);
    workspace
        .login(&LoginForm::new("ada@example.com", "secret1"))
        .unwrap();
    workspace.logout().unwrap();

    let err = workspace
        .login(&LoginForm::new("ada@example.com", "wrong1"))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Remote(RemoteError {
            code: RemoteErrorCode::Unauthorized,
            ..
        })
    ));
    assert!(backend.current_session().unwrap().is_none());

    assert!(workspace.poll().is_none());
    assert!(!workspace.auth().is_authenticated());
    assert_eq!(workspace.auth().phase(), AuthPhase::Anonymous);
    assert_eq!(workspace.notes().owner(), None);
}

#[test]
fn register_with_mismatch_makes_no_remote_call() {
    let backend = Arc::new(MemoryBackend::new());
    let mut workspace = Workspace::new(backend.clone(), None);

    assert!(workspace
        .register(&RegisterForm::new("ada@example.com", "abc", "xyz"))
        .is_err());
    assert!(backend.auth_calls().is_empty());
    assert!(backend.calls().is_empty());
    assert!(backend.current_session().unwrap().is_none());
}
