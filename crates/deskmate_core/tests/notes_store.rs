use deskmate_core::remote::memory::{RemoteCall, RemoteOp};
use deskmate_core::{
    AuthApi, MemoryBackend, NoteDraft, NotePatch, NoteStore, RemoteError, StoreError, Table,
    UserId, ValidationError,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn create_with_empty_title_is_rejected_without_remote_call() {
    let (backend, mut store, _) = signed_in();

    let err = store.create(&NoteDraft::new("   ", "body")).unwrap_err();
    assert_eq!(err, StoreError::Validation(ValidationError::Required("title")));
    assert!(backend.calls().is_empty());
    assert!(store.items().is_empty());
}

#[test]
fn create_appends_server_row_once() {
    let (backend, mut store, user) = signed_in();

    let note = store.create(&NoteDraft::new("X", "Y")).unwrap();
    assert_eq!(store.items().len(), 1);
    assert_eq!(store.items()[0], note);
    assert_eq!(note.title, "X");
    assert_eq!(note.content, "Y");
    assert_eq!(note.user_id, user);
    assert!(!note.id.is_nil());
    assert_eq!(
        backend.calls(),
        vec![RemoteCall {
            op: RemoteOp::Insert,
            table: Table::Notes
        }]
    );
    assert_eq!(backend.rows(Table::Notes)[0]["user_id"], json!(user));
}

#[test]
fn remote_failure_leaves_list_unchanged() {
    let (backend, mut store, _) = signed_in();
    let kept = store.create(&NoteDraft::new("kept", "")).unwrap();
    let before = store.items().to_vec();

    backend.fail_next(RemoteOp::Insert, Table::Notes, RemoteError::rejected("boom"));
    assert!(matches!(
        store.create(&NoteDraft::new("lost", "")),
        Err(StoreError::Remote(_))
    ));

    backend.fail_next(RemoteOp::Update, Table::Notes, RemoteError::rejected("boom"));
    let patch = NotePatch {
        title: Some("renamed".to_string()),
        ..NotePatch::default()
    };
    assert!(store.update(kept.id, patch).is_err());

    backend.fail_next(RemoteOp::Delete, Table::Notes, RemoteError::rejected("boom"));
    assert!(store.delete(kept.id).is_err());

    assert_eq!(store.items(), before.as_slice());
}

#[test]
fn update_replaces_entry_and_stamps_modification_time() {
    let (_backend, mut store, _) = signed_in();
    let first = store.create(&NoteDraft::new("first", "a")).unwrap();
    let second = store.create(&NoteDraft::new("second", "b")).unwrap();
    assert!(first.updated_at.is_none());

    let patch = NotePatch {
        content: Some("edited".to_string()),
        ..NotePatch::default()
    };
    let updated = store.update(first.id, patch).unwrap();

    assert_eq!(updated.content, "edited");
    assert_eq!(updated.title, "first");
    assert!(updated.updated_at.is_some());
    assert_eq!(store.items()[0], updated);
    assert_eq!(store.items()[1], second);
}

#[test]
fn delete_removes_entry() {
    let (backend, mut store, _) = signed_in();
    let note = store.create(&NoteDraft::new("gone", "")).unwrap();

    store.delete(note.id).unwrap();
    assert!(store.items().is_empty());
    assert!(backend.rows(Table::Notes).is_empty());
}

#[test]
fn unknown_id_fails_without_remote_call() {
    let (backend, mut store, _) = signed_in();
    let missing = Uuid::new_v4();

    assert_eq!(store.delete(missing).unwrap_err(), StoreError::NotFound(missing));
    assert!(backend.calls().is_empty());
}

#[test]
fn operations_without_owner_fail_locally() {
    let backend = Arc::new(MemoryBackend::new());
    let mut store = NoteStore::new(backend.clone());

    assert_eq!(
        store.create(&NoteDraft::new("X", "Y")).unwrap_err(),
        StoreError::NotAuthenticated
    );
    assert_eq!(store.fetch_all().unwrap_err(), StoreError::NotAuthenticated);
    assert!(backend.calls().is_empty());
}

#[test]
fn fetch_keeps_only_rows_of_the_owner() {
    let (backend, mut store, user) = signed_in();
    backend.set_row_security(false);
    seed_note(&backend, user, "mine");
    seed_note(&backend, Uuid::new_v4(), "theirs");

    assert_eq!(store.fetch_all().unwrap(), 1);
    assert_eq!(store.items()[0].title, "mine");
    assert!(!store.is_loading());
}

#[test]
fn fetch_failure_leaves_list_empty() {
    let (backend, mut store, user) = signed_in();
    seed_note(&backend, user, "mine");
    store.fetch_all().unwrap();

    backend.fail_next(RemoteOp::Select, Table::Notes, RemoteError::rejected("offline"));
    assert!(store.fetch_all().is_err());
    assert!(store.items().is_empty());
    assert!(!store.is_loading());
}

#[test]
fn changing_owner_clears_list() {
    let (_backend, mut store, _) = signed_in();
    store.create(&NoteDraft::new("X", "Y")).unwrap();

    store.set_owner(Some(Uuid::new_v4()));
    assert!(store.items().is_empty());
}

fn signed_in() -> (Arc<MemoryBackend>, NoteStore, UserId) {
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.add_user("ada@example.com", "secret1", Some("Ada"));
    backend.sign_in("ada@example.com", "secret1").unwrap();
    backend.clear_calls();

    let mut store = NoteStore::new(backend.clone());
    store.set_owner(Some(user));
    (backend, store, user)
}

fn seed_note(backend: &MemoryBackend, owner: UserId, title: &str) {
    backend.seed_row(
        Table::Notes,
        json!({ "user_id": owner, "title": title, "content": "" }),
    );
}
