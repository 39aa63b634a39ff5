use deskmate_core::remote::memory::{RemoteCall, RemoteOp};
use deskmate_core::{
    AuthApi, AuthUser, CollaboratorRole, MemoryBackend, NotebookStore, RemoteError, SagaStep,
    StoreError, Table,
};
use std::sync::Arc;

#[test]
fn create_writes_notebook_owner_and_content_rows() {
    let (backend, mut store, owner) = signed_in();

    let notebook = store.create("Trip").unwrap();
    assert_eq!(notebook.title, "Trip");
    assert_eq!(notebook.owner_id, owner.id);
    assert_eq!(notebook.content, "");
    assert!(notebook.content_id.is_some());
    assert_eq!(notebook.collaborator_ids(), vec![owner.id]);
    assert_eq!(notebook.collaborators[0].role, CollaboratorRole::Owner);
    assert_eq!(store.items().len(), 1);
    assert_eq!(store.active().map(|active| active.id), Some(notebook.id));

    assert_eq!(
        ops(&backend),
        vec![
            (RemoteOp::Insert, Table::SharedNotebooks),
            (RemoteOp::Insert, Table::NotebookCollaborators),
            (RemoteOp::Insert, Table::NotebookContent),
        ]
    );
}

#[test]
fn failed_content_step_is_compensated() {
    let (backend, mut store, _) = signed_in();
    backend.fail_next(
        RemoteOp::Insert,
        Table::NotebookContent,
        RemoteError::rejected("boom"),
    );

    let err = store.create("Trip").unwrap_err();
    assert!(matches!(
        err,
        StoreError::PartialFailure {
            step: SagaStep::CreateContent,
            compensated: true,
            ..
        }
    ));
    assert!(store.items().is_empty());
    assert!(store.active().is_none());
    assert!(backend.rows(Table::SharedNotebooks).is_empty());
    assert!(backend.rows(Table::NotebookCollaborators).is_empty());
    assert!(backend.rows(Table::NotebookContent).is_empty());
}

#[test]
fn failed_owner_step_reports_incomplete_compensation() {
    let (backend, mut store, _) = signed_in();
    backend.fail_next(
        RemoteOp::Insert,
        Table::NotebookCollaborators,
        RemoteError::rejected("boom"),
    );
    backend.fail_next(
        RemoteOp::Delete,
        Table::SharedNotebooks,
        RemoteError::rejected("still boom"),
    );

    let err = store.create("Trip").unwrap_err();
    assert!(matches!(
        err,
        StoreError::PartialFailure {
            step: SagaStep::CreateOwnerCollaborator,
            compensated: false,
            ..
        }
    ));
    assert_eq!(backend.rows(Table::SharedNotebooks).len(), 1);
}

#[test]
fn delete_runs_collaborators_content_then_notebook() {
    let (backend, mut store, _) = signed_in();
    let notebook = store.create("Trip").unwrap();
    backend.clear_calls();

    store.delete(notebook.id).unwrap();
    assert_eq!(
        ops(&backend),
        vec![
            (RemoteOp::Delete, Table::NotebookCollaborators),
            (RemoteOp::Delete, Table::NotebookContent),
            (RemoteOp::Delete, Table::SharedNotebooks),
        ]
    );
    assert!(store.items().is_empty());
    assert!(store.active().is_none());
    assert!(backend.rows(Table::SharedNotebooks).is_empty());
}

#[test]
fn delete_stops_at_first_failing_step() {
    let (backend, mut store, _) = signed_in();
    let notebook = store.create("Trip").unwrap();
    backend.clear_calls();
    backend.fail_next(
        RemoteOp::Delete,
        Table::NotebookContent,
        RemoteError::rejected("boom"),
    );

    let err = store.delete(notebook.id).unwrap_err();
    assert!(matches!(
        err,
        StoreError::PartialFailure {
            step: SagaStep::DeleteContent,
            compensated: false,
            ..
        }
    ));
    assert_eq!(
        backend.calls(),
        vec![
            RemoteCall {
                op: RemoteOp::Delete,
                table: Table::NotebookCollaborators
            },
            RemoteCall {
                op: RemoteOp::Delete,
                table: Table::NotebookContent
            },
        ]
    );
    assert_eq!(store.items().len(), 1);
    assert_eq!(backend.rows(Table::SharedNotebooks).len(), 1);
}

#[test]
fn invite_resolves_email_and_is_idempotent() {
    let (backend, mut store, _) = signed_in();
    let guest = backend.add_user("grace@example.com", "secret2", Some("Grace"));
    let notebook = store.create("Trip").unwrap();

    let shared = store.add_collaborator(notebook.id, "grace@example.com").unwrap();
    assert!(shared.is_collaborator(guest));
    assert_eq!(shared.collaborators.len(), 2);

    backend.clear_calls();
    let again = store.add_collaborator(notebook.id, "GRACE@example.com").unwrap();
    assert_eq!(again.collaborators.len(), 2);
    assert!(backend.calls().is_empty());
    assert_eq!(backend.rows(Table::NotebookCollaborators).len(), 2);
}

#[test]
fn invite_of_unknown_email_surfaces_user_not_found() {
    let (backend, mut store, _) = signed_in();
    let notebook = store.create("Trip").unwrap();

    let err = store
        .add_collaborator(notebook.id, "nobody@example.com")
        .unwrap_err();
    assert_eq!(err, StoreError::UserNotFound("nobody@example.com".to_string()));
    assert_eq!(backend.rows(Table::NotebookCollaborators).len(), 1);
}

#[test]
fn collaborator_sees_notebook_in_shared_list() {
    let (backend, mut store, _) = signed_in();
    backend.add_user("grace@example.com", "secret2", None);
    let notebook = store.create("Trip").unwrap();
    store.add_collaborator(notebook.id, "grace@example.com").unwrap();
    store.save_content(notebook.id, "passport").unwrap();

    let guest = backend.sign_in("grace@example.com", "secret2").unwrap();
    let mut guest_store = NotebookStore::new(backend.clone());
    guest_store.set_owner(Some(&guest.user));

    assert_eq!(guest_store.fetch_all().unwrap(), 0);
    assert_eq!(guest_store.fetch_shared().unwrap(), 1);
    assert_eq!(guest_store.shared()[0].content, "passport");
}

#[test]
fn remove_collaborator_drops_row() {
    let (backend, mut store, _) = signed_in();
    let guest = backend.add_user("grace@example.com", "secret2", None);
    let notebook = store.create("Trip").unwrap();
    store.add_collaborator(notebook.id, "grace@example.com").unwrap();

    let updated = store.remove_collaborator(notebook.id, guest).unwrap();
    assert!(!updated.is_collaborator(guest));
    assert_eq!(backend.rows(Table::NotebookCollaborators).len(), 1);
}

#[test]
fn failed_edits_leave_notebooks_unchanged() {
    let (backend, mut store, _) = signed_in();
    let guest = backend.add_user("grace@example.com", "secret2", None);
    backend.add_user("alan@example.com", "secret3", None);
    let notebook = store.create("Trip").unwrap();
    store.save_content(notebook.id, "passport").unwrap();
    store.add_collaborator(notebook.id, "grace@example.com").unwrap();
    let before = store.items().to_vec();

    backend.fail_next(RemoteOp::Update, Table::SharedNotebooks, RemoteError::rejected("boom"));
    assert!(store.rename(notebook.id, "Road trip").is_err());
    assert_eq!(store.items(), before.as_slice());

    backend.fail_next(RemoteOp::Update, Table::NotebookContent, RemoteError::rejected("boom"));
    assert!(store.save_content(notebook.id, "tickets").is_err());
    assert_eq!(store.items(), before.as_slice());

    backend.fail_next(RemoteOp::Select, Table::Users, RemoteError::rejected("boom"));
    assert!(store.add_collaborator(notebook.id, "alan@example.com").is_err());
    assert_eq!(store.items(), before.as_slice());

    backend.fail_next(
        RemoteOp::Insert,
        Table::NotebookCollaborators,
        RemoteError::rejected("boom"),
    );
    assert!(store.add_collaborator(notebook.id, "alan@example.com").is_err());
    assert_eq!(store.items(), before.as_slice());

    backend.fail_next(
        RemoteOp::Delete,
        Table::NotebookCollaborators,
        RemoteError::rejected("boom"),
    );
    assert!(store.remove_collaborator(notebook.id, guest).is_err());
    assert_eq!(store.items(), before.as_slice());
    assert_eq!(backend.rows(Table::NotebookCollaborators).len(), 2);
    assert_eq!(store.items()[0].content, "passport");
}

#[test]
fn fetch_all_assembles_embedded_rows() {
    let (backend, mut store, owner) = signed_in();
    let created = store.create("Trip").unwrap();
    store.rename(created.id, "Road trip").unwrap();

    let mut fresh = NotebookStore::new(backend.clone());
    fresh.set_owner(Some(&owner));
    assert_eq!(fresh.fetch_all().unwrap(), 1);
    let loaded = &fresh.items()[0];
    assert_eq!(loaded.title, "Road trip");
    assert_eq!(loaded.collaborator_ids(), vec![owner.id]);
    assert_eq!(loaded.content_id, created.content_id);
}

fn signed_in() -> (Arc<MemoryBackend>, NotebookStore, AuthUser) {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("ada@example.com", "secret1", Some("Ada"));
    let session = backend.sign_in("ada@example.com", "secret1").unwrap();
    backend.clear_calls();

    let mut store = NotebookStore::new(backend.clone());
    store.set_owner(Some(&session.user));
    (backend, store, session.user)
}

fn ops(backend: &MemoryBackend) -> Vec<(RemoteOp, Table)> {
    backend
        .calls()
        .into_iter()
        .map(|call| (call.op, call.table))
        .collect()
}
