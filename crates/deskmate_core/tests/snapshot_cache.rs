use deskmate_core::remote::memory::RemoteOp;
use deskmate_core::{
    AuthApi, MemoryBackend, Note, NoteDraft, NoteStore, NotebookStore, RemoteError,
    SharedNotebook, SnapshotCache, SnapshotKey, Table,
};
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn confirmed_changes_are_restored_offline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let backend = Arc::new(MemoryBackend::new());
    let user = backend.add_user("ada@example.com", "secret1", None);
    backend.sign_in("ada@example.com", "secret1").unwrap();

    {
        let cache = Arc::new(SnapshotCache::open(&path).unwrap());
        let mut store = NoteStore::new(backend.clone()).with_cache(cache);
        store.set_owner(Some(user));
        store.create(&NoteDraft::new("X", "Y")).unwrap();
        backend.fail_next(RemoteOp::Insert, Table::Notes, RemoteError::rejected("boom"));
        assert!(store.create(&NoteDraft::new("not saved", "")).is_err());
    }

    let cache = Arc::new(SnapshotCache::open(&path).unwrap());
    let mut restored = NoteStore::new(backend.clone()).with_cache(cache);
    restored.set_owner(Some(user));
    assert_eq!(restored.restore_cached().unwrap(), 1);
    assert_eq!(restored.items()[0].title, "X");
}

#[test]
fn snapshots_are_scoped_per_owner() {
    let cache = Arc::new(SnapshotCache::in_memory().unwrap());
    let backend = Arc::new(MemoryBackend::new());
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let mut store = NoteStore::new(backend).with_cache(cache.clone());
    store.set_owner(Some(owner));
    store.restore_cached().unwrap();

    let notes: Vec<Note> = Vec::new();
    cache
        .save(&SnapshotKey::new(Table::Notes, stranger), &notes)
        .unwrap();
    assert!(cache
        .load::<Note>(&SnapshotKey::new(Table::Notes, owner))
        .unwrap()
        .is_none());
    assert_eq!(cache.clear_owner(stranger).unwrap(), 1);
}

#[test]
fn notebook_snapshot_tracks_saga_outcome() {
    let cache = Arc::new(SnapshotCache::in_memory().unwrap());
    let backend = Arc::new(MemoryBackend::new());
    backend.add_user("ada@example.com", "secret1", None);
    let session = backend.sign_in("ada@example.com", "secret1").unwrap();

    let mut store = NotebookStore::new(backend.clone()).with_cache(cache.clone());
    store.set_owner(Some(&session.user));
    let notebook = store.create("Trip").unwrap();

    let key = SnapshotKey::new(Table::SharedNotebooks, session.user_id());
    let saved: Vec<SharedNotebook> = cache.load(&key).unwrap().unwrap();
    assert_eq!(saved, vec![notebook.clone()]);

    store.delete(notebook.id).unwrap();
    let saved: Vec<SharedNotebook> = cache.load(&key).unwrap().unwrap();
    assert!(saved.is_empty());
}
