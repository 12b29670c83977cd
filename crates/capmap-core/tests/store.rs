use capmap_core::{FileSessionStore, MemorySessionStore, PhaseRecord, SessionStore, StoreError};
use capmap_search::{PhaseOutcome, PhaseState};
use capmap_test_utils::small_tree;
use capmap_tree::{Configuration, Difficulty};

fn record(phase: &str) -> PhaseRecord {
    PhaseRecord::new(
        PhaseOutcome {
            phase: phase.to_string(),
            state: PhaseState::Converged,
            iterations: 7,
            final_aggregate: Some(0.05),
            best_aggregate: Some(0.08),
            evaluations: 21,
            timeouts: 1,
            cancelled: 0,
        },
        4,
    )
}

async fn exercise(store: &dyn SessionStore) {
    assert!(store.load("s1").await.unwrap().is_none());
    assert!(store.history("s1").await.unwrap().is_empty());

    let mut tree = small_tree();
    let root = tree.root().unwrap();
    let child = tree
        .add_child(root, Configuration::new(["functions", "loops"], Difficulty::Easy))
        .unwrap();
    tree.backpropagate(child, 0.5, 0.5).unwrap();

    store.save("s1", &tree).await.unwrap();
    store.append_history("s1", record("phase_1")).await.unwrap();
    store.append_history("s1", record("phase_2")).await.unwrap();

    assert_eq!(store.load("s1").await.unwrap(), Some(tree.clone()));
    let phases: Vec<String> = store
        .history("s1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.outcome.phase)
        .collect();
    assert_eq!(phases, vec!["phase_1", "phase_2"]);

    // saving again keeps history
    store.save("s1", &small_tree()).await.unwrap();
    assert_eq!(store.history("s1").await.unwrap().len(), 2);
    assert_eq!(store.load("s1").await.unwrap().unwrap().len(), 1);

    assert!(store.load("s2").await.unwrap().is_none());
}

#[tokio::test]
async fn memory_store_round_trips() {
    let store = MemorySessionStore::new();
    exercise(&store).await;
    assert_eq!(store.sessions(), vec!["s1".to_string()]);
}

#[tokio::test]
async fn file_store_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(dir.path().join("sessions"));
    exercise(&store).await;
    assert!(dir.path().join("sessions").join("s1.json").exists());
    assert!(!dir.path().join("sessions").join("s1.json.tmp").exists());
}

#[tokio::test]
async fn file_store_rejects_path_like_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(dir.path());
    for id in ["", "../escape", "a/b", ".hidden"] {
        let err = store.save(id, &small_tree()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidSessionId(_)), "{id}");
    }
}

#[tokio::test]
async fn file_store_reports_garbage_documents() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("broken.json"), b"{ not json").await.unwrap();
    let store = FileSessionStore::new(dir.path());
    let err = store.load("broken").await.unwrap_err();
    assert!(matches!(err, StoreError::Serialization(_)));
}
