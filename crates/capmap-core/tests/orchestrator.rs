use capmap_core::{
    FileSessionStore, MemorySessionStore, Orchestrator, SessionConfig, SessionContext, SessionStore,
};
use capmap_search::{CarryOver, OracleError, Outcome, PhaseState, StrategyRegistry};
use capmap_test_utils::{greedy_phase, small_tree, ScriptedOracle, Step};
use capmap_tree::Difficulty;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn orchestrator(oracle: Arc<ScriptedOracle>, store: Arc<dyn SessionStore>) -> Orchestrator {
    Orchestrator::with_registry(Arc::new(StrategyRegistry::with_defaults()), oracle, store)
}

fn context(phases: &[&str], iterations: u32) -> SessionContext {
    SessionContext::new(
        "session-a",
        phases.iter().map(|p| greedy_phase(p, iterations)).collect(),
    )
}

#[tokio::test]
async fn phases_run_in_order_and_persist() {
    let store = Arc::new(MemorySessionStore::new());
    let oracle = ScriptedOracle::passes_up_to(Difficulty::Easy).into_arc();
    let orchestrator = orchestrator(oracle, store.clone());
    let phases = ["phase_1", "phase_2", "phase_3"];

    let results = orchestrator
        .run_phase_sequence(small_tree(), &phases, &context(&phases, 3))
        .await
        .unwrap();

    let names: Vec<&str> = results.iter().map(|r| r.phase.as_str()).collect();
    assert_eq!(names, phases.to_vec());
    assert!(results.iter().all(|r| r.state.is_terminal() && !r.is_failed()));

    let history = store.history("session-a").await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].outcome.phase, "phase_1");

    let stored = store.load("session-a").await.unwrap().unwrap();
    assert_eq!(&stored, results[2].snapshot.as_ref());
}

#[tokio::test]
async fn missing_phase_fails_before_anything_runs() {
    let store = Arc::new(MemorySessionStore::new());
    let oracle = ScriptedOracle::always(Outcome::Pass).into_arc();
    let orchestrator = orchestrator(oracle.clone(), store.clone());

    let err = orchestrator
        .run_phase_sequence(small_tree(), &["phase_1", "phase_4"], &context(&["phase_1"], 3))
        .await
        .unwrap_err();

    assert!(err.results.is_empty());
    assert!(err.cause.is_configuration());
    assert_eq!(oracle.calls(), 0);
    assert!(store.load("session-a").await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_later_phase_is_rejected_up_front() {
    let oracle = ScriptedOracle::always(Outcome::Pass).into_arc();
    let orchestrator = orchestrator(oracle.clone(), Arc::new(MemorySessionStore::new()));
    let mut ctx = context(&["phase_1", "phase_2"], 3);
    ctx.phases[1].phase_params.exploration_probability = 2.0;

    let err = orchestrator
        .run_phase_sequence(small_tree(), &["phase_1", "phase_2"], &ctx)
        .await
        .unwrap_err();

    assert!(err.results.is_empty());
    assert!(err.to_string().contains("exploration_probability"));
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn failed_phase_stops_the_sequence_with_partial_results() {
    let store = Arc::new(MemorySessionStore::new());
    let oracle = ScriptedOracle::from_fn(|request, _| {
        if request.phase == "phase_2" {
            Step::Fail(OracleError::Transport("connection reset".into()))
        } else {
            Step::Reply(Outcome::Pass)
        }
    })
    .into_arc();
    let orchestrator = orchestrator(oracle, store.clone());
    let phases = ["phase_1", "phase_2", "phase_3"];

    let err = orchestrator
        .run_phase_sequence(small_tree(), &phases, &context(&phases, 3))
        .await
        .unwrap_err();

    assert_eq!(err.results.len(), 2);
    assert_eq!(err.results[0].state, PhaseState::Exhausted);
    assert_eq!(err.failed_phase().map(|r| r.phase.as_str()), Some("phase_2"));
    assert_eq!(store.history("session-a").await.unwrap().len(), 2);
}

#[tokio::test]
async fn carry_over_filter_prunes_weak_nodes() {
    let oracle = ScriptedOracle::passes_up_to(Difficulty::Easy).into_arc();
    let orchestrator = orchestrator(oracle, Arc::new(MemorySessionStore::new()));
    let mut ctx = context(&["phase_1", "phase_2"], 4);
    ctx.phases[1].phase_params.max_iterations = 1;
    ctx.phases[1].phase_params.num_nodes_per_iteration = 1;
    ctx.phases[1].carry_over = CarryOver::Filter { min_mean_value: 0.0 };

    let results = orchestrator
        .run_phase_sequence(small_tree(), &["phase_1", "phase_2"], &ctx)
        .await
        .unwrap();

    let mapped = &results[0].snapshot;
    assert_eq!(mapped.len(), 5);
    let kept = mapped.filtered(0.0).len();
    assert!(kept < mapped.len());
    assert!(results[1].snapshot.len() <= kept + 1);
    assert!(results[1]
        .snapshot
        .all_nodes()
        .all(|n| n.configuration().difficulty() == Difficulty::Easy || n.visits() <= 1));
}

const SESSION: &str = r"
session_id: resumable
tree:
  concepts: [loops, functions]
  difficulties: [easy, medium]
  root: { concepts: [loops], difficulty: easy }
phases:
  - name: phase_1
    phase_params: { max_iterations: 3, exploration_probability: 0.0, value_delta_threshold: 0.0 }
    environment: { seed: 3 }
";

#[tokio::test]
async fn sessions_resume_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(dir.path()));
    let oracle = ScriptedOracle::always(Outcome::Pass).into_arc();
    let orchestrator = orchestrator(oracle, Arc::clone(&store));
    let config = SessionConfig::from_yaml(SESSION).unwrap();

    let first = orchestrator.run_session(&config).await.unwrap();
    let after_first = first[0].snapshot.get(first[0].snapshot.root().unwrap()).unwrap().visits();

    let second = orchestrator.run_session(&config).await.unwrap();
    let resumed = &second[0].snapshot;
    assert!(resumed.get(resumed.root().unwrap()).unwrap().visits() > after_first);
    assert!(resumed.len() >= first[0].snapshot.len());

    assert_eq!(store.history("resumable").await.unwrap().len(), 2);
    assert!(dir.path().join("resumable.json").exists());
}

#[tokio::test]
async fn repeated_phase_name_is_rejected_before_running() {
    let doc = format!(
        "{SESSION}  - name: phase_1\n    phase_params: {{ max_iterations: 7 }}\n"
    );
    let config = SessionConfig::from_yaml(&doc).unwrap();
    assert_eq!(config.phase_names(), vec!["phase_1", "phase_1"]);

    let store = Arc::new(MemorySessionStore::new());
    let oracle = ScriptedOracle::always(Outcome::Pass).into_arc();
    let orchestrator = orchestrator(oracle.clone(), store.clone());

    let err = orchestrator.run_session(&config).await.unwrap_err();

    assert!(err.results.is_empty());
    assert!(err.cause.is_configuration());
    assert!(err.to_string().contains("phases[1].name"));
    assert_eq!(oracle.calls(), 0);
    assert!(store.load("resumable").await.unwrap().is_none());
}
