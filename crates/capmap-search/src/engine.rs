//! Phase engine: plan, evaluate concurrently, score, backpropagate, repeat
//!
//! One [`PhaseEngine`] drives one phase over a tree it borrows mutably for
//! the whole run. Oracle calls of an iteration run concurrently on the
//! current task (no spawning), bounded by `max_concurrent_tasks`, each by
//! `task_timeout` and the whole fan-out by `environment.timeout`. Results are
//! scored and backpropagated in completion order.

use crate::config::PhaseConfig;
use crate::convergence::ConvergenceMonitor;
use crate::error::SearchError;
use crate::oracle::{EvaluationOracle, EvaluationRequest, OracleError, Outcome};
use crate::registry::StrategyRegistry;
use crate::state_machine::{validate_transition, PhaseState};
use crate::strategy::{Expansion, Frontier, ScoreTarget, SearchContext, StrategySet};
use capmap_tree::{NodeId, Tree, TreeError};
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Mutable bookkeeping of a running phase
#[derive(Debug, Clone)]
pub struct PhaseRun {
    /// Phase name
    pub phase: String,
    /// Current state
    pub state: PhaseState,
    /// Completed iterations
    pub iteration: u32,
    /// Consecutive small-delta tracking
    pub convergence: ConvergenceMonitor,
    /// Aggregate of the latest scoring iteration
    pub last_aggregate: Option<f64>,
    /// Highest aggregate seen
    pub best_aggregate: Option<f64>,
    /// Oracle results scored so far
    pub evaluations: u64,
    /// Evaluations scored as errors after a timeout
    pub timeouts: u64,
    /// Evaluations dropped at an iteration deadline
    pub cancelled: u64,
    /// Resolved select, expand and score strategies
    pub strategies: StrategySet,
}

/// Terminal summary of one phase run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// Phase name
    pub phase: String,
    /// State when the summary was taken
    pub state: PhaseState,
    /// Completed iterations
    pub iterations: u32,
    /// Aggregate of the last scoring iteration
    pub final_aggregate: Option<f64>,
    /// Highest aggregate seen
    pub best_aggregate: Option<f64>,
    /// Oracle results scored
    pub evaluations: u64,
    /// Evaluations scored as errors after a timeout
    pub timeouts: u64,
    /// Evaluations dropped at an iteration deadline
    pub cancelled: u64,
}

#[derive(Debug, Clone)]
struct EvaluationTask {
    node: NodeId,
    request: EvaluationRequest,
}

/// Runs one configured phase to a terminal state
pub struct PhaseEngine {
    config: PhaseConfig,
    oracle: Arc<dyn EvaluationOracle>,
    rng: StdRng,
    run: PhaseRun,
}

impl std::fmt::Debug for PhaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseEngine")
            .field("phase", &self.config.name)
            .field("run", &self.run)
            .finish_non_exhaustive()
    }
}

impl PhaseEngine {
    /// Validate `config` and resolve its strategies from `registry`
    ///
    /// # Errors
    /// `Configuration` or `UnknownStrategy`
    pub fn new(
        config: PhaseConfig,
        registry: &StrategyRegistry,
        oracle: Arc<dyn EvaluationOracle>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let strategies = registry.resolve(&config.name)?;
        Ok(Self::with_strategies(config, strategies, oracle))
    }

    /// Engine over already validated config and resolved strategies
    #[must_use]
    pub fn with_strategies(
        config: PhaseConfig,
        strategies: StrategySet,
        oracle: Arc<dyn EvaluationOracle>,
    ) -> Self {
        let rng = match config.environment.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let run = PhaseRun {
            phase: config.name.clone(),
            state: PhaseState::Initialized,
            iteration: 0,
            convergence: ConvergenceMonitor::new(
                config.phase_params.value_delta_threshold,
                config.phase_params.convergence_checks,
            ),
            last_aggregate: None,
            best_aggregate: None,
            evaluations: 0,
            timeouts: 0,
            cancelled: 0,
            strategies,
        };
        Self {
            config,
            oracle,
            rng,
            run,
        }
    }

    /// Configuration this engine runs
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    /// Live bookkeeping of the run
    #[inline]
    #[must_use]
    pub fn run_state(&self) -> &PhaseRun {
        &self.run
    }

    /// Summary of the run so far
    #[must_use]
    pub fn outcome(&self) -> PhaseOutcome {
        PhaseOutcome {
            phase: self.run.phase.clone(),
            state: self.run.state,
            iterations: self.run.iteration,
            final_aggregate: self.run.last_aggregate,
            best_aggregate: self.run.best_aggregate,
            evaluations: self.run.evaluations,
            timeouts: self.run.timeouts,
            cancelled: self.run.cancelled,
        }
    }

    /// Iterate until converged, exhausted or failed
    ///
    /// On error the engine is left in `Failed` and [`outcome`](Self::outcome)
    /// still reports the iterations completed.
    ///
    /// # Errors
    /// `OracleTransport`, `TreeIntegrity` or `IllegalTransition`
    pub async fn run(&mut self, tree: &mut Tree) -> Result<PhaseOutcome, SearchError> {
        self.transition(PhaseState::Running)?;
        info!(
            "Phase {} started: select={} expand={} score={}",
            self.run.phase,
            self.run.strategies.select.name(),
            self.run.strategies.expand.name(),
            self.run.strategies.score.name()
        );

        match self.iterate(tree).await {
            Ok(state) => {
                if let Err(e) = tree.verify_integrity() {
                    return Err(self.fail(e.into()));
                }
                self.transition(state)?;
                info!(
                    "Phase {} {} after {} iterations (aggregate {:?})",
                    self.run.phase, state, self.run.iteration, self.run.last_aggregate
                );
                Ok(self.outcome())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn iterate(&mut self, tree: &mut Tree) -> Result<PhaseState, SearchError> {
        let max_iterations = self.config.phase_params.max_iterations;
        loop {
            let frontier = self.plan(tree);
            if frontier.is_empty() {
                info!("Phase {}: nothing left to expand", self.run.phase);
                return Ok(PhaseState::Exhausted);
            }

            let tasks = self.materialize(tree, frontier)?;
            let completed = self.dispatch(&tasks).await.map_err(SearchError::OracleTransport)?;
            self.run.cancelled += (tasks.len() - completed.len()) as u64;

            for (index, outcome) in &completed {
                self.apply(tree, tasks[*index].node, *outcome)?;
            }
            self.run.iteration += 1;

            let converged = match aggregate(tree, completed.iter().map(|(i, _)| tasks[*i].node)) {
                Some(current) => {
                    self.run.last_aggregate = Some(current);
                    self.run.best_aggregate =
                        Some(self.run.best_aggregate.map_or(current, |best| best.max(current)));
                    self.run.convergence.observe(current)
                }
                None => {
                    self.run.convergence.interrupt();
                    false
                }
            };
            info!(
                "Phase {} iteration {}: {} planned, {} scored, aggregate {:?}, stable {}",
                self.run.phase,
                self.run.iteration,
                tasks.len(),
                completed.len(),
                self.run.last_aggregate,
                self.run.convergence.counter()
            );

            if converged {
                return Ok(PhaseState::Converged);
            }
            if self.run.iteration >= max_iterations {
                return Ok(PhaseState::Exhausted);
            }
        }
    }

    /// Select + expand until the frontier is full or nothing else can be planned
    fn plan(&mut self, tree: &Tree) -> Frontier {
        let wanted = self.config.phase_params.num_nodes_per_iteration;
        let mut frontier = Frontier::default();
        while frontier.len() < wanted {
            let ctx = SearchContext::new(tree, &self.config, &frontier);
            let strategies = &self.run.strategies;
            let Some(node) = strategies
                .select
                .select(&ctx, strategies.expand.as_ref(), &mut self.rng)
            else {
                break;
            };
            let Some(expansion) = strategies.expand.expand(&ctx, node) else {
                break;
            };
            debug!("Phase {}: planned {:?} on {}", self.run.phase, expansion, node);
            frontier.push(node, expansion);
        }
        frontier
    }

    /// Turn frontier entries into tree nodes and oracle requests
    fn materialize(&self, tree: &mut Tree, frontier: Frontier) -> Result<Vec<EvaluationTask>, SearchError> {
        let mut tasks = Vec::with_capacity(frontier.len());
        let mut repeats: HashMap<NodeId, u32> = HashMap::new();

        for entry in frontier.into_entries() {
            let node = match entry.expansion {
                Expansion::Instance => entry.node,
                Expansion::Child(configuration) => match tree.add_child(entry.node, configuration) {
                    Ok(child) => child,
                    Err(e @ (TreeError::DuplicateConfiguration { .. } | TreeError::OutOfBounds(_))) => {
                        warn!("Phase {}: skipping expansion: {}", self.run.phase, e);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                },
            };

            let target = tree.get(node)?;
            let offset = repeats.entry(node).or_insert(0);
            let instance = target.phase_metadata().attempts + *offset;
            *offset += 1;

            tasks.push(EvaluationTask {
                node,
                request: EvaluationRequest {
                    phase: self.run.phase.clone(),
                    node,
                    configuration: target.configuration().clone(),
                    instance,
                },
            });
        }
        Ok(tasks)
    }

    /// Evaluate every task; returns `(task index, outcome)` in completion order
    ///
    /// Tasks still running when the iteration deadline passes are dropped
    /// and absent from the result.
    async fn dispatch(&mut self, tasks: &[EvaluationTask]) -> Result<Vec<(usize, Outcome)>, OracleError> {
        let task_timeout = self.config.phase_params.task_timeout;
        let deadline = Instant::now() + self.config.environment.timeout;
        let oracle = &self.oracle;

        let in_flight = stream::iter(tasks.iter().enumerate())
            .map(|(index, task)| async move {
                let result = timeout(task_timeout, oracle.evaluate(&task.request, task_timeout)).await;
                (index, result)
            })
            .buffer_unordered(self.config.environment.max_concurrent_tasks);
        let mut in_flight = std::pin::pin!(in_flight);

        let mut completed = Vec::with_capacity(tasks.len());
        let mut timeouts = 0;
        loop {
            match timeout_at(deadline, in_flight.next()).await {
                Ok(Some((index, Ok(Ok(outcome))))) => completed.push((index, outcome)),
                Ok(Some((index, Ok(Err(OracleError::Timeout(_)))) | (index, Err(_)))) => {
                    let err = SearchError::EvaluationTimeout {
                        node: tasks[index].node,
                        timeout: task_timeout,
                    };
                    warn!("Phase {}: {}; scoring as error", self.run.phase, err);
                    timeouts += 1;
                    completed.push((index, Outcome::Error));
                }
                Ok(Some((index, Ok(Err(fatal))))) => {
                    error!(
                        "Phase {}: oracle failed on {}: {}",
                        self.run.phase, tasks[index].node, fatal
                    );
                    return Err(fatal);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Phase {}: iteration deadline reached, dropping {} outstanding evaluations",
                        self.run.phase,
                        tasks.len() - completed.len()
                    );
                    break;
                }
            }
        }
        self.run.timeouts += timeouts;
        Ok(completed)
    }

    fn apply(&mut self, tree: &mut Tree, node: NodeId, outcome: Outcome) -> Result<(), SearchError> {
        let delta = {
            let (configuration, bounds, metadata) = tree.scoring_target(node)?;
            self.run.strategies.score.score(
                ScoreTarget {
                    configuration,
                    bounds,
                    metadata,
                },
                outcome,
                &self.config.scoring_params,
            )
        };
        tree.backpropagate(node, delta, self.config.search_params.discount_factor)?;
        self.run.evaluations += 1;
        debug!("Phase {}: {} -> {} ({:+.3})", self.run.phase, node, outcome, delta);
        Ok(())
    }

    fn transition(&mut self, to: PhaseState) -> Result<(), SearchError> {
        validate_transition(self.run.state, to)?;
        self.run.state = to;
        Ok(())
    }

    fn fail(&mut self, cause: SearchError) -> SearchError {
        if let Err(e) = self.transition(PhaseState::Failed) {
            error!("Phase {}: {}", self.run.phase, e);
        }
        error!("Phase {} failed: {}", self.run.phase, cause);
        cause
    }
}

/// Mean of `value / visits` over the distinct visited nodes in `nodes`
fn aggregate(tree: &Tree, nodes: impl Iterator<Item = NodeId>) -> Option<f64> {
    let distinct: BTreeSet<NodeId> = nodes.collect();
    let means: Vec<f64> = distinct
        .into_iter()
        .filter_map(|id| tree.get(id).ok().and_then(|n| n.mean_value()))
        .collect();
    (!means.is_empty()).then(|| means.iter().sum::<f64>() / means.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::{UcbDescentSelector, PHASE_1};
    use crate::strategy::{ExpandStrategy, SelectStrategy};
    use async_trait::async_trait;
    use capmap_tree::{Configuration, Difficulty, SpaceBounds};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Always(Result<Outcome, OracleError>);

    #[async_trait]
    impl EvaluationOracle for Always {
        async fn evaluate(
            &self,
            _request: &EvaluationRequest,
            _timeout: Duration,
        ) -> Result<Outcome, OracleError> {
            self.0.clone()
        }
    }

    fn tree() -> Tree {
        let bounds = SpaceBounds::new(["functions", "loops"], [Difficulty::Easy, Difficulty::Medium]);
        Tree::with_root(bounds, Configuration::new(["loops"], Difficulty::Easy)).unwrap()
    }

    fn config() -> PhaseConfig {
        let mut config = PhaseConfig::new(PHASE_1);
        config.phase_params.max_iterations = 4;
        config.phase_params.exploration_probability = 0.0;
        config.environment.seed = Some(11);
        config
    }

    fn engine(config: PhaseConfig, oracle: Always) -> PhaseEngine {
        PhaseEngine::new(config, &StrategyRegistry::with_defaults(), Arc::new(oracle)).unwrap()
    }

    #[tokio::test]
    async fn runs_to_iteration_cap() {
        let mut tree = tree();
        let mut engine = engine(config(), Always(Ok(Outcome::Pass)));
        let outcome = engine.run(&mut tree).await.unwrap();

        assert_eq!(outcome.state, PhaseState::Exhausted);
        assert_eq!(outcome.iterations, 4);
        assert!(outcome.evaluations >= 4);
        assert_eq!(outcome.timeouts, 0);
        assert!(outcome.final_aggregate.unwrap() > 0.0);
        tree.verify_integrity().unwrap();
    }

    #[tokio::test]
    async fn transport_failure_fails_the_phase() {
        let mut tree = tree();
        let mut engine = engine(
            config(),
            Always(Err(OracleError::Transport("connection refused".into()))),
        );
        let err = engine.run(&mut tree).await.unwrap_err();

        assert!(matches!(err, SearchError::OracleTransport(OracleError::Transport(_))));
        assert_eq!(engine.run_state().state, PhaseState::Failed);
        assert_eq!(engine.outcome().iterations, 0);
    }

    #[tokio::test]
    async fn oracle_timeouts_score_as_errors() {
        let mut tree = tree();
        let mut engine = engine(
            config(),
            Always(Err(OracleError::Timeout(Duration::from_secs(1)))),
        );
        let outcome = engine.run(&mut tree).await.unwrap();

        assert_eq!(outcome.timeouts, outcome.evaluations);
        let root = tree.get(tree.root().unwrap()).unwrap();
        assert!(root.value() < 0.0);
    }

    #[derive(Debug)]
    struct CountingSelector(Arc<AtomicUsize>);

    impl SelectStrategy for CountingSelector {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn select(
            &self,
            ctx: &SearchContext<'_>,
            expander: &dyn ExpandStrategy,
            rng: &mut StdRng,
        ) -> Option<NodeId> {
            self.0.fetch_add(1, Ordering::SeqCst);
            UcbDescentSelector.select(ctx, expander, rng)
        }
    }

    #[tokio::test]
    async fn overridden_selector_drives_later_runs() {
        let replaced = Arc::new(AtomicUsize::new(0));
        let latest = Arc::new(AtomicUsize::new(0));
        let mut registry = StrategyRegistry::with_defaults();
        registry.register_select(PHASE_1, CountingSelector(Arc::clone(&replaced)));
        registry.register_select(PHASE_1, CountingSelector(Arc::clone(&latest)));

        let mut engine =
            PhaseEngine::new(config(), &registry, Arc::new(Always(Ok(Outcome::Pass)))).unwrap();
        assert_eq!(engine.run_state().strategies.select.name(), "counting");
        let outcome = engine.run(&mut tree()).await.unwrap();

        assert_eq!(outcome.iterations, 4);
        assert!(latest.load(Ordering::SeqCst) >= 4);
        assert_eq!(replaced.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_phase_is_rejected_up_front() {
        let err = PhaseEngine::new(
            PhaseConfig::new("phase_9"),
            &StrategyRegistry::with_defaults(),
            Arc::new(Always(Ok(Outcome::Pass))),
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::UnknownStrategy { .. }));
    }

    #[test]
    fn aggregate_ignores_unvisited_and_duplicates() {
        let mut tree = tree();
        let root = tree.root().unwrap();
        let child = tree
            .add_child(root, Configuration::new(["loops"], Difficulty::Medium))
            .unwrap();
        assert_eq!(aggregate(&tree, [root, child].into_iter()), None);

        tree.backpropagate(child, 0.4, 0.5).unwrap();
        let value = aggregate(&tree, [child, child, root].into_iter()).unwrap();
        assert!((value - 0.3).abs() < 1e-12);
    }
}
