//! Runs ordered phase sequences over one session's tree
//!
//! Every named phase is validated and its strategies resolved before the
//! first one starts, so configuration mistakes never surface mid-run. Before
//! each phase the tree's phase counters are cleared and the phase's
//! carry-over policy applied; after each phase the tree is saved and the
//! phase recorded in the session history. A failed phase stops the sequence.

use crate::error::{CapmapError, SequenceError};
use crate::session::SessionConfig;
use crate::store::SessionStore;
use crate::types::{PhaseRecord, PhaseResult, SessionContext};
use capmap_search::{
    registry, CarryOver, ConfigError, EvaluationOracle, PhaseConfig, PhaseEngine, PhaseOutcome,
    StrategyRegistry, StrategySet,
};
use capmap_tree::Tree;
use std::sync::Arc;

/// Phase sequence runner bound to one oracle and one store
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<StrategyRegistry>,
    oracle: Arc<dyn EvaluationOracle>,
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phases", &self.registry.phases())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator using the process-wide strategy registry
    #[must_use]
    pub fn new(oracle: Arc<dyn EvaluationOracle>, store: Arc<dyn SessionStore>) -> Self {
        Self::with_registry(registry::global(), oracle, store)
    }

    #[must_use]
    pub fn with_registry(
        registry: Arc<StrategyRegistry>,
        oracle: Arc<dyn EvaluationOracle>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            registry,
            oracle,
            store,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Validate configs and resolve strategies for every named phase
    fn prepare(
        &self,
        phase_names: &[&str],
        context: &SessionContext,
    ) -> Result<Vec<(PhaseConfig, StrategySet)>, CapmapError> {
        phase_names
            .iter()
            .map(|name| -> Result<(PhaseConfig, StrategySet), CapmapError> {
                let config = context
                    .phase(name)
                    .ok_or_else(|| ConfigError::MissingPhase((*name).to_string()))?;
                config.validate()?;
                let strategies = self.registry.resolve(name)?;
                Ok((config.clone(), strategies))
            })
            .collect()
    }

    /// Run `phase_names` in order over `tree`
    ///
    /// # Errors
    /// `SequenceError` carrying every result produced so far (a failed phase
    /// included) and the cause
    pub async fn run_phase_sequence(
        &self,
        tree: Tree,
        phase_names: &[&str],
        context: &SessionContext,
    ) -> Result<Vec<PhaseResult>, SequenceError> {
        let prepared = self
            .prepare(phase_names, context)
            .map_err(|e| SequenceError::new(Vec::new(), e))?;
        tracing::info!(
            "Session {}: running {} phase(s): {}",
            context.session_id,
            prepared.len(),
            phase_names.join(" -> ")
        );

        let mut tree = tree;
        let mut results = Vec::with_capacity(prepared.len());
        for (config, strategies) in prepared {
            tree.reset_phase_metadata();
            if let CarryOver::Filter { min_mean_value } = config.carry_over {
                let before = tree.len();
                tree = tree.filtered(min_mean_value);
                tracing::info!(
                    "Session {}: carry-over kept {} of {} nodes for {}",
                    context.session_id,
                    tree.len(),
                    before,
                    config.name
                );
            }

            let mut engine = PhaseEngine::with_strategies(config, strategies, Arc::clone(&self.oracle));
            let run = engine.run(&mut tree).await;
            let outcome = engine.outcome();
            results.push(PhaseResult::new(&outcome, Arc::new(tree.clone())));

            let persisted = self.persist(&context.session_id, &tree, outcome).await;
            match (run, persisted) {
                (Err(e), _) => return Err(SequenceError::new(results, e)),
                (Ok(_), Err(e)) => return Err(SequenceError::new(results, e)),
                (Ok(_), Ok(())) => {}
            }
        }

        tracing::info!("Session {}: sequence completed", context.session_id);
        Ok(results)
    }

    async fn persist(
        &self,
        session_id: &str,
        tree: &Tree,
        outcome: PhaseOutcome,
    ) -> Result<(), CapmapError> {
        self.store.save(session_id, tree).await?;
        self.store
            .append_history(session_id, PhaseRecord::new(outcome, tree.len()))
            .await?;
        Ok(())
    }

    /// Run every phase of a session document
    ///
    /// Resumes the stored tree of `session_id` when one exists, otherwise
    /// starts from the configured root.
    ///
    /// # Errors
    /// `SequenceError`; configuration and store failures carry no results
    pub async fn run_session(&self, config: &SessionConfig) -> Result<Vec<PhaseResult>, SequenceError> {
        let tree = self
            .initial_tree(config)
            .await
            .map_err(|e| SequenceError::new(Vec::new(), e))?;
        self.run_phase_sequence(tree, &config.phase_names(), &config.context())
            .await
    }

    async fn initial_tree(&self, config: &SessionConfig) -> Result<Tree, CapmapError> {
        config.validate()?;
        match self.store.load(&config.session_id).await? {
            Some(tree) => {
                tracing::info!(
                    "Session {}: resuming stored tree with {} nodes",
                    config.session_id,
                    tree.len()
                );
                Ok(tree)
            }
            None => Ok(config.tree.build()?),
        }
    }
}
