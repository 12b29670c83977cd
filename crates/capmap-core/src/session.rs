//! YAML session documents
//!
//! A session names the search space, the root configuration and the
//! ordered list of phases to run over it.

use crate::error::CapmapError;
use crate::types::SessionContext;
use capmap_search::{ConfigError, PhaseConfig};
use capmap_tree::{Configuration, Difficulty, SpaceBounds, Tree, TreeError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Root configuration of a new tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootConfig {
    pub concepts: Vec<String>,
    pub difficulty: Difficulty,
}

/// Search space of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub concepts: Vec<String>,
    pub difficulties: Vec<Difficulty>,
    pub root: RootConfig,
}

impl TreeConfig {
    #[must_use]
    pub fn bounds(&self) -> SpaceBounds {
        SpaceBounds::new(self.concepts.iter().cloned(), self.difficulties.iter().copied())
    }

    #[must_use]
    pub fn root_configuration(&self) -> Configuration {
        Configuration::new(self.root.concepts.iter().cloned(), self.root.difficulty)
    }

    /// Fresh tree holding only the root
    ///
    /// # Errors
    /// `OutOfBounds` if the root lies outside the space
    pub fn build(&self) -> Result<Tree, TreeError> {
        Tree::with_root(self.bounds(), self.root_configuration())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concepts.is_empty() {
            return Err(ConfigError::field("tree.concepts", "must not be empty"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.concepts.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(ConfigError::field("tree.concepts", format!("duplicate concept `{dup}`")));
        }
        if self.difficulties.is_empty() {
            return Err(ConfigError::field("tree.difficulties", "must not be empty"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.difficulties.iter().find(|d| !seen.insert(**d)) {
            return Err(ConfigError::field(
                "tree.difficulties",
                format!("duplicate difficulty `{dup}`"),
            ));
        }
        let root = self.root_configuration();
        if !self.bounds().contains(&root) {
            return Err(ConfigError::field("tree.root", format!("{root} lies outside the search space")));
        }
        Ok(())
    }
}

/// A whole session document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_id: String,
    pub tree: TreeConfig,
    pub phases: Vec<PhaseConfig>,
}

impl SessionConfig {
    /// Parse a YAML document
    ///
    /// # Errors
    /// `ConfigParse` for malformed YAML or unknown values
    pub fn from_yaml(text: &str) -> Result<Self, CapmapError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a YAML file
    ///
    /// # Errors
    /// `Io` or `ConfigParse`
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CapmapError> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&text)
    }

    /// Render back to YAML
    ///
    /// # Errors
    /// Propagates serializer failures
    pub fn to_yaml(&self) -> Result<String, CapmapError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check the tree section and every phase
    ///
    /// # Errors
    /// The first invalid field, prefixed with the phase index
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_id.trim().is_empty() {
            return Err(ConfigError::field("session_id", "must not be empty"));
        }
        self.tree.validate()?;
        if self.phases.is_empty() {
            return Err(ConfigError::field("phases", "at least one phase is required"));
        }
        let mut names = HashSet::new();
        for (index, phase) in self.phases.iter().enumerate() {
            if !names.insert(phase.name.as_str()) {
                return Err(ConfigError::field(
                    format!("phases[{index}].name"),
                    format!("phase `{}` is configured more than once", phase.name),
                ));
            }
            phase.validate().map_err(|e| match e {
                ConfigError::InvalidField { field, reason } => {
                    ConfigError::field(format!("phases[{index}].{field}"), reason)
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Phase names in run order
    #[must_use]
    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    #[must_use]
    pub fn context(&self) -> SessionContext {
        SessionContext::new(self.session_id.clone(), self.phases.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DOC: &str = r"
session_id: demo
tree:
  concepts: [loops, functions]
  difficulties: [easy, medium]
  root: { concepts: [loops], difficulty: easy }
phases:
  - name: phase_1
    phase_params: { max_iterations: 10, exploration_probability: 0.0, task_timeout: 30.0 }
    environment: { timeout: 300, max_concurrent_tasks: 4, seed: 7 }
  - name: phase_2
    carry_over: { filter: { min_mean_value: 0.0 } }
";

    #[test]
    fn parses_and_validates() {
        let config = SessionConfig::from_yaml(DOC).unwrap();
        config.validate().unwrap();
        assert_eq!(config.phase_names(), vec!["phase_1", "phase_2"]);
        assert_eq!(config.phases[0].phase_params.task_timeout, Duration::from_secs(30));
        assert_eq!(config.phases[0].environment.seed, Some(7));

        let tree = config.tree.build().unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn root_outside_space_is_rejected() {
        let mut config = SessionConfig::from_yaml(DOC).unwrap();
        config.tree.root.concepts.push("graphs".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tree.root"));
    }

    #[test]
    fn phase_errors_name_their_index() {
        let mut config = SessionConfig::from_yaml(DOC).unwrap();
        config.phases[1].phase_params.convergence_checks = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("phases[1].phase_params.convergence_checks"));
    }

    #[test]
    fn repeated_phase_names_are_rejected() {
        let mut config = SessionConfig::from_yaml(DOC).unwrap();
        let mut again = config.phases[0].clone();
        again.phase_params.max_iterations = 7;
        config.phases.push(again);

        let err = config.validate().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("phases[2].name"), "{text}");
        assert!(text.contains("phase_1"), "{text}");
    }

    #[test]
    fn duplicate_concepts_are_rejected() {
        let mut config = SessionConfig::from_yaml(DOC).unwrap();
        config.tree.concepts.push("loops".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_difficulty_fails_to_parse() {
        let doc = DOC.replace("[easy, medium]", "[easy, impossible]");
        assert!(SessionConfig::from_yaml(&doc).is_err());
    }

    #[test]
    fn yaml_round_trip_keeps_phases() {
        let config = SessionConfig::from_yaml(DOC).unwrap();
        let again = SessionConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(again, config);
    }
}
