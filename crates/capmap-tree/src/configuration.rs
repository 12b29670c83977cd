//! Configuration space types
//!
//! A [`Configuration`] is the unit the search allocates trials to: a set of
//! concept identifiers paired with a [`Difficulty`] level.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Difficulty levels, in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Warm-up level
    #[serde(alias = "very easy")]
    VeryEasy,
    /// Easy
    Easy,
    /// Medium
    Medium,
    /// Hard
    Hard,
    /// Hardest level
    #[serde(alias = "very hard")]
    VeryHard,
}

impl Difficulty {
    /// Every level in ascending order
    pub const ALL: [Difficulty; 5] = [
        Difficulty::VeryEasy,
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::VeryHard,
    ];

    /// Canonical label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::VeryEasy => "very_easy",
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::VeryHard => "very_hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown difficulty label
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown difficulty level: {0}")]
pub struct ParseDifficultyError(pub String);

impl FromStr for Difficulty {
    type Err = ParseDifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(|c: char| c == ' ' || c == '-', "_");
        Difficulty::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| ParseDifficultyError(s.to_string()))
    }
}

/// A point in the search space
///
/// Two configurations are equal iff their concept sets and difficulty are
/// equal; concept order never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Configuration {
    concepts: BTreeSet<String>,
    difficulty: Difficulty,
}

impl Configuration {
    /// Create a configuration from any collection of concept names
    pub fn new<I, S>(concepts: I, difficulty: Difficulty) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            concepts: concepts.into_iter().map(Into::into).collect(),
            difficulty,
        }
    }

    /// Concept set
    #[inline]
    #[must_use]
    pub fn concepts(&self) -> &BTreeSet<String> {
        &self.concepts
    }

    /// Difficulty level
    #[inline]
    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Whether `concept` is part of this configuration
    #[inline]
    #[must_use]
    pub fn contains_concept(&self, concept: &str) -> bool {
        self.concepts.contains(concept)
    }

    /// Same difficulty, one more concept
    #[must_use]
    pub fn with_concept(&self, concept: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.concepts.insert(concept.into());
        next
    }

    /// Same concepts, different difficulty
    #[must_use]
    pub fn with_difficulty(&self, difficulty: Difficulty) -> Self {
        Self {
            concepts: self.concepts.clone(),
            difficulty,
        }
    }

    /// Jaccard overlap of the two concept sets (1.0 for two empty sets)
    #[must_use]
    pub fn concept_overlap(&self, other: &Configuration) -> f64 {
        let union = self.concepts.union(&other.concepts).count();
        if union == 0 {
            return 1.0;
        }
        let shared = self.concepts.intersection(&other.concepts).count();
        shared as f64 / union as f64
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let concepts: Vec<&str> = self.concepts.iter().map(String::as_str).collect();
        write!(f, "{{{}}} @ {}", concepts.join(", "), self.difficulty)
    }
}

/// Allowed concepts and difficulty levels of one tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceBounds {
    concepts: BTreeSet<String>,
    difficulties: Vec<Difficulty>,
}

impl SpaceBounds {
    /// Create bounds; difficulties are sorted and deduplicated
    pub fn new<I, S, D>(concepts: I, difficulties: D) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        D: IntoIterator<Item = Difficulty>,
    {
        let mut difficulties: Vec<Difficulty> = difficulties.into_iter().collect();
        difficulties.sort_unstable();
        difficulties.dedup();
        Self {
            concepts: concepts.into_iter().map(Into::into).collect(),
            difficulties,
        }
    }

    /// Allowed concepts
    #[inline]
    #[must_use]
    pub fn concepts(&self) -> &BTreeSet<String> {
        &self.concepts
    }

    /// Allowed difficulties, ascending
    #[inline]
    #[must_use]
    pub fn difficulties(&self) -> &[Difficulty] {
        &self.difficulties
    }

    /// Whether the configuration only uses allowed concepts and difficulty
    #[must_use]
    pub fn contains(&self, configuration: &Configuration) -> bool {
        self.difficulties.contains(&configuration.difficulty)
            && configuration.concepts.is_subset(&self.concepts)
    }

    /// Position of `difficulty` among the allowed levels
    #[must_use]
    pub fn difficulty_rank(&self, difficulty: Difficulty) -> Option<usize> {
        self.difficulties.iter().position(|d| *d == difficulty)
    }

    /// Next allowed level above `difficulty`
    #[must_use]
    pub fn next_difficulty(&self, difficulty: Difficulty) -> Option<Difficulty> {
        self.difficulties.iter().copied().find(|d| *d > difficulty)
    }

    /// Allowed concepts not yet in `configuration`, in lexical order
    pub fn missing_concepts<'a>(
        &'a self,
        configuration: &'a Configuration,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.concepts
            .iter()
            .filter(move |c| !configuration.contains_concept(c))
            .map(String::as_str)
    }
}
