//! Alternative value type

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One variant (arm) of an experiment
///
/// Counters are a snapshot of the shared store at load time; the live values
/// are only ever changed through atomic store increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    name: String,
    weight: f64,
    #[serde(default)]
    participant_count: i64,
    #[serde(default)]
    completed_count: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    goal_completions: BTreeMap<String, i64>,
}

impl Alternative {
    /// Create an alternative with zeroed counters
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            participant_count: 0,
            completed_count: 0,
            goal_completions: BTreeMap::new(),
        }
    }

    /// Set the counter snapshot
    pub fn with_counts(
        mut self,
        participant_count: i64,
        completed_count: i64,
        goal_completions: BTreeMap<String, i64>,
    ) -> Self {
        self.participant_count = participant_count;
        self.completed_count = completed_count;
        self.goal_completions = goal_completions;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn participant_count(&self) -> i64 {
        self.participant_count
    }

    /// Completions for a goal, or for the default bucket when `goal` is `None`
    pub fn completed_count(&self, goal: Option<&str>) -> i64 {
        match goal {
            Some(goal) => self.goal_completions.get(goal).copied().unwrap_or(0),
            None => self.completed_count,
        }
    }

    /// Completions recorded against named goals
    pub fn goal_completions(&self) -> &BTreeMap<String, i64> {
        &self.goal_completions
    }

    /// Completions across the default bucket and every goal
    pub fn total_completed_count(&self) -> i64 {
        self.completed_count + self.goal_completions.values().sum::<i64>()
    }

    /// Fraction of participants that completed the default goal
    pub fn conversion_rate(&self, goal: Option<&str>) -> f64 {
        if self.participant_count == 0 {
            return 0.0;
        }
        self.completed_count(goal) as f64 / self.participant_count as f64
    }
}
