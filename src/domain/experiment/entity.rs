//! Experiment domain entity

use serde::{Deserialize, Serialize};
use std::fmt;

use super::algorithm::Algorithm;
use super::alternative::Alternative;
use super::declaration::NormalizedExperiment;
use super::validation::{
    validate_alternatives, validate_experiment_name, validate_goals, KEY_SEPARATOR,
};
use crate::domain::DomainError;

/// Suffix appended to an experiment key to mark a visitor as finished
pub const FINISHED_SUFFIX: &str = "finished";

/// A named decision point with ordered alternatives
///
/// The first alternative is the control. `version` namespaces visitor keys:
/// bumping it orphans every assignment made under the previous shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    name: String,
    alternatives: Vec<Alternative>,
    #[serde(default)]
    goals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metric: Option<String>,
    resettable: bool,
    #[serde(default)]
    algorithm: Algorithm,
    #[serde(default)]
    version: u64,
}

impl Experiment {
    /// Create a resettable experiment with the default algorithm
    pub fn new(
        name: impl Into<String>,
        alternatives: Vec<Alternative>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        validate_experiment_name(&name)?;

        Ok(Self {
            name,
            alternatives,
            goals: Vec::new(),
            metric: None,
            resettable: true,
            algorithm: Algorithm::default(),
            version: 0,
        })
    }

    /// Build an experiment from a normalized declaration
    pub fn from_normalized(
        name: impl Into<String>,
        normalized: &NormalizedExperiment,
        default_algorithm: Algorithm,
    ) -> Result<Self, DomainError> {
        let mut experiment = Self::new(name, normalized.alternatives.clone())?
            .with_goals(normalized.goals.clone())
            .with_resettable(normalized.resettable)
            .with_algorithm(normalized.algorithm.unwrap_or(default_algorithm));
        experiment.metric = normalized.metric.clone();
        Ok(experiment)
    }

    // Builder methods

    pub fn with_goals(mut self, goals: Vec<String>) -> Self {
        self.goals = goals;
        self
    }

    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    pub fn with_resettable(mut self, resettable: bool) -> Self {
        self.resettable = resettable;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    // Getters

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    pub fn goals(&self) -> &[String] {
        &self.goals
    }

    pub fn metric(&self) -> Option<&str> {
        self.metric.as_deref()
    }

    pub fn is_resettable(&self) -> bool {
        self.resettable
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The control (first) alternative
    pub fn control(&self) -> Option<&Alternative> {
        self.alternatives.first()
    }

    /// Look up an alternative by name
    pub fn alternative(&self, name: &str) -> Option<&Alternative> {
        self.alternatives.iter().find(|a| a.name() == name)
    }

    /// Alternative names in order
    pub fn alternative_names(&self) -> Vec<&str> {
        self.alternatives.iter().map(|a| a.name()).collect()
    }

    /// Participants across all alternatives
    pub fn participant_count(&self) -> i64 {
        self.alternatives.iter().map(|a| a.participant_count()).sum()
    }

    /// Visitor key: `name` at version 0, `name:version` afterwards
    pub fn key(&self) -> String {
        if self.version > 0 {
            format!("{}{}{}", self.name, KEY_SEPARATOR, self.version)
        } else {
            self.name.clone()
        }
    }

    /// Visitor key marking the experiment as finished
    pub fn finished_key(&self) -> String {
        format!("{}{}{}", self.key(), KEY_SEPARATOR, FINISHED_SUFFIX)
    }

    /// Whether a previously persisted shape has the same alternatives and goals
    pub fn has_same_shape(&self, alternative_names: &[&str], goals: &[String]) -> bool {
        self.alternative_names() == alternative_names && self.goals == goals
    }

    // Mutators

    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Replace alternatives, typically with a fresh counter snapshot
    pub fn set_alternatives(&mut self, alternatives: Vec<Alternative>) {
        self.alternatives = alternatives;
    }

    /// Check alternatives and goals
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_alternatives(&self.alternatives)?;
        validate_goals(&self.goals)
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
