//! Trial: one choose-or-complete transaction for a visitor

use super::alternative::Alternative;
use super::entity::Experiment;

/// One assignment or completion of a visitor against an experiment
///
/// Not persisted on its own; hooks receive it after a choice or completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    experiment: Experiment,
    alternative: Option<Alternative>,
    goals: Vec<String>,
}

impl Trial {
    pub fn new(experiment: Experiment) -> Self {
        Self {
            experiment,
            alternative: None,
            goals: Vec::new(),
        }
    }

    /// Pre-select an alternative by name
    ///
    /// Names unknown to the experiment leave the trial unselected.
    pub fn with_alternative(mut self, name: &str) -> Self {
        self.alternative = self.experiment.alternative(name).cloned();
        self
    }

    pub fn with_goals(mut self, goals: Vec<String>) -> Self {
        self.goals = goals;
        self
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn alternative(&self) -> Option<&Alternative> {
        self.alternative.as_ref()
    }

    pub fn alternative_name(&self) -> Option<&str> {
        self.alternative.as_ref().map(|a| a.name())
    }

    pub fn goals(&self) -> &[String] {
        &self.goals
    }

    pub fn select(&mut self, alternative: Alternative) {
        self.alternative = Some(alternative);
    }
}
