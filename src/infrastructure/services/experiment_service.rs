//! Experiment service for A/B testing
//!
//! Builds experiments from caller alternatives or the registry, keeps their
//! persisted shape in sync, and picks alternatives.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::experiment::{
    normalize_alternatives, parse_goals, validate_experiment_name, Alternative, DeclaredAlternative,
    Experiment, RandomSource, ThreadRandom,
};
use crate::domain::DomainError;
use crate::infrastructure::experiment::StoreExperimentRepository;

use super::registry::Registry;

/// Service for managing experiments and their counters
#[derive(Debug, Clone)]
pub struct ExperimentService {
    registry: Arc<Registry>,
    random: Arc<dyn RandomSource>,
}

impl ExperimentService {
    /// Create a new experiment service drawing from the thread RNG
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            random: Arc::new(ThreadRandom),
        }
    }

    /// Replace the random source used for draws
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn repository(&self) -> &StoreExperimentRepository {
        self.registry.repository()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Build an experiment
    ///
    /// With no alternatives the registry's declared (or persisted) shape is
    /// used, including its goals, metric, resettability and algorithm.
    pub async fn build(
        &self,
        name: &str,
        alternatives: &[DeclaredAlternative],
        goals: &[String],
    ) -> Result<Experiment, DomainError> {
        validate_experiment_name(name)?;

        let mut experiment = if alternatives.is_empty() {
            let shape = self
                .registry
                .experiment_for(name)
                .await?
                .ok_or_else(|| DomainError::experiment_not_found(name))?;

            let experiment =
                Experiment::from_normalized(name, &shape, self.registry.settings().algorithm)?;

            // Declared goals win; without any the caller's goals are kept
            if shape.goals.is_empty() && !goals.is_empty() {
                experiment.with_goals(goals.to_vec())
            } else {
                experiment
            }
        } else {
            Experiment::new(name, normalize_alternatives(alternatives)?)?
                .with_goals(goals.to_vec())
                .with_algorithm(self.registry.settings().algorithm)
        };

        experiment.set_version(self.registry.experiment_version(name)?);
        Ok(experiment)
    }

    /// Build an experiment from raw alternatives and goals declarations
    pub async fn create(
        &self,
        name: &str,
        alternatives: &Value,
        goals: &Value,
    ) -> Result<Experiment, DomainError> {
        let alternatives = match alternatives {
            Value::Null => Vec::new(),
            value => DeclaredAlternative::list_from_value(value)?,
        };
        let goals = match goals {
            Value::Null => Vec::new(),
            value => parse_goals(value)?,
        };

        self.build(name, &alternatives, &goals).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Load a persisted experiment with its counters
    pub async fn find(&self, name: &str) -> Result<Option<Experiment>, DomainError> {
        let Some(shape) = self.repository().load_shape(name).await? else {
            return Ok(None);
        };

        let mut experiment =
            Experiment::from_normalized(name, &shape, self.registry.settings().algorithm)?;
        self.load_counters(&mut experiment).await?;
        experiment.set_version(self.repository().version(name).await?);

        Ok(Some(experiment))
    }

    /// Names of every persisted experiment, sorted
    pub async fn names(&self) -> Result<Vec<String>, DomainError> {
        let mut names = self.repository().names().await?;
        names.sort();
        Ok(names)
    }

    /// Every persisted experiment with its counters
    pub async fn all(&self) -> Result<Vec<Experiment>, DomainError> {
        let mut experiments = Vec::new();

        for name in self.names().await? {
            if let Some(experiment) = self.find(&name).await? {
                experiments.push(experiment);
            }
        }

        Ok(experiments)
    }

    pub async fn start_time(&self, name: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
        self.repository().start_time(name).await
    }

    /// Refresh the counter snapshot of every alternative
    pub async fn load_counters(&self, experiment: &mut Experiment) -> Result<(), DomainError> {
        let alternatives = self
            .repository()
            .load_counters(experiment.name(), experiment.alternatives())
            .await?;
        experiment.set_alternatives(alternatives);
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Persist the experiment shape
    ///
    /// A missing record is persisted fresh. A record whose alternative names
    /// or goals differ is replaced and the version bumped, which also drops
    /// its counters and winner. An identical record is left alone.
    pub async fn save(&self, experiment: &mut Experiment) -> Result<(), DomainError> {
        experiment.validate()?;

        let name = experiment.name().to_string();

        match self.registry.persisted_shape(&name).await? {
            None => {
                self.repository().persist(experiment).await?;
                self.registry.uncache(&name)?;
                info!(experiment = %name, "Persisted new experiment");
            }
            Some(prior) if experiment.has_same_shape(&prior.alternative_names(), &prior.goals) => {
                debug!(experiment = %name, "Experiment unchanged");
            }
            Some(_) => {
                self.registry.remove_winner(&name).await?;
                self.repository().unpersist(&name).await?;
                self.repository().persist(experiment).await?;
                self.registry.uncache(&name)?;
                self.registry.increment_experiment_version(&name).await?;
                info!(experiment = %name, "Experiment shape changed");
            }
        }

        experiment.set_version(self.registry.experiment_version(&name)?);
        Ok(())
    }

    /// Remove the experiment, its counters and its winner
    pub async fn delete(&self, experiment: &mut Experiment) -> Result<(), DomainError> {
        let name = experiment.name().to_string();

        self.registry.remove_winner(&name).await?;
        self.repository().remove(&name).await?;
        self.registry.uncache(&name)?;

        let version = self.registry.increment_experiment_version(&name).await?;
        experiment.set_version(version);

        info!(experiment = %name, "Experiment deleted");
        Ok(())
    }

    /// Zero all counters and clear the winner
    pub async fn reset(&self, experiment: &mut Experiment) -> Result<(), DomainError> {
        let name = experiment.name().to_string();

        for alternative in experiment.alternatives() {
            self.repository()
                .reset_counters(&name, alternative.name())
                .await?;
        }

        self.registry.remove_winner(&name).await?;

        let version = self.registry.increment_experiment_version(&name).await?;
        experiment.set_version(version);
        experiment.set_alternatives(
            experiment
                .alternatives()
                .iter()
                .map(|a| Alternative::new(a.name(), a.weight()))
                .collect(),
        );

        info!(experiment = %name, version = version, "Experiment reset");
        Ok(())
    }

    // ========================================================================
    // Winner
    // ========================================================================

    /// Winning alternative, if one was declared
    pub fn winner(&self, experiment: &Experiment) -> Result<Option<Alternative>, DomainError> {
        Ok(self.registry.winner(experiment.name())?.map(|winner| {
            experiment
                .alternative(&winner)
                .cloned()
                .unwrap_or_else(|| Alternative::new(winner, 1.0))
        }))
    }

    /// Declare a winner among the experiment's alternatives
    pub async fn set_winner(
        &self,
        experiment: &mut Experiment,
        alternative: &str,
    ) -> Result<(), DomainError> {
        if experiment.alternative(alternative).is_none() {
            return Err(DomainError::invalid_alternative(format!(
                "'{}' is not an alternative of experiment '{}'",
                alternative,
                experiment.name()
            )));
        }

        let version = self
            .registry
            .set_winner(experiment.name(), alternative)
            .await?;
        experiment.set_version(version);
        Ok(())
    }

    pub async fn clear_winner(&self, experiment: &mut Experiment) -> Result<(), DomainError> {
        let version = self.registry.reset_winner(experiment.name()).await?;
        experiment.set_version(version);
        Ok(())
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// The winner when set, otherwise a draw
    pub async fn next_alternative(&self, experiment: &Experiment) -> Result<Alternative, DomainError> {
        match self.winner(experiment)? {
            Some(winner) => Ok(winner),
            None => self.random_alternative(experiment).await,
        }
    }

    /// Draw an alternative with the experiment's algorithm
    ///
    /// A single alternative is returned without consulting the random source.
    pub async fn random_alternative(
        &self,
        experiment: &Experiment,
    ) -> Result<Alternative, DomainError> {
        if let [only] = experiment.alternatives() {
            return Ok(only.clone());
        }

        let mut candidates = experiment.clone();
        if candidates.algorithm().needs_counters() {
            self.load_counters(&mut candidates).await?;
        }

        candidates
            .algorithm()
            .choose(candidates.alternatives(), self.random.as_ref())
            .cloned()
            .ok_or_else(|| {
                DomainError::invalid_alternative(format!(
                    "Experiment '{}' has no alternatives",
                    experiment.name()
                ))
            })
    }

    // ========================================================================
    // Counters
    // ========================================================================

    pub async fn increment_participation(
        &self,
        experiment: &Experiment,
        alternative: &str,
    ) -> Result<i64, DomainError> {
        self.repository()
            .increment_participation(experiment.name(), alternative)
            .await
    }

    pub async fn increment_completion(
        &self,
        experiment: &Experiment,
        alternative: &str,
        goal: Option<&str>,
    ) -> Result<i64, DomainError> {
        self.repository()
            .increment_completion(experiment.name(), alternative, goal)
            .await
    }
}
