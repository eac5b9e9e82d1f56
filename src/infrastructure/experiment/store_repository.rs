//! Backing-store persistence for experiments
//!
//! Owns the key layout shared by every worker process. Nothing here caches;
//! the configuration registry decides when to hit the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::domain::experiment::{
    Algorithm, Alternative, Experiment, NormalizedExperiment, WEIGHT_TOLERANCE,
};
use crate::domain::store::{SplitStore, StoreExt};
use crate::domain::DomainError;

/// Backing-store key layout
pub mod keys {
    use crate::domain::experiment::{GOALS_SUFFIX, METRIC_SUFFIX};

    /// Set of known experiment names
    pub const EXPERIMENTS: &str = "experiments";
    /// Hash of experiment name to the time its current shape was persisted
    pub const START_TIMES: &str = "experiment_start_times";
    /// Hash of experiment name to winning alternative
    pub const WINNERS: &str = "experiment_winner";
    /// Hash of experiment name to version
    pub const VERSIONS: &str = "versions";
    /// Global configuration version counter
    pub const CONFIG_VERSION: &str = "config_version";

    pub const PARTICIPANT_COUNT: &str = "participant_count";
    pub const COMPLETED_COUNT: &str = "completed_count";
    pub const WEIGHT: &str = "weight";
    pub const RESETTABLE: &str = "resettable";
    pub const ALGORITHM: &str = "algorithm";

    /// Ordered list of alternative names
    pub fn alternatives(experiment: &str) -> String {
        experiment.to_string()
    }

    /// Counter hash of one alternative
    pub fn alternative(experiment: &str, alternative: &str) -> String {
        format!("{}:{}", experiment, alternative)
    }

    pub fn goals(experiment: &str) -> String {
        alternative(experiment, GOALS_SUFFIX)
    }

    pub fn metric(experiment: &str) -> String {
        alternative(experiment, METRIC_SUFFIX)
    }

    pub fn config(experiment: &str) -> String {
        format!("experiment_configurations/{}", experiment)
    }

    /// Hash field counting completions of a goal
    pub fn goal_field(goal: &str) -> String {
        format!("{}:{}", COMPLETED_COUNT, goal)
    }
}

/// Experiment persistence on top of a [`SplitStore`]
#[derive(Debug, Clone)]
pub struct StoreExperimentRepository {
    store: Arc<dyn SplitStore>,
}

impl StoreExperimentRepository {
    pub fn new(store: Arc<dyn SplitStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SplitStore> {
        &self.store
    }

    // ========================================================================
    // Shape
    // ========================================================================

    /// Whether an experiment has a persisted alternatives list
    pub async fn exists(&self, name: &str) -> Result<bool, DomainError> {
        self.store.exists(&keys::alternatives(name)).await
    }

    /// Names of every known experiment
    pub async fn names(&self) -> Result<Vec<String>, DomainError> {
        self.store.set_members(keys::EXPERIMENTS).await
    }

    /// Load the persisted shape of an experiment, without counters
    pub async fn load_shape(&self, name: &str) -> Result<Option<NormalizedExperiment>, DomainError> {
        let names = self.store.list_range(&keys::alternatives(name)).await?;

        if names.is_empty() {
            return Ok(None);
        }

        let mut weights = Vec::with_capacity(names.len());

        for alternative in &names {
            let weight = self
                .store
                .hash_get(&keys::alternative(name, alternative), keys::WEIGHT)
                .await?
                .and_then(|w| w.parse::<f64>().ok());
            weights.push(weight);
        }

        let goals = self.store.list_range(&keys::goals(name)).await?;
        let metric = self
            .store
            .get(&keys::metric(name))
            .await?
            .filter(|m| !m.is_empty());
        let config = self.store.hash_get_all(&keys::config(name)).await?;

        let resettable = config
            .get(keys::RESETTABLE)
            .map(|r| r == "true")
            .unwrap_or(true);
        let algorithm = config
            .get(keys::ALGORITHM)
            .and_then(|a| a.parse::<Algorithm>().ok());

        Ok(Some(NormalizedExperiment {
            alternatives: restore_weights(&names, &weights),
            goals,
            metric,
            resettable,
            algorithm,
        }))
    }

    /// Write a fresh shape for an experiment
    pub async fn persist(&self, experiment: &Experiment) -> Result<(), DomainError> {
        let name = experiment.name();

        self.store.set_add(keys::EXPERIMENTS, name).await?;

        self.store
            .hash_set(keys::START_TIMES, name, &Utc::now().timestamp().to_string())
            .await?;

        // Lists are appended to, so a concurrent persist must not double them
        self.store.delete(&keys::alternatives(name)).await?;
        self.store.delete(&keys::goals(name)).await?;

        for alternative in experiment.alternatives() {
            self.store
                .list_push(&keys::alternatives(name), alternative.name())
                .await?;
            self.store
                .hash_set(
                    &keys::alternative(name, alternative.name()),
                    keys::WEIGHT,
                    &alternative.weight().to_string(),
                )
                .await?;
        }

        for goal in experiment.goals() {
            self.store.list_push(&keys::goals(name), goal).await?;
        }

        match experiment.metric() {
            Some(metric) => self.store.set(&keys::metric(name), metric).await?,
            None => {
                self.store.delete(&keys::metric(name)).await?;
            }
        }

        let config_key = keys::config(name);
        self.store
            .hash_set(
                &config_key,
                keys::RESETTABLE,
                &experiment.is_resettable().to_string(),
            )
            .await?;
        self.store
            .hash_set(&config_key, keys::ALGORITHM, experiment.algorithm().as_str())
            .await?;

        debug!(experiment = %name, "Persisted experiment shape");
        Ok(())
    }

    /// Remove the alternatives list and every alternative's counters
    pub async fn delete_alternatives(&self, name: &str) -> Result<(), DomainError> {
        for alternative in self.store.list_range(&keys::alternatives(name)).await? {
            self.store
                .delete(&keys::alternative(name, &alternative))
                .await?;
        }

        self.store.delete(&keys::alternatives(name)).await?;
        Ok(())
    }

    pub async fn delete_goals(&self, name: &str) -> Result<(), DomainError> {
        self.store.delete(&keys::goals(name)).await?;
        Ok(())
    }

    /// Remove the persisted shape but keep the experiment registered
    pub async fn unpersist(&self, name: &str) -> Result<(), DomainError> {
        self.delete_goals(name).await?;
        self.delete_alternatives(name).await?;
        self.store.delete(&keys::metric(name)).await?;
        self.store.delete(&keys::config(name)).await?;
        Ok(())
    }

    /// Forget an experiment entirely
    pub async fn remove(&self, name: &str) -> Result<(), DomainError> {
        self.store.set_remove(keys::EXPERIMENTS, name).await?;
        self.store.hash_delete(keys::START_TIMES, name).await?;
        self.unpersist(name).await
    }

    /// When the current shape was persisted
    pub async fn start_time(&self, name: &str) -> Result<Option<DateTime<Utc>>, DomainError> {
        let raw = self.store.hash_get(keys::START_TIMES, name).await?;

        Ok(raw.and_then(|t| match t.parse::<i64>() {
            Ok(seconds) => Utc.timestamp_opt(seconds, 0).single(),
            Err(_) => DateTime::parse_from_rfc3339(&t)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
        }))
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Record one more participant for an alternative
    pub async fn increment_participation(
        &self,
        name: &str,
        alternative: &str,
    ) -> Result<i64, DomainError> {
        self.store
            .hash_increment(
                &keys::alternative(name, alternative),
                keys::PARTICIPANT_COUNT,
                1,
            )
            .await
    }

    /// Record one completion of a goal (or the default bucket)
    pub async fn increment_completion(
        &self,
        name: &str,
        alternative: &str,
        goal: Option<&str>,
    ) -> Result<i64, DomainError> {
        let field = match goal {
            Some(goal) => keys::goal_field(goal),
            None => keys::COMPLETED_COUNT.to_string(),
        };

        self.store
            .hash_increment(&keys::alternative(name, alternative), &field, 1)
            .await
    }

    /// Zero every counter of an alternative, keeping its weight
    pub async fn reset_counters(&self, name: &str, alternative: &str) -> Result<(), DomainError> {
        let key = keys::alternative(name, alternative);

        for field in self.store.hash_get_all(&key).await?.into_keys() {
            if field == keys::PARTICIPANT_COUNT || field.starts_with(keys::COMPLETED_COUNT) {
                self.store.hash_delete(&key, &field).await?;
            }
        }

        Ok(())
    }

    /// Fill in the counter snapshot of each alternative
    pub async fn load_counters(
        &self,
        name: &str,
        alternatives: &[Alternative],
    ) -> Result<Vec<Alternative>, DomainError> {
        let mut loaded = Vec::with_capacity(alternatives.len());

        for alternative in alternatives {
            let fields = self
                .store
                .hash_get_all(&keys::alternative(name, alternative.name()))
                .await?;

            let counter = |field: &str| {
                fields
                    .get(field)
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0)
            };

            let mut goal_completions = BTreeMap::new();
            let goal_prefix = format!("{}:", keys::COMPLETED_COUNT);

            for (field, value) in &fields {
                if let Some(goal) = field.strip_prefix(&goal_prefix) {
                    goal_completions.insert(goal.to_string(), value.parse().unwrap_or(0));
                }
            }

            loaded.push(alternative.clone().with_counts(
                counter(keys::PARTICIPANT_COUNT),
                counter(keys::COMPLETED_COUNT),
                goal_completions,
            ));
        }

        Ok(loaded)
    }

    // ========================================================================
    // Versions and winners
    // ========================================================================

    /// Current value of the global configuration counter
    pub async fn config_version(&self) -> Result<i64, DomainError> {
        self.store.get_counter(keys::CONFIG_VERSION).await
    }

    /// Advance the global configuration counter
    pub async fn bump_config_version(&self) -> Result<i64, DomainError> {
        self.store.increment(keys::CONFIG_VERSION, 1).await
    }

    /// Per-experiment versions
    pub async fn versions(&self) -> Result<HashMap<String, u64>, DomainError> {
        Ok(self
            .store
            .hash_get_all(keys::VERSIONS)
            .await?
            .into_iter()
            .filter_map(|(name, version)| version.parse().ok().map(|v| (name, v)))
            .collect())
    }

    /// Version of one experiment straight from the store
    pub async fn version(&self, name: &str) -> Result<u64, DomainError> {
        let version = self.store.hash_get_counter(keys::VERSIONS, name).await?;
        Ok(version.max(0) as u64)
    }

    /// Bump an experiment's version and the global counter
    pub async fn increment_version(&self, name: &str) -> Result<u64, DomainError> {
        let version = self.store.hash_increment(keys::VERSIONS, name, 1).await?;
        self.bump_config_version().await?;
        Ok(version.max(0) as u64)
    }

    /// Winners of every experiment
    pub async fn winners(&self) -> Result<HashMap<String, String>, DomainError> {
        self.store.hash_get_all(keys::WINNERS).await
    }

    pub async fn set_winner(&self, name: &str, alternative: &str) -> Result<(), DomainError> {
        self.store.hash_set(keys::WINNERS, name, alternative).await
    }

    pub async fn remove_winner(&self, name: &str) -> Result<bool, DomainError> {
        self.store.hash_delete(keys::WINNERS, name).await
    }
}

/// Rebuild weights for loaded alternative names
///
/// Falls back to an equal split when stored weights are missing or no longer
/// sum to one.
fn restore_weights(names: &[String], weights: &[Option<f64>]) -> Vec<Alternative> {
    let stored: Option<Vec<f64>> = weights.iter().copied().collect();

    match stored {
        Some(stored)
            if stored.iter().all(|w| *w > 0.0)
                && (stored.iter().sum::<f64>() - 1.0).abs() <= WEIGHT_TOLERANCE =>
        {
            names
                .iter()
                .zip(stored)
                .map(|(name, weight)| Alternative::new(name.clone(), weight))
                .collect()
        }
        _ => {
            let share = 1.0 / names.len() as f64;
            names
                .iter()
                .map(|name| Alternative::new(name.clone(), share))
                .collect()
        }
    }
}
