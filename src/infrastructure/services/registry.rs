//! Configuration registry
//!
//! Holds declared experiment shapes and a per-process cache of what the
//! backing store knows: persisted shapes, per-experiment versions and winners.
//! The cache is kept coherent through the shared `config_version` counter.
//! Local locks are only held for short critical sections, never across an
//! `.await`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::experiment::{
    parse_declarations, Algorithm, ExperimentDeclaration, NormalizedExperiment, Trial,
};
use crate::domain::store::SplitStore;
use crate::domain::DomainError;
use crate::infrastructure::exclusion::ExclusionRules;
use crate::infrastructure::experiment::StoreExperimentRepository;
use crate::infrastructure::observability::record_failover;

/// Callback receiving a trial after a choice or a completion
pub type TrialHook = Arc<dyn Fn(&Trial) -> Result<(), DomainError> + Send + Sync>;

/// Callback receiving a backing store error swallowed by fail-over
pub type FailoverHandler = Arc<dyn Fn(&DomainError) + Send + Sync>;

// ============================================================================
// Settings
// ============================================================================

/// When to reload the cached view of the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadStrategy {
    /// Reload whenever the shared `config_version` moved past the cached one
    #[default]
    Versioned,
    /// Reload once the period has elapsed since the last reload
    Periodic { period: Duration },
}

/// Registry behavior switches
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// When false every visitor sees the control and nothing is written
    pub enabled: bool,
    /// Swallow backing store errors instead of propagating them
    pub db_failover: bool,
    /// Honor overrides when fail-over kicks in
    pub db_failover_allow_parameter_override: bool,
    /// Let a visitor take part in several experiments at once
    pub allow_multiple_experiments: bool,
    /// Persist overrides as the visitor's only assignment
    pub store_override: bool,
    /// Algorithm used when an experiment does not name one
    pub algorithm: Algorithm,
    pub reload: ReloadStrategy,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_failover: false,
            db_failover_allow_parameter_override: false,
            allow_multiple_experiments: false,
            store_override: false,
            algorithm: Algorithm::default(),
            reload: ReloadStrategy::default(),
        }
    }
}

// ============================================================================
// Cached state
// ============================================================================

#[derive(Debug, Default)]
struct Declared {
    declarations: BTreeMap<String, ExperimentDeclaration>,
    normalized: Arc<BTreeMap<String, NormalizedExperiment>>,
}

#[derive(Debug, Default)]
struct CacheState {
    persisted: HashMap<String, NormalizedExperiment>,
    versions: HashMap<String, u64>,
    winners: HashMap<String, String>,
    metrics: Option<Arc<BTreeMap<String, Vec<String>>>>,
    cached_version: Option<i64>,
    last_reload: Option<Instant>,
}

// ============================================================================
// Registry
// ============================================================================

/// Process-wide view of experiment configuration
pub struct Registry {
    repository: StoreExperimentRepository,
    settings: RegistrySettings,
    exclusion: Arc<ExclusionRules>,
    declared: RwLock<Declared>,
    cache: RwLock<CacheState>,
    on_trial_choose: Option<TrialHook>,
    on_trial_complete: Option<TrialHook>,
    failover_handler: FailoverHandler,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("repository", &self.repository)
            .field("settings", &self.settings)
            .field("on_trial_choose", &self.on_trial_choose.is_some())
            .field("on_trial_complete", &self.on_trial_complete.is_some())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a registry with default settings over a backing store
    pub fn new(store: Arc<dyn SplitStore>) -> Self {
        Self {
            repository: StoreExperimentRepository::new(store),
            settings: RegistrySettings::default(),
            exclusion: Arc::new(ExclusionRules::default()),
            declared: RwLock::new(Declared::default()),
            cache: RwLock::new(CacheState::default()),
            on_trial_choose: None,
            on_trial_complete: None,
            failover_handler: Arc::new(|error: &DomainError| {
                warn!(error = %error, "Backing store unavailable, serving control");
            }),
        }
    }

    pub fn with_settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_exclusion_rules(mut self, rules: ExclusionRules) -> Self {
        self.exclusion = Arc::new(rules);
        self
    }

    /// Declare experiments up front, see [`Registry::declare_experiments`]
    pub fn with_experiments(self, experiments: &Value) -> Result<Self, DomainError> {
        self.declare_experiments(experiments)?;
        Ok(self)
    }

    pub fn with_on_trial_choose<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Trial) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        self.on_trial_choose = Some(Arc::new(hook));
        self
    }

    pub fn with_on_trial_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Trial) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        self.on_trial_complete = Some(Arc::new(hook));
        self
    }

    pub fn with_failover_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&DomainError) + Send + Sync + 'static,
    {
        self.failover_handler = Arc::new(handler);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn repository(&self) -> &StoreExperimentRepository {
        &self.repository
    }

    /// Bot table and ignored addresses, for building request exclusions
    pub fn exclusion_rules(&self) -> Arc<ExclusionRules> {
        Arc::clone(&self.exclusion)
    }

    /// Global version this process last reloaded at
    pub fn cached_version(&self) -> Result<Option<i64>, DomainError> {
        Ok(self.cache()?.cached_version)
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Replace the declared experiments
    ///
    /// Accepts a mapping of experiment name to settings. Every declaration is
    /// normalized immediately so format errors surface here.
    pub fn declare_experiments(&self, experiments: &Value) -> Result<(), DomainError> {
        let declarations = parse_declarations(experiments)?;

        let mut normalized = BTreeMap::new();
        for (name, declaration) in &declarations {
            normalized.insert(name.clone(), declaration.normalize()?);
        }

        let count = declarations.len();

        {
            let mut declared = self.declared_mut()?;
            declared.declarations = declarations;
            declared.normalized = Arc::new(normalized);
        }
        self.cache_mut()?.metrics = None;

        info!(count = count, "Declared experiments");
        Ok(())
    }

    /// Declared shapes keyed by experiment name
    pub fn normalized_experiments(
        &self,
    ) -> Result<Arc<BTreeMap<String, NormalizedExperiment>>, DomainError> {
        Ok(Arc::clone(&self.declared()?.normalized))
    }

    pub fn declared_names(&self) -> Result<Vec<String>, DomainError> {
        Ok(self.declared()?.declarations.keys().cloned().collect())
    }

    /// Declared shape, else the persisted one
    pub async fn experiment_for(
        &self,
        name: &str,
    ) -> Result<Option<NormalizedExperiment>, DomainError> {
        if let Some(declared) = self.normalized_experiments()?.get(name) {
            return Ok(Some(declared.clone()));
        }

        self.persisted_shape(name).await
    }

    /// Shape currently persisted in the backing store
    ///
    /// Every stored shape is loaded on reload; later ones are loaded lazily.
    /// Cached until [`Registry::uncache`] or the next reload. Missing
    /// experiments are not cached.
    pub async fn persisted_shape(
        &self,
        name: &str,
    ) -> Result<Option<NormalizedExperiment>, DomainError> {
        if let Some(shape) = self.cache()?.persisted.get(name) {
            return Ok(Some(shape.clone()));
        }

        let shape = self.repository.load_shape(name).await?;

        if let Some(shape) = &shape {
            let mut cache = self.cache_mut()?;
            cache.persisted.insert(name.to_string(), shape.clone());
            cache.metrics = None;
        }

        Ok(shape)
    }

    /// Control alternative known without touching the store
    pub fn cached_control(&self, name: &str) -> Result<Option<String>, DomainError> {
        if let Some(declared) = self.normalized_experiments()?.get(name) {
            return Ok(declared.control().map(|c| c.name().to_string()));
        }

        Ok(self
            .cache()?
            .persisted
            .get(name)
            .and_then(|shape| shape.control())
            .map(|c| c.name().to_string()))
    }

    /// Drop the cached persisted shape of an experiment
    pub fn uncache(&self, name: &str) -> Result<(), DomainError> {
        let mut cache = self.cache_mut()?;
        cache.persisted.remove(name);
        cache.metrics = None;
        Ok(())
    }

    /// Metric name to the experiments sharing it
    pub fn metrics(&self) -> Result<Arc<BTreeMap<String, Vec<String>>>, DomainError> {
        if let Some(metrics) = &self.cache()?.metrics {
            return Ok(Arc::clone(metrics));
        }

        let declared = self.normalized_experiments()?;
        let mut cache = self.cache_mut()?;

        let mut metrics: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (name, shape) in declared.iter() {
            if let Some(metric) = shape.metric.as_deref().filter(|m| !m.is_empty()) {
                metrics.entry(metric.to_string()).or_default().push(name.clone());
            }
        }

        for (name, shape) in &cache.persisted {
            if declared.contains_key(name) {
                continue;
            }
            if let Some(metric) = shape.metric.as_deref().filter(|m| !m.is_empty()) {
                metrics.entry(metric.to_string()).or_default().push(name.clone());
            }
        }

        for experiments in metrics.values_mut() {
            experiments.sort();
        }

        let metrics = Arc::new(metrics);
        cache.metrics = Some(Arc::clone(&metrics));
        Ok(metrics)
    }

    // ========================================================================
    // Reload
    // ========================================================================

    /// Refresh the cached view, absorbing store failures through fail-over
    pub async fn update(&self) -> Result<(), DomainError> {
        match self.refresh().await {
            Ok(()) => Ok(()),
            Err(error) => self.absorb(error, None),
        }
    }

    /// Refresh the cached view according to the reload strategy
    pub async fn refresh(&self) -> Result<(), DomainError> {
        if !self.settings.enabled {
            return Ok(());
        }

        match self.settings.reload {
            ReloadStrategy::Versioned => {
                let current = self.repository.config_version().await?;
                let stale = self
                    .cache()?
                    .cached_version
                    .is_none_or(|cached| current > cached);

                if stale {
                    self.reload(current).await?;
                }
            }
            ReloadStrategy::Periodic { period } => {
                let due = self
                    .cache()?
                    .last_reload
                    .is_none_or(|at| at.elapsed() >= period);

                if due {
                    let current = self.repository.config_version().await?;
                    self.reload(current).await?;
                }
            }
        }

        Ok(())
    }

    async fn reload(&self, current: i64) -> Result<(), DomainError> {
        let versions = self.repository.versions().await?;
        let winners = self.repository.winners().await?;

        // Every stored shape, so metric lookups cover experiments this
        // worker has not touched yet
        let mut persisted = HashMap::new();
        for name in self.repository.names().await? {
            if let Some(shape) = self.repository.load_shape(&name).await? {
                persisted.insert(name, shape);
            }
        }

        {
            let mut cache = self.cache_mut()?;
            cache.versions = versions;
            cache.winners = winners;
            cache.persisted = persisted;
            cache.metrics = None;
            cache.cached_version = Some(current);
            cache.last_reload = Some(Instant::now());
        }

        debug!(config_version = current, "Reloaded experiment configuration");
        Ok(())
    }

    // ========================================================================
    // Versions and winners
    // ========================================================================

    /// Cached version of an experiment, 0 when never bumped
    pub fn experiment_version(&self, name: &str) -> Result<u64, DomainError> {
        Ok(self.cache()?.versions.get(name).copied().unwrap_or(0))
    }

    /// Bump an experiment's version and the global counter
    pub async fn increment_experiment_version(&self, name: &str) -> Result<u64, DomainError> {
        let version = self.repository.increment_version(name).await?;
        self.cache_mut()?.versions.insert(name.to_string(), version);

        info!(experiment = %name, version = version, "Experiment version bumped");
        Ok(version)
    }

    /// Cached winner of an experiment
    pub fn winner(&self, name: &str) -> Result<Option<String>, DomainError> {
        Ok(self.cache()?.winners.get(name).cloned())
    }

    /// Force every visitor onto one alternative, returns the new version
    pub async fn set_winner(&self, name: &str, alternative: &str) -> Result<u64, DomainError> {
        self.repository.set_winner(name, alternative).await?;
        self.cache_mut()?
            .winners
            .insert(name.to_string(), alternative.to_string());

        info!(experiment = %name, alternative = %alternative, "Winner set");
        self.increment_experiment_version(name).await
    }

    /// Clear the winner, returns the new version
    pub async fn reset_winner(&self, name: &str) -> Result<u64, DomainError> {
        self.remove_winner(name).await?;

        info!(experiment = %name, "Winner cleared");
        self.increment_experiment_version(name).await
    }

    /// Clear the winner without bumping the version
    ///
    /// Used by operations that bump the version once themselves.
    pub(crate) async fn remove_winner(&self, name: &str) -> Result<(), DomainError> {
        self.repository.remove_winner(name).await?;
        self.cache_mut()?.winners.remove(name);
        Ok(())
    }

    // ========================================================================
    // Hooks and fail-over
    // ========================================================================

    pub(crate) fn call_trial_choose(&self, trial: &Trial) -> Result<(), DomainError> {
        call_hook(self.on_trial_choose.as_ref(), trial)
    }

    pub(crate) fn call_trial_complete(&self, trial: &Trial) -> Result<(), DomainError> {
        call_hook(self.on_trial_complete.as_ref(), trial)
    }

    /// Swallow a recoverable error when fail-over is on
    ///
    /// Returns the error untouched when it must propagate.
    pub fn absorb(&self, error: DomainError, experiment: Option<&str>) -> Result<(), DomainError> {
        if !self.settings.db_failover || !error.is_recoverable() {
            return Err(error);
        }

        warn!(
            experiment = experiment.unwrap_or_default(),
            error = %error,
            "Fail-over absorbed error"
        );
        record_failover(experiment);
        (self.failover_handler)(&error);

        Ok(())
    }

    // ========================================================================
    // Locks
    // ========================================================================

    fn declared(&self) -> Result<RwLockReadGuard<'_, Declared>, DomainError> {
        self.declared
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn declared_mut(&self) -> Result<RwLockWriteGuard<'_, Declared>, DomainError> {
        self.declared
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }

    fn cache(&self) -> Result<RwLockReadGuard<'_, CacheState>, DomainError> {
        self.cache
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn cache_mut(&self) -> Result<RwLockWriteGuard<'_, CacheState>, DomainError> {
        self.cache
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }
}

fn call_hook(hook: Option<&TrialHook>, trial: &Trial) -> Result<(), DomainError> {
    let Some(hook) = hook else {
        return Ok(());
    };

    hook(trial).map_err(|error| match error {
        DomainError::Hook { .. } => error,
        other => DomainError::hook(other.to_string()),
    })
}
