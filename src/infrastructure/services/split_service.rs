//! Split service: visitor assignment and completion
//!
//! Per (visitor, experiment key) a visitor moves from unassigned to assigned
//! to finished. Assignments live in the visitor store; counters, shapes and
//! winners live in the shared backing store.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::domain::experiment::{
    DeclaredAlternative, Experiment, ExperimentDescriptor, RandomSource, Trial, FINISHED_SUFFIX,
    KEY_SEPARATOR,
};
use crate::domain::visitor::{RequestContext, VisitorStore};
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_trial_completed, record_trial_started};

use super::experiment_service::ExperimentService;
use super::registry::Registry;

/// Options for completing an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleteOptions {
    /// Delete the assignment of resettable experiments after counting
    pub reset: bool,
}

impl Default for CompleteOptions {
    fn default() -> Self {
        Self { reset: true }
    }
}

impl CompleteOptions {
    /// Keep the assignment and mark the visitor finished instead
    pub fn without_reset() -> Self {
        Self { reset: false }
    }
}

/// Visitor key parsed into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VisitorKey<'a> {
    name: &'a str,
    version: u64,
    finished: bool,
}

impl<'a> VisitorKey<'a> {
    fn parse(key: &'a str) -> Self {
        let mut parts = key.split(KEY_SEPARATOR);
        let name = parts.next().unwrap_or_default();
        let mut version = 0;
        let mut finished = false;

        for part in parts {
            if part == FINISHED_SUFFIX {
                finished = true;
            } else if let Ok(parsed) = part.parse() {
                version = parsed;
            }
        }

        Self {
            name,
            version,
            finished,
        }
    }
}

// ============================================================================
// Split Service
// ============================================================================

/// Assignment orchestrator shared by request handlers
#[derive(Debug, Clone)]
pub struct SplitService {
    registry: Arc<Registry>,
    experiments: ExperimentService,
}

impl SplitService {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            experiments: ExperimentService::new(Arc::clone(&registry)),
            registry,
        }
    }

    /// Replace the random source used for draws
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.experiments = self.experiments.with_random(random);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn experiments(&self) -> &ExperimentService {
        &self.experiments
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// Assign the visitor to an alternative and return its name
    ///
    /// `control` and `alternatives` may be empty, in which case the shape
    /// declared in (or persisted through) the registry is used. With
    /// fail-over on, backing store and hook failures fall back to the
    /// override (when allowed) or the control.
    pub async fn assign(
        &self,
        descriptor: impl Into<ExperimentDescriptor>,
        control: Option<DeclaredAlternative>,
        alternatives: Vec<DeclaredAlternative>,
        ctx: &RequestContext<'_>,
    ) -> Result<String, DomainError> {
        let descriptor = descriptor.into();
        let name = descriptor.name().to_string();

        let declared: Vec<DeclaredAlternative> = control.into_iter().chain(alternatives).collect();
        let control_name = declared.first().map(|a| a.name().to_string());

        if !self.registry.is_enabled() {
            return self.control_for(&name, control_name);
        }

        match self.start_trial(&descriptor, &declared, ctx).await {
            Ok(alternative) => Ok(alternative),
            Err(error) => {
                self.registry.absorb(error, Some(&name))?;

                if self.registry.settings().db_failover_allow_parameter_override {
                    if let Some(forced) = ctx.overrides.override_for(&name) {
                        return Ok(forced);
                    }
                }

                self.control_for(&name, control_name)
            }
        }
    }

    /// Assign with alternatives given as a JSON declaration
    ///
    /// Accepts the same forms as a configured `alternatives` entry; the first
    /// one is the control.
    pub async fn assign_value(
        &self,
        descriptor: impl Into<ExperimentDescriptor>,
        alternatives: &Value,
        ctx: &RequestContext<'_>,
    ) -> Result<String, DomainError> {
        let declared = match alternatives {
            Value::Null => Vec::new(),
            value => DeclaredAlternative::list_from_value(value)?,
        };

        self.assign(descriptor, None, declared, ctx).await
    }

    async fn start_trial(
        &self,
        descriptor: &ExperimentDescriptor,
        declared: &[DeclaredAlternative],
        ctx: &RequestContext<'_>,
    ) -> Result<String, DomainError> {
        let name = descriptor.name();
        let visitor = ctx.visitor;

        self.registry.refresh().await?;

        let mut experiment = self
            .experiments
            .build(name, declared, descriptor.goals())
            .await?;
        self.experiments.save(&mut experiment).await?;

        let control = experiment
            .control()
            .map(|c| c.name().to_string())
            .ok_or_else(|| {
                DomainError::invalid_alternative(format!("Experiment '{}' has no control", name))
            })?;

        if ctx.exclusion.is_excluded() {
            debug!(experiment = %name, "Visitor excluded, serving control");
            return Ok(control);
        }

        if let Some(forced) = ctx.overrides.override_for(name) {
            if self.registry.settings().store_override {
                for key in visitor.keys().await? {
                    visitor.delete(&key).await?;
                }
                visitor.set(&experiment.key(), &forced).await?;
            }

            debug!(experiment = %name, alternative = %forced, "Override applied");
            return Ok(forced);
        }

        if let Some(winner) = self.registry.winner(name)? {
            return Ok(winner);
        }

        self.clean_old_experiments(visitor).await?;
        self.clean_old_versions(&experiment, visitor).await?;

        if !self.registry.settings().allow_multiple_experiments
            && self.doing_other_tests(&experiment, visitor).await?
        {
            debug!(experiment = %name, "Visitor already in another experiment");
            return Ok(control);
        }

        let key = experiment.key();

        if let Some(existing) = visitor.get(&key).await? {
            return Ok(existing);
        }

        let alternative = self.experiments.random_alternative(&experiment).await?;
        self.experiments
            .increment_participation(&experiment, alternative.name())
            .await?;
        record_trial_started(name, alternative.name());

        visitor.set(&key, alternative.name()).await?;

        let mut trial = Trial::new(experiment).with_goals(descriptor.goals().to_vec());
        trial.select(alternative.clone());
        self.registry.call_trial_choose(&trial)?;

        debug!(experiment = %key, alternative = %alternative.name(), "Visitor assigned");
        Ok(alternative.name().to_string())
    }

    fn control_for(&self, name: &str, control: Option<String>) -> Result<String, DomainError> {
        match control {
            Some(control) => Ok(control),
            None => self
                .registry
                .cached_control(name)?
                .ok_or_else(|| DomainError::experiment_not_found(name)),
        }
    }

    /// Drop keys of experiments neither declared nor persisted
    async fn clean_old_experiments(&self, visitor: &dyn VisitorStore) -> Result<(), DomainError> {
        let keys = visitor.keys().await?;

        if keys.is_empty() {
            return Ok(());
        }

        let mut known: HashSet<String> = self.registry.declared_names()?.into_iter().collect();

        if keys
            .iter()
            .all(|key| known.contains(VisitorKey::parse(key).name))
        {
            return Ok(());
        }

        known.extend(self.experiments.names().await?);

        for key in &keys {
            if !known.contains(VisitorKey::parse(key).name) {
                debug!(key = %key, "Removing assignment of unknown experiment");
                visitor.delete(key).await?;
            }
        }

        Ok(())
    }

    /// Drop keys of earlier versions of this experiment
    async fn clean_old_versions(
        &self,
        experiment: &Experiment,
        visitor: &dyn VisitorStore,
    ) -> Result<(), DomainError> {
        for key in visitor.keys().await? {
            let parsed = VisitorKey::parse(&key);

            if parsed.name == experiment.name() && parsed.version != experiment.version() {
                debug!(key = %key, "Removing assignment of an old version");
                visitor.delete(&key).await?;
            }
        }

        Ok(())
    }

    async fn doing_other_tests(
        &self,
        experiment: &Experiment,
        visitor: &dyn VisitorStore,
    ) -> Result<bool, DomainError> {
        let key = experiment.key();
        let finished_key = experiment.finished_key();

        Ok(visitor
            .keys()
            .await?
            .iter()
            .any(|k| *k != key && *k != finished_key))
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Count a completion for the visitor
    ///
    /// The descriptor names an experiment or a metric; a metric completes
    /// every experiment sharing it. Descriptor goals are counted individually.
    pub async fn complete(
        &self,
        descriptor: impl Into<ExperimentDescriptor>,
        options: CompleteOptions,
        ctx: &RequestContext<'_>,
    ) -> Result<(), DomainError> {
        let descriptor = descriptor.into();

        if !self.registry.is_enabled() || ctx.exclusion.is_excluded() {
            return Ok(());
        }

        match self.finish(&descriptor, options, ctx).await {
            Ok(()) => Ok(()),
            Err(error) => self.registry.absorb(error, Some(descriptor.name())),
        }
    }

    async fn finish(
        &self,
        descriptor: &ExperimentDescriptor,
        options: CompleteOptions,
        ctx: &RequestContext<'_>,
    ) -> Result<(), DomainError> {
        self.registry.refresh().await?;

        for name in self.possible_experiments(descriptor.name()).await? {
            let experiment = self.experiments.build(&name, &[], &[]).await?;
            self.finish_experiment(experiment, descriptor.goals(), options, ctx)
                .await?;
        }

        Ok(())
    }

    /// Experiments sharing a metric, plus the experiment of that name
    async fn possible_experiments(&self, name: &str) -> Result<Vec<String>, DomainError> {
        let mut names = self
            .registry
            .metrics()?
            .get(name)
            .cloned()
            .unwrap_or_default();

        if !names.iter().any(|n| n == name) && self.registry.experiment_for(name).await?.is_some()
        {
            names.push(name.to_string());
        }

        Ok(names)
    }

    async fn finish_experiment(
        &self,
        experiment: Experiment,
        goals: &[String],
        options: CompleteOptions,
        ctx: &RequestContext<'_>,
    ) -> Result<(), DomainError> {
        let visitor = ctx.visitor;

        if self.registry.winner(experiment.name())?.is_some() {
            return Ok(());
        }

        let should_reset = experiment.is_resettable() && options.reset;
        let key = experiment.key();
        let finished_key = experiment.finished_key();

        if !should_reset && visitor.get(&finished_key).await?.is_some() {
            debug!(experiment = %key, "Visitor already finished");
            return Ok(());
        }

        let Some(alternative) = visitor.get(&key).await? else {
            debug!(experiment = %key, "Visitor has no assignment to complete");
            return Ok(());
        };

        let trial = Trial::new(experiment)
            .with_alternative(&alternative)
            .with_goals(goals.to_vec());

        match trial.alternative_name() {
            Some(chosen) => {
                if goals.is_empty() {
                    self.experiments
                        .increment_completion(trial.experiment(), chosen, None)
                        .await?;
                    record_trial_completed(trial.experiment().name(), chosen, None);
                } else {
                    for goal in goals {
                        self.experiments
                            .increment_completion(trial.experiment(), chosen, Some(goal))
                            .await?;
                        record_trial_completed(trial.experiment().name(), chosen, Some(goal));
                    }
                }
            }
            None => {
                debug!(experiment = %key, alternative = %alternative, "Assigned alternative no longer exists");
            }
        }

        self.registry.call_trial_complete(&trial)?;

        if should_reset {
            visitor.delete(&key).await?;
        } else {
            visitor.set(&finished_key, "true").await?;
        }

        debug!(experiment = %key, alternative = %alternative, "Visitor completed");
        Ok(())
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Replace the declared experiments
    pub fn declare_experiments(&self, experiments: &Value) -> Result<(), DomainError> {
        self.registry.declare_experiments(experiments)
    }

    /// Push every declared experiment through `save`
    pub async fn declare(&self) -> Result<Vec<Experiment>, DomainError> {
        self.registry.refresh().await?;

        let mut saved = Vec::new();

        for name in self.registry.declared_names()? {
            let mut experiment = self.experiments.build(&name, &[], &[]).await?;
            self.experiments.save(&mut experiment).await?;
            saved.push(experiment);
        }

        info!(count = saved.len(), "Declared experiments saved");
        Ok(saved)
    }

    pub async fn set_winner(&self, name: &str, alternative: &str) -> Result<Experiment, DomainError> {
        let mut experiment = self.load(name).await?;
        self.experiments.set_winner(&mut experiment, alternative).await?;
        Ok(experiment)
    }

    pub async fn clear_winner(&self, name: &str) -> Result<Experiment, DomainError> {
        let mut experiment = self.load(name).await?;
        self.experiments.clear_winner(&mut experiment).await?;
        Ok(experiment)
    }

    pub async fn reset(&self, name: &str) -> Result<Experiment, DomainError> {
        let mut experiment = self.load(name).await?;
        self.experiments.reset(&mut experiment).await?;
        Ok(experiment)
    }

    pub async fn delete(&self, name: &str) -> Result<Experiment, DomainError> {
        let mut experiment = self.load(name).await?;
        self.experiments.delete(&mut experiment).await?;
        Ok(experiment)
    }

    /// Persisted experiment, else the declared one
    async fn load(&self, name: &str) -> Result<Experiment, DomainError> {
        self.registry.refresh().await?;

        match self.experiments.find(name).await? {
            Some(experiment) => Ok(experiment),
            None => self.experiments.build(name, &[], &[]).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::SeededRandom;
    use crate::domain::store::UnavailableStore;
    use crate::domain::visitor::{MockExclusionPolicy, MockOverrideSource};
    use crate::infrastructure::services::RegistrySettings;
    use crate::infrastructure::store::InMemoryStore;
    use crate::infrastructure::visitor::SessionVisitorStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service_with(settings: RegistrySettings) -> SplitService {
        let registry = Registry::new(Arc::new(InMemoryStore::new()))
            .with_settings(settings)
            .with_experiments(&json!({
                "button_color": {
                    "alternatives": ["red", "blue"],
                    "metric": "checkout"
                },
                "headline": {
                    "alternatives": ["short", "long"],
                    "metric": "checkout",
                    "resettable": false
                }
            }))
            .unwrap();

        SplitService::new(Arc::new(registry)).with_random(Arc::new(SeededRandom::new(42)))
    }

    fn service() -> SplitService {
        service_with(RegistrySettings {
            allow_multiple_experiments: true,
            ..Default::default()
        })
    }

    fn red_blue() -> (Option<DeclaredAlternative>, Vec<DeclaredAlternative>) {
        (
            Some(DeclaredAlternative::named("red")),
            vec![DeclaredAlternative::named("blue")],
        )
    }

    #[test]
    fn test_visitor_key_parsing() {
        assert_eq!(
            VisitorKey::parse("button_color"),
            VisitorKey {
                name: "button_color",
                version: 0,
                finished: false
            }
        );
        assert_eq!(
            VisitorKey::parse("button_color:3:finished"),
            VisitorKey {
                name: "button_color",
                version: 3,
                finished: true
            }
        );
        assert!(VisitorKey::parse("button_color:finished").finished);
    }

    #[tokio::test]
    async fn test_assign_reuses_existing_assignment() {
        let service = service();
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);
        let (control, alternatives) = red_blue();

        let first = service
            .assign("button_color", control.clone(), alternatives.clone(), &ctx)
            .await
            .unwrap();

        for _ in 0..5 {
            let again = service
                .assign("button_color", control.clone(), alternatives.clone(), &ctx)
                .await
                .unwrap();
            assert_eq!(again, first);
        }

        let exp = service.experiments().find("button_color").await.unwrap().unwrap();
        assert_eq!(exp.participant_count(), 1);
    }

    #[tokio::test]
    async fn test_excluded_visitor_gets_control_without_write() {
        let service = service();
        let visitor = SessionVisitorStore::new();
        let mut exclusion = MockExclusionPolicy::new();
        exclusion.expect_is_excluded().return_const(true);
        let ctx = RequestContext::new(&visitor).with_exclusion(&exclusion);
        let (control, alternatives) = red_blue();

        let chosen = service
            .assign("button_color", control, alternatives, &ctx)
            .await
            .unwrap();

        assert_eq!(chosen, "red");
        assert!(visitor.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_override_is_returned_and_optionally_stored() {
        let service = service_with(RegistrySettings {
            store_override: true,
            ..Default::default()
        });
        let visitor = SessionVisitorStore::new();
        visitor.set("headline", "short").await.unwrap();

        let mut overrides = MockOverrideSource::new();
        overrides
            .expect_override_for()
            .returning(|name| (name == "button_color").then(|| "blue".to_string()));
        let ctx = RequestContext::new(&visitor).with_overrides(&overrides);
        let (control, alternatives) = red_blue();

        let chosen = service
            .assign("button_color", control, alternatives, &ctx)
            .await
            .unwrap();

        assert_eq!(chosen, "blue");
        assert_eq!(visitor.keys().await.unwrap(), vec!["button_color"]);
        assert_eq!(visitor.get("button_color").await.unwrap(), Some("blue".to_string()));
    }

    #[tokio::test]
    async fn test_single_experiment_per_visitor_by_default() {
        let service = service_with(RegistrySettings::default());
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);

        service.assign("headline", None, Vec::new(), &ctx).await.unwrap();
        let chosen = service
            .assign("button_color", None, Vec::new(), &ctx)
            .await
            .unwrap();

        assert_eq!(chosen, "red");
        assert!(visitor.get("button_color").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_experiment_keys_are_cleaned() {
        let service = service();
        let visitor = SessionVisitorStore::new();
        visitor.set("retired_test", "a").await.unwrap();
        visitor.set("retired_test:finished", "true").await.unwrap();
        let ctx = RequestContext::new(&visitor);

        service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();

        assert_eq!(visitor.keys().await.unwrap(), vec!["button_color"]);
    }

    #[tokio::test]
    async fn test_complete_by_metric_fans_out() {
        let service = service();
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);

        let color = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();
        let headline = service.assign("headline", None, Vec::new(), &ctx).await.unwrap();

        service
            .complete("checkout", CompleteOptions::default(), &ctx)
            .await
            .unwrap();

        let color_exp = service.experiments().find("button_color").await.unwrap().unwrap();
        let headline_exp = service.experiments().find("headline").await.unwrap().unwrap();
        assert_eq!(color_exp.alternative(&color).unwrap().completed_count(None), 1);
        assert_eq!(headline_exp.alternative(&headline).unwrap().completed_count(None), 1);

        // Resettable experiment forgets the assignment, the other one finishes
        assert!(visitor.get("button_color").await.unwrap().is_none());
        assert_eq!(
            visitor.get("headline:finished").await.unwrap(),
            Some("true".to_string())
        );
    }

    #[tokio::test]
    async fn test_complete_counts_each_goal() {
        let service = service();
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);

        let chosen = service.assign("button_color", None, Vec::new(), &ctx).await.unwrap();
        service
            .complete(
                ExperimentDescriptor::new("button_color").with_goals(["click", "scroll"]),
                CompleteOptions::without_reset(),
                &ctx,
            )
            .await
            .unwrap();

        let exp = service.experiments().find("button_color").await.unwrap().unwrap();
        let alternative = exp.alternative(&chosen).unwrap();
        assert_eq!(alternative.completed_count(Some("click")), 1);
        assert_eq!(alternative.completed_count(Some("scroll")), 1);
        assert_eq!(alternative.completed_count(None), 0);
    }

    #[tokio::test]
    async fn test_complete_without_assignment_is_noop() {
        let service = service();
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);

        service
            .complete("button_color", CompleteOptions::default(), &ctx)
            .await
            .unwrap();
        assert!(visitor.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hooks_receive_trials() {
        let chosen = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let (on_choose, on_complete) = (Arc::clone(&chosen), Arc::clone(&completed));

        let registry = Registry::new(Arc::new(InMemoryStore::new()))
            .with_on_trial_choose(move |trial| {
                assert!(trial.alternative().is_some());
                on_choose.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_on_trial_complete(move |_| {
                on_complete.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        let service = SplitService::new(Arc::new(registry));
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);
        let (control, alternatives) = red_blue();

        service
            .assign("button_color", control.clone(), alternatives.clone(), &ctx)
            .await
            .unwrap();
        service
            .assign("button_color", control, alternatives, &ctx)
            .await
            .unwrap();
        service
            .complete("button_color", CompleteOptions::default(), &ctx)
            .await
            .unwrap();

        assert_eq!(chosen.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_choose_hook_keeps_the_assignment() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let registry = Registry::new(Arc::new(InMemoryStore::new())).with_on_trial_choose(
            move |_| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DomainError::internal("tracker down"))
                } else {
                    Ok(())
                }
            },
        );
        let service = SplitService::new(Arc::new(registry));
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);
        let (control, alternatives) = red_blue();

        let err = service
            .assign("button_color", control.clone(), alternatives.clone(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Hook { .. }));

        let stored = visitor.get("button_color").await.unwrap();
        assert!(stored.is_some());

        let chosen = service
            .assign("button_color", control, alternatives, &ctx)
            .await
            .unwrap();

        assert_eq!(Some(chosen), stored);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let exp = service.experiments().find("button_color").await.unwrap().unwrap();
        assert_eq!(exp.participant_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_serves_control_without_store() {
        let registry = Registry::new(Arc::new(UnavailableStore)).with_settings(RegistrySettings {
            enabled: false,
            ..Default::default()
        });
        let service = SplitService::new(Arc::new(registry));
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);
        let (control, alternatives) = red_blue();

        let chosen = service
            .assign("button_color", control, alternatives, &ctx)
            .await
            .unwrap();
        assert_eq!(chosen, "red");

        service
            .complete("button_color", CompleteOptions::default(), &ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failover_serves_control_and_calls_handler() {
        let failures = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&failures);

        let registry = Registry::new(Arc::new(UnavailableStore))
            .with_settings(RegistrySettings {
                db_failover: true,
                ..Default::default()
            })
            .with_failover_handler(move |error| {
                assert!(matches!(error, DomainError::Store { .. }));
                seen.fetch_add(1, Ordering::SeqCst);
            });
        let service = SplitService::new(Arc::new(registry));
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);
        let (control, alternatives) = red_blue();

        let chosen = service
            .assign("button_color", control, alternatives, &ctx)
            .await
            .unwrap();

        assert_eq!(chosen, "red");
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        service
            .complete("button_color", CompleteOptions::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failover_prefers_allowed_override() {
        let registry = Registry::new(Arc::new(UnavailableStore)).with_settings(RegistrySettings {
            db_failover: true,
            db_failover_allow_parameter_override: true,
            ..Default::default()
        });
        let service = SplitService::new(Arc::new(registry));
        let visitor = SessionVisitorStore::new();
        let overrides = |name: &str| (name == "button_color").then(|| "blue".to_string());
        let ctx = RequestContext::new(&visitor).with_overrides(&overrides);
        let (control, alternatives) = red_blue();

        let chosen = service
            .assign("button_color", control, alternatives, &ctx)
            .await
            .unwrap();
        assert_eq!(chosen, "blue");
    }

    #[tokio::test]
    async fn test_store_errors_propagate_without_failover() {
        let service = SplitService::new(Arc::new(Registry::new(Arc::new(UnavailableStore))));
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);
        let (control, alternatives) = red_blue();

        let err = service
            .assign("button_color", control, alternatives, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Store { .. }));
    }

    #[tokio::test]
    async fn test_validation_errors_propagate_with_failover() {
        let registry = Registry::new(Arc::new(InMemoryStore::new())).with_settings(
            RegistrySettings {
                db_failover: true,
                ..Default::default()
            },
        );
        let service = SplitService::new(Arc::new(registry));
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);

        let err = service
            .assign(
                "button_color",
                Some(DeclaredAlternative::named("red")),
                vec![DeclaredAlternative::named("red")],
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidAlternative { .. }));
    }

    #[tokio::test]
    async fn test_assign_value_accepts_weighted_mapping() {
        let service = service();
        let visitor = SessionVisitorStore::new();
        let ctx = RequestContext::new(&visitor);

        let chosen = service
            .assign_value("pricing", &json!({"low": 100, "high": 0.0001}), &ctx)
            .await;

        // Percentages covering every alternative are rescaled
        assert!(chosen.is_ok());
        let exp = service.experiments().find("pricing").await.unwrap().unwrap();
        assert_eq!(exp.alternative_names(), vec!["low", "high"]);
    }
}
