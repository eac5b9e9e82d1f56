//! Visitor-scoped collaborator traits

use async_trait::async_trait;
use std::fmt::Debug;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Persistence of one visitor's assignments
///
/// Keys are experiment keys (`name` or `name:version`) mapped to the assigned
/// alternative, and finished keys (`<key>:finished`) mapped to `"true"`.
/// Implementations are scoped to a single visitor or session.
#[async_trait]
pub trait VisitorStore: Send + Sync + Debug {
    /// Gets the value stored under a key
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Stores a value under a key
    async fn set(&self, key: &str, value: &str) -> Result<(), DomainError>;

    /// Deletes a key
    async fn delete(&self, key: &str) -> Result<(), DomainError>;

    /// Lists every key held for this visitor
    async fn keys(&self) -> Result<Vec<String>, DomainError>;
}

/// Operator/debug channel forcing an alternative for the current request
#[cfg_attr(test, automock)]
pub trait OverrideSource: Send + Sync {
    /// Returns the forced alternative for an experiment, if any
    fn override_for(&self, experiment_name: &str) -> Option<String>;
}

/// Decides whether the current visitor takes part in testing at all
#[cfg_attr(test, automock)]
pub trait ExclusionPolicy: Send + Sync {
    /// Returns true when the visitor must only ever see the control
    fn is_excluded(&self) -> bool;
}

/// Override source that never overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

impl OverrideSource for NoOverrides {
    fn override_for(&self, _experiment_name: &str) -> Option<String> {
        None
    }
}

/// Exclusion policy that lets every visitor in
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverExclude;

impl ExclusionPolicy for NeverExclude {
    fn is_excluded(&self) -> bool {
        false
    }
}

impl<F> OverrideSource for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn override_for(&self, experiment_name: &str) -> Option<String> {
        self(experiment_name)
    }
}
