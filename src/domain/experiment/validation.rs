//! Experiment validation utilities

use std::collections::HashSet;

use super::alternative::Alternative;
use crate::domain::DomainError;

/// Separator between an experiment name and its version in visitor keys
pub const KEY_SEPARATOR: char = ':';

/// Store key suffixes next to `<experiment>:<alternative>` counter keys
pub const GOALS_SUFFIX: &str = "goals";
pub const METRIC_SUFFIX: &str = "metric";

/// Tolerance when checking that weights sum to one
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Validate an experiment name
pub fn validate_experiment_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::invalid_experiment_name(
            "Experiment name cannot be empty",
        ));
    }

    if name.contains(KEY_SEPARATOR) {
        return Err(DomainError::invalid_experiment_name(format!(
            "Experiment name '{}' cannot contain '{}'",
            name, KEY_SEPARATOR
        )));
    }

    Ok(())
}

/// Validate a single alternative
pub fn validate_alternative(alternative: &Alternative) -> Result<(), DomainError> {
    if alternative.name().trim().is_empty() {
        return Err(DomainError::invalid_alternative(
            "Alternative name cannot be empty",
        ));
    }

    if [GOALS_SUFFIX, METRIC_SUFFIX].contains(&alternative.name()) {
        return Err(DomainError::invalid_alternative(format!(
            "Alternative name '{}' is reserved",
            alternative.name()
        )));
    }

    let weight = alternative.weight();

    if !weight.is_finite() || weight <= 0.0 || weight > 1.0 + WEIGHT_TOLERANCE {
        return Err(DomainError::invalid_alternative(format!(
            "Alternative '{}' has weight {} outside (0, 1]",
            alternative.name(),
            weight
        )));
    }

    Ok(())
}

/// Validate the ordered alternatives of one experiment
pub fn validate_alternatives(alternatives: &[Alternative]) -> Result<(), DomainError> {
    if alternatives.is_empty() {
        return Err(DomainError::invalid_alternative(
            "Experiment must have at least one alternative",
        ));
    }

    let mut seen = HashSet::new();

    for alternative in alternatives {
        validate_alternative(alternative)?;

        if !seen.insert(alternative.name()) {
            return Err(DomainError::invalid_alternative(format!(
                "Duplicate alternative '{}'",
                alternative.name()
            )));
        }
    }

    let total: f64 = alternatives.iter().map(|a| a.weight()).sum();

    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(DomainError::invalid_alternative(format!(
            "Alternative weights must sum to 1, got {}",
            total
        )));
    }

    Ok(())
}

/// Validate goal names
pub fn validate_goals(goals: &[String]) -> Result<(), DomainError> {
    for goal in goals {
        if goal.trim().is_empty() {
            return Err(DomainError::invalid_goals_format("Goal name cannot be empty"));
        }
    }

    Ok(())
}
