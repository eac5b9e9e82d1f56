//! Operator-supplied experiment declarations and their normalization
//!
//! Declarations arrive as loosely shaped JSON-like values (from configuration
//! files or code). They are parsed into [`ExperimentDeclaration`] and then
//! normalized into a [`NormalizedExperiment`] whose alternative weights are
//! probabilities summing to one, control first.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::algorithm::Algorithm;
use super::alternative::Alternative;
use super::validation::validate_experiment_name;
use crate::domain::DomainError;

// ============================================================================
// DeclaredAlternative
// ============================================================================

/// An alternative as declared, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredAlternative {
    name: String,
    percent: Option<f64>,
}

impl DeclaredAlternative {
    /// An alternative sharing the unassigned probability mass
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            percent: None,
        }
    }

    /// An alternative with an explicit percentage (0-100)
    pub fn with_percent(name: impl Into<String>, percent: f64) -> Self {
        Self {
            name: name.into(),
            percent: Some(percent),
        }
    }

    /// An alternative with an explicit weight (0-1)
    pub fn weighted(name: impl Into<String>, weight: f64) -> Self {
        Self::with_percent(name, weight * 100.0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn percent(&self) -> Option<f64> {
        self.percent
    }

    /// Parse one entry of an alternatives sequence
    ///
    /// Accepts `"red"`, `{"red": 50}` and `{"name": "red", "percent": 50}`.
    pub fn from_value(value: &Value) -> Result<Self, DomainError> {
        match value {
            Value::String(name) => Ok(Self::named(name.clone())),
            Value::Object(map) if map.contains_key("name") => {
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DomainError::invalid_alternative("Alternative name must be a string"))?;

                match map.get("percent") {
                    None | Some(Value::Null) => Ok(Self::named(name)),
                    Some(percent) => Ok(Self::with_percent(name, parse_percent(name, percent)?)),
                }
            }
            Value::Object(map) if map.len() == 1 => {
                let (name, percent) = map
                    .iter()
                    .next()
                    .ok_or_else(|| DomainError::invalid_alternative("Empty alternative mapping"))?;

                match percent {
                    Value::Null => Ok(Self::named(name.clone())),
                    percent => Ok(Self::with_percent(name.clone(), parse_percent(name, percent)?)),
                }
            }
            other => Err(DomainError::invalid_alternative(format!(
                "Unsupported alternative declaration: {}",
                other
            ))),
        }
    }

    /// Parse an alternatives declaration: a sequence of entries or a single
    /// `name -> percent` mapping
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, DomainError> {
        match value {
            Value::Array(items) => {
                // A lone mapping inside a sequence is expanded entry by entry
                if let [Value::Object(map)] = items.as_slice() {
                    if map.len() > 1 && !map.contains_key("name") {
                        return Self::list_from_map(map);
                    }
                }
                items.iter().map(Self::from_value).collect()
            }
            Value::Object(map) => Self::list_from_map(map),
            other => Err(DomainError::invalid_experiments_format(format!(
                "Alternatives must be a mapping or a sequence, got {}",
                other
            ))),
        }
    }

    fn list_from_map(map: &Map<String, Value>) -> Result<Vec<Self>, DomainError> {
        map.iter()
            .map(|(name, percent)| match percent {
                Value::Null => Ok(Self::named(name.clone())),
                percent => Ok(Self::with_percent(name.clone(), parse_percent(name, percent)?)),
            })
            .collect()
    }
}

fn parse_percent(name: &str, value: &Value) -> Result<f64, DomainError> {
    value.as_f64().ok_or_else(|| {
        DomainError::invalid_alternative(format!(
            "Percentage for alternative '{}' must be a number, got {}",
            name, value
        ))
    })
}

// ============================================================================
// ExperimentDeclaration
// ============================================================================

/// An experiment as declared by the operator
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDeclaration {
    alternatives: Vec<DeclaredAlternative>,
    goals: Option<Vec<String>>,
    metric: Option<String>,
    resettable: Option<bool>,
    algorithm: Option<Algorithm>,
}

impl ExperimentDeclaration {
    pub fn alternatives(&self) -> &[DeclaredAlternative] {
        &self.alternatives
    }

    pub fn goals(&self) -> Option<&[String]> {
        self.goals.as_deref()
    }

    pub fn metric(&self) -> Option<&str> {
        self.metric.as_deref()
    }

    pub fn resettable(&self) -> Option<bool> {
        self.resettable
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Parse the settings of one experiment
    pub fn from_value(name: &str, value: &Value) -> Result<Self, DomainError> {
        let settings = value.as_object().ok_or_else(|| {
            DomainError::invalid_experiments_format(format!(
                "Settings for experiment '{}' must be a mapping",
                name
            ))
        })?;

        let alternatives = match settings.get("alternatives") {
            Some(alternatives) => DeclaredAlternative::list_from_value(alternatives)?,
            None => Vec::new(),
        };

        let goals = match settings.get("goals") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_goals(value)?),
        };

        let metric = match settings.get("metric") {
            None | Some(Value::Null) => None,
            Some(Value::String(metric)) if metric.is_empty() => None,
            Some(Value::String(metric)) => Some(metric.clone()),
            Some(other) => Some(other.to_string()),
        };

        let resettable = match settings.get("resettable") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_bool(value).ok_or_else(|| {
                DomainError::invalid_experiments_format(format!(
                    "resettable for experiment '{}' must be a boolean",
                    name
                ))
            })?),
        };

        let algorithm = match settings.get("algorithm") {
            None | Some(Value::Null) => None,
            Some(Value::String(algorithm)) => Some(algorithm.parse()?),
            Some(other) => {
                return Err(DomainError::invalid_alternative(format!(
                    "Algorithm for experiment '{}' must be a name, got {}",
                    name, other
                )));
            }
        };

        Ok(Self {
            alternatives,
            goals,
            metric,
            resettable,
            algorithm,
        })
    }

    /// Normalize alternatives into probabilities
    pub fn normalize(&self) -> Result<NormalizedExperiment, DomainError> {
        Ok(NormalizedExperiment {
            alternatives: normalize_alternatives(&self.alternatives)?,
            goals: self.goals.clone().unwrap_or_default(),
            metric: self.metric.clone(),
            resettable: self.resettable.unwrap_or(true),
            algorithm: self.algorithm,
        })
    }
}

/// Parse a whole experiments mapping (`name -> settings`)
pub fn parse_declarations(
    value: &Value,
) -> Result<BTreeMap<String, ExperimentDeclaration>, DomainError> {
    let experiments = value
        .as_object()
        .ok_or_else(|| DomainError::invalid_experiments_format("Experiments must be a mapping"))?;

    let mut declarations = BTreeMap::new();

    for (name, settings) in experiments {
        validate_experiment_name(name)?;
        declarations.insert(name.clone(), ExperimentDeclaration::from_value(name, settings)?);
    }

    Ok(declarations)
}

/// Parse a goals declaration, which must be a sequence of names
pub fn parse_goals(value: &Value) -> Result<Vec<String>, DomainError> {
    let items = value
        .as_array()
        .ok_or_else(|| DomainError::invalid_goals_format("Goals must be a sequence"))?;

    let mut goals = Vec::with_capacity(items.len());

    for item in items {
        match item {
            Value::String(goal) => goals.push(goal.clone()),
            // Nested sequences are flattened
            Value::Array(_) => goals.extend(parse_goals(item)?),
            other => {
                return Err(DomainError::invalid_goals_format(format!(
                    "Goal must be a name, got {}",
                    other
                )));
            }
        }
    }

    Ok(goals)
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(flag) => flag.parse().ok(),
        _ => None,
    }
}

/// Convert declared percentages into probabilities
///
/// Explicit percentages become `percent / 100` and alternatives without one
/// split the remaining mass equally. When every alternative carries a
/// percentage they are rescaled to sum to one. Without any percentages the
/// mass is split equally.
pub fn normalize_alternatives(
    declared: &[DeclaredAlternative],
) -> Result<Vec<Alternative>, DomainError> {
    if declared.is_empty() {
        return Ok(Vec::new());
    }

    for alternative in declared {
        if let Some(percent) = alternative.percent() {
            if !percent.is_finite() || percent <= 0.0 {
                return Err(DomainError::invalid_alternative(format!(
                    "Alternative '{}' must have a positive percentage, got {}",
                    alternative.name(),
                    percent
                )));
            }
        }
    }

    let given: f64 = declared.iter().filter_map(|a| a.percent()).sum();
    let with_percent = declared.iter().filter(|a| a.percent().is_some()).count();
    let without_percent = declared.len() - with_percent;

    let alternatives = if with_percent == 0 {
        let share = 1.0 / declared.len() as f64;
        declared
            .iter()
            .map(|a| Alternative::new(a.name(), share))
            .collect()
    } else if without_percent == 0 {
        declared
            .iter()
            .map(|a| Alternative::new(a.name(), a.percent().unwrap_or_default() / given))
            .collect()
    } else {
        let unassigned = (100.0 - given) / without_percent as f64 / 100.0;

        if unassigned <= 0.0 {
            return Err(DomainError::invalid_alternative(format!(
                "Declared percentages add up to {} leaving nothing for {} alternative(s)",
                given, without_percent
            )));
        }

        declared
            .iter()
            .map(|a| match a.percent() {
                Some(percent) => Alternative::new(a.name(), percent / 100.0),
                None => Alternative::new(a.name(), unassigned),
            })
            .collect()
    };

    Ok(alternatives)
}

// ============================================================================
// NormalizedExperiment
// ============================================================================

/// Canonical shape of an experiment
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedExperiment {
    pub alternatives: Vec<Alternative>,
    pub goals: Vec<String>,
    pub metric: Option<String>,
    pub resettable: bool,
    pub algorithm: Option<Algorithm>,
}

impl NormalizedExperiment {
    /// Alternative names in declared order
    pub fn alternative_names(&self) -> Vec<&str> {
        self.alternatives.iter().map(|a| a.name()).collect()
    }

    /// The control alternative
    pub fn control(&self) -> Option<&Alternative> {
        self.alternatives.first()
    }
}
