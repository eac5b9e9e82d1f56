//! Experiment descriptors used by the caller-facing operations

use std::fmt;

use serde_json::Value;

use super::declaration::parse_goals;
use super::validation::KEY_SEPARATOR;
use crate::domain::DomainError;

/// Names an experiment (or a metric) together with the goals a completion
/// targets
///
/// A `name:version` label is accepted and the version suffix ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentDescriptor {
    name: String,
    goals: Vec<String>,
}

impl ExperimentDescriptor {
    pub fn new(label: impl AsRef<str>) -> Self {
        let label = label.as_ref();
        let name = label.split(KEY_SEPARATOR).next().unwrap_or(label);

        Self {
            name: name.to_string(),
            goals: Vec::new(),
        }
    }

    pub fn with_goals<I, S>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.goals = goals.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn goals(&self) -> &[String] {
        &self.goals
    }

    /// Parse `"name"` or `{"name": ["goal", ...]}`
    pub fn from_value(value: &Value) -> Result<Self, DomainError> {
        match value {
            Value::String(label) => Ok(Self::new(label)),
            Value::Object(map) if map.len() == 1 => {
                let (label, goals) = map.iter().next().ok_or_else(|| {
                    DomainError::invalid_experiments_format("Empty experiment descriptor")
                })?;

                let goals = match goals {
                    Value::Null => Vec::new(),
                    Value::String(goal) => vec![goal.clone()],
                    other => parse_goals(other)?,
                };

                Ok(Self::new(label).with_goals(goals))
            }
            other => Err(DomainError::invalid_experiments_format(format!(
                "Experiment descriptor must be a name or a single-entry mapping, got {}",
                other
            ))),
        }
    }
}

impl From<&str> for ExperimentDescriptor {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for ExperimentDescriptor {
    fn from(label: String) -> Self {
        Self::new(label)
    }
}

impl fmt::Display for ExperimentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_name() {
        let descriptor = ExperimentDescriptor::from("button_color");
        assert_eq!(descriptor.name(), "button_color");
        assert!(descriptor.goals().is_empty());
    }

    #[test]
    fn test_version_suffix_is_dropped() {
        assert_eq!(ExperimentDescriptor::new("button_color:4").name(), "button_color");
    }

    #[test]
    fn test_from_value_with_goals() {
        let descriptor =
            ExperimentDescriptor::from_value(&json!({"button_color": ["click", "buy"]})).unwrap();

        assert_eq!(descriptor.name(), "button_color");
        assert_eq!(descriptor.goals(), &["click".to_string(), "buy".to_string()]);

        let single = ExperimentDescriptor::from_value(&json!({"button_color": "click"})).unwrap();
        assert_eq!(single.goals(), &["click".to_string()]);
    }

    #[test]
    fn test_from_value_rejects_other_shapes() {
        assert!(ExperimentDescriptor::from_value(&json!(42)).is_err());
        assert!(ExperimentDescriptor::from_value(&json!({"a": [], "b": []})).is_err());
        assert!(matches!(
            ExperimentDescriptor::from_value(&json!({"a": 3})),
            Err(DomainError::InvalidGoalsFormat { .. })
        ));
    }
}
