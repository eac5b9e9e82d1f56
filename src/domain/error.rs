use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid experiments format: {message}")]
    InvalidExperimentsFormat { message: String },

    #[error("Experiment not found: {name}")]
    ExperimentNotFound { name: String },

    #[error("Invalid goals format: {message}")]
    InvalidGoalsFormat { message: String },

    #[error("Invalid alternative: {message}")]
    InvalidAlternative { message: String },

    #[error("Invalid experiment name: {message}")]
    InvalidExperimentName { message: String },

    #[error("Backing store error: {message}")]
    Store { message: String },

    #[error("Trial hook failed: {message}")]
    Hook { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn invalid_experiments_format(message: impl Into<String>) -> Self {
        Self::InvalidExperimentsFormat {
            message: message.into(),
        }
    }

    pub fn experiment_not_found(name: impl Into<String>) -> Self {
        Self::ExperimentNotFound { name: name.into() }
    }

    pub fn invalid_goals_format(message: impl Into<String>) -> Self {
        Self::InvalidGoalsFormat {
            message: message.into(),
        }
    }

    pub fn invalid_alternative(message: impl Into<String>) -> Self {
        Self::InvalidAlternative {
            message: message.into(),
        }
    }

    pub fn invalid_experiment_name(message: impl Into<String>) -> Self {
        Self::InvalidExperimentName {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Errors the fail-over policy is allowed to swallow.
    ///
    /// Declaration problems are programmer errors and always reach the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Hook { .. })
    }
}
