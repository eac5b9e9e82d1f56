//! Experiment domain module for A/B testing
//!
//! Types for declaring experiments, normalizing their alternatives, choosing
//! an alternative for a visitor and describing one trial.

mod algorithm;
mod alternative;
mod declaration;
mod descriptor;
mod entity;
mod trial;
mod validation;

// Re-export all public types
pub use algorithm::{Algorithm, RandomSource, SeededRandom, ThreadRandom, WHIPLASH_FAIRNESS_CONSTANT};
pub use alternative::Alternative;
pub use declaration::{
    normalize_alternatives, parse_declarations, parse_goals, DeclaredAlternative,
    ExperimentDeclaration, NormalizedExperiment,
};
pub use descriptor::ExperimentDescriptor;
pub use entity::{Experiment, FINISHED_SUFFIX};
pub use trial::Trial;
pub use validation::{
    validate_alternative, validate_alternatives, validate_experiment_name, validate_goals,
    GOALS_SUFFIX, KEY_SEPARATOR, METRIC_SUFFIX, WEIGHT_TOLERANCE,
};
