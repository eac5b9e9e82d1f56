//! Domain layer - Core business logic and entities

pub mod error;
pub mod experiment;
pub mod store;
pub mod visitor;

pub use error::DomainError;
pub use experiment::{
    Algorithm, Alternative, DeclaredAlternative, Experiment, ExperimentDeclaration,
    ExperimentDescriptor, NormalizedExperiment, Trial,
};
pub use store::{SplitStore, StoreExt};
pub use visitor::{ExclusionPolicy, OverrideSource, RequestContext, VisitorStore};
