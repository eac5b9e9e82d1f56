//! Infrastructure services

mod experiment_service;
mod registry;
mod split_service;

pub use experiment_service::ExperimentService;
pub use registry::{
    FailoverHandler, Registry, RegistrySettings, ReloadStrategy, TrialHook,
};
pub use split_service::{CompleteOptions, SplitService};
