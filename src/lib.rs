//! Split - A/B testing engine
//!
//! Splits visitors between the alternatives of an experiment and counts
//! their completions, with support for:
//! - Weighted and Whiplash (multi-armed bandit) allocation
//! - Declared experiments with goals, metrics and percentages
//! - Versioned experiments, forced winners and resets
//! - Many workers sharing one backing store through version counters
//! - Fail-over to the control when the backing store is down

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{AppConfig, SplitConfig};
pub use domain::{DomainError, RequestContext};
pub use infrastructure::services::{
    CompleteOptions, ExperimentService, Registry, RegistrySettings, ReloadStrategy, SplitService,
};
