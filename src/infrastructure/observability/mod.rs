//! Observability infrastructure - Metrics

mod metrics;

pub use metrics::{
    record_failover, record_trial_completed, record_trial_started, register_default_metrics,
};
