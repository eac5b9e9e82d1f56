//! Trial metrics
//!
//! Counters go through the `metrics` facade. The library never installs a
//! recorder; without one these calls are no-ops.

use metrics::{counter, gauge};

/// Publish static build information
pub fn register_default_metrics() {
    gauge!("split_engine_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a fresh assignment of a visitor to an alternative
pub fn record_trial_started(experiment: &str, alternative: &str) {
    let labels = [
        ("experiment", experiment.to_string()),
        ("alternative", alternative.to_string()),
    ];

    counter!("split_trials_started_total", &labels).increment(1);
}

/// Record one counted completion
pub fn record_trial_completed(experiment: &str, alternative: &str, goal: Option<&str>) {
    let labels = [
        ("experiment", experiment.to_string()),
        ("alternative", alternative.to_string()),
        ("goal", goal_label(goal)),
    ];

    counter!("split_trials_completed_total", &labels).increment(1);
}

/// Record a backing store failure absorbed by fail-over
pub fn record_failover(experiment: Option<&str>) {
    let labels = [("experiment", experiment.unwrap_or("").to_string())];

    counter!("split_failover_total", &labels).increment(1);
}

fn goal_label(goal: Option<&str>) -> String {
    goal.unwrap_or("default").to_string()
}
