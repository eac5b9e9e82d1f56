//! Allocation algorithms
//!
//! An algorithm maps an experiment's ordered alternatives to the one a new
//! visitor should see. Randomness comes from an injectable [`RandomSource`]
//! so draws can be reproduced in tests.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

use super::alternative::Alternative;
use crate::domain::DomainError;

/// Prior added to both Beta parameters by the bandit so that young arms are
/// still explored.
pub const WHIPLASH_FAIRNESS_CONSTANT: f64 = 7.0;

// ============================================================================
// RandomSource
// ============================================================================

/// Source of randomness for allocation
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// Uniform draw in `[0, 1)`
    fn next_f64(&self) -> f64;

    /// Draw from `Beta(alpha, beta)`
    fn next_beta(&self, alpha: f64, beta: f64) -> f64;
}

/// Random source backed by the thread-local generator
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().r#gen::<f64>()
    }

    fn next_beta(&self, alpha: f64, beta: f64) -> f64 {
        match Beta::new(alpha, beta) {
            Ok(dist) => dist.sample(&mut rand::thread_rng()),
            Err(_) => self.next_f64(),
        }
    }
}

/// Deterministic random source for reproducible allocation
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.with_rng(|rng| rng.r#gen::<f64>())
    }

    fn next_beta(&self, alpha: f64, beta: f64) -> f64 {
        self.with_rng(|rng| match Beta::new(alpha, beta) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.r#gen::<f64>(),
        })
    }
}

// ============================================================================
// Algorithm
// ============================================================================

/// Strategy used to pick an alternative for a new participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Random draw proportional to alternative weights
    #[default]
    WeightedSample,
    /// Multi-armed bandit favouring alternatives that convert better
    Whiplash,
}

impl Algorithm {
    /// Choose an alternative
    ///
    /// A single alternative is returned without touching the random source.
    /// Returns `None` only for an empty slice.
    pub fn choose<'a>(
        &self,
        alternatives: &'a [Alternative],
        random: &dyn RandomSource,
    ) -> Option<&'a Alternative> {
        match alternatives {
            [] => None,
            [only] => Some(only),
            _ => match self {
                Self::WeightedSample => weighted_sample(alternatives, random),
                Self::Whiplash => whiplash(alternatives, random),
            },
        }
    }

    /// Whether choosing depends on participant and completion counters
    pub fn needs_counters(&self) -> bool {
        matches!(self, Self::Whiplash)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedSample => "weighted_sample",
            Self::Whiplash => "whiplash",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().rsplit("::").next().unwrap_or_default();

        match normalized.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "weightedsample" => Ok(Self::WeightedSample),
            "whiplash" => Ok(Self::Whiplash),
            _ => Err(DomainError::invalid_alternative(format!(
                "Unknown allocation algorithm '{}'",
                s
            ))),
        }
    }
}

fn weighted_sample<'a>(
    alternatives: &'a [Alternative],
    random: &dyn RandomSource,
) -> Option<&'a Alternative> {
    let total: f64 = alternatives.iter().map(|a| a.weight()).sum();
    let point = random.next_f64() * total;
    let mut cumulative = 0.0;

    for alternative in alternatives {
        cumulative += alternative.weight();

        if cumulative > point {
            return Some(alternative);
        }
    }

    // Rounding can leave the point just past the last boundary
    alternatives.last()
}

fn whiplash<'a>(
    alternatives: &'a [Alternative],
    random: &dyn RandomSource,
) -> Option<&'a Alternative> {
    let mut best: Option<(&Alternative, f64)> = None;

    for alternative in alternatives {
        let participants = alternative.participant_count().max(0) as f64;
        let misses =
            (alternative.participant_count() - alternative.total_completed_count()).max(0) as f64;
        let guess = random.next_beta(
            participants + WHIPLASH_FAIRNESS_CONSTANT,
            misses + WHIPLASH_FAIRNESS_CONSTANT,
        );

        if best.is_none_or(|(_, top)| guess > top) {
            best = Some((alternative, guess));
        }
    }

    best.map(|(alternative, _)| alternative)
}
