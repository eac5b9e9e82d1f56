//! Experiment infrastructure - Store-backed persistence and counters

mod store_repository;

pub use store_repository::{keys, StoreExperimentRepository};
