//! Store domain - Shared backing store capability
//!
//! Every worker process talks to the same backing store. The core only needs
//! sets, ordered lists, hashes, plain strings and atomic increments from it.

mod repository;

pub use repository::{SplitStore, StoreExt};

#[cfg(any(test, feature = "test-util"))]
pub use repository::mock::UnavailableStore;
