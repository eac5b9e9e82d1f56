//! Infrastructure layer - Backing stores, visitor stores and services

pub mod exclusion;
pub mod experiment;
pub mod logging;
pub mod observability;
pub mod services;
pub mod store;
pub mod visitor;
