//! Visitor domain - Per-visitor persistence and request-scoped strategies

mod context;
mod repository;

pub use context::RequestContext;
pub use repository::{ExclusionPolicy, NeverExclude, NoOverrides, OverrideSource, VisitorStore};

#[cfg(test)]
pub use repository::{MockExclusionPolicy, MockOverrideSource};
