//! Per-request collaborators of an assignment

use super::repository::{ExclusionPolicy, NeverExclude, NoOverrides, OverrideSource, VisitorStore};

static NO_OVERRIDES: NoOverrides = NoOverrides;
static NEVER_EXCLUDE: NeverExclude = NeverExclude;

/// Visitor store plus the override and exclusion strategies of one request
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    pub visitor: &'a dyn VisitorStore,
    pub overrides: &'a dyn OverrideSource,
    pub exclusion: &'a dyn ExclusionPolicy,
}

impl<'a> RequestContext<'a> {
    /// Context with no overrides that excludes nobody
    pub fn new(visitor: &'a dyn VisitorStore) -> Self {
        Self {
            visitor,
            overrides: &NO_OVERRIDES,
            exclusion: &NEVER_EXCLUDE,
        }
    }

    pub fn with_overrides(mut self, overrides: &'a dyn OverrideSource) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_exclusion(mut self, exclusion: &'a dyn ExclusionPolicy) -> Self {
        self.exclusion = exclusion;
        self
    }
}

impl std::fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("visitor", &self.visitor)
            .field("excluded", &self.exclusion.is_excluded())
            .finish_non_exhaustive()
    }
}
