//! Exclusion infrastructure - Bot and ignored-address filtering

mod bots;
mod policy;

pub use bots::{build_robot_regex, default_bots, DEFAULT_BOTS, DEFAULT_ROBOT_REGEX};
pub use policy::{ExclusionRules, IgnoredAddress, RequestExclusion};
