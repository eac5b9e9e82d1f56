//! Request-based visitor exclusion

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;

use crate::domain::visitor::ExclusionPolicy;
use crate::domain::DomainError;

use super::bots::{build_robot_regex, default_bots, DEFAULT_ROBOT_REGEX};

/// One ignored client address
///
/// Written as a plain address for an exact match, or wrapped in slashes
/// (`/^10\.0\./`) for a regex.
#[derive(Debug, Clone)]
pub enum IgnoredAddress {
    Exact(String),
    Pattern(Regex),
}

impl IgnoredAddress {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();

        match raw.strip_prefix('/').and_then(|r| r.strip_suffix('/')) {
            Some(pattern) if !pattern.is_empty() => Regex::new(pattern)
                .map(Self::Pattern)
                .map_err(|e| {
                    DomainError::configuration(format!(
                        "Invalid ignored address pattern '{}': {}",
                        raw, e
                    ))
                }),
            _ => Ok(Self::Exact(raw.to_string())),
        }
    }

    pub fn matches(&self, ip: &str) -> bool {
        match self {
            Self::Exact(address) => address == ip,
            Self::Pattern(pattern) => pattern.is_match(ip),
        }
    }
}

/// Bot table and ignored addresses shared by every request
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    bots: BTreeMap<String, String>,
    robot_regex: Regex,
    ignored_addresses: Vec<IgnoredAddress>,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self {
            bots: default_bots(),
            robot_regex: DEFAULT_ROBOT_REGEX.clone(),
            ignored_addresses: Vec::new(),
        }
    }
}

impl ExclusionRules {
    /// Replace the bot table
    pub fn with_bots(mut self, bots: BTreeMap<String, String>) -> Result<Self, DomainError> {
        self.robot_regex = build_robot_regex(bots.keys().map(String::as_str))?;
        self.bots = bots;
        Ok(self)
    }

    /// Parse and set the ignored addresses
    pub fn with_ignored_addresses<I, S>(mut self, addresses: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored_addresses = addresses
            .into_iter()
            .map(|a| IgnoredAddress::parse(a.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    pub fn bots(&self) -> &BTreeMap<String, String> {
        &self.bots
    }

    pub fn robot_regex(&self) -> &Regex {
        &self.robot_regex
    }

    pub fn is_robot(&self, user_agent: &str) -> bool {
        self.robot_regex.is_match(user_agent)
    }

    pub fn is_ignored_address(&self, ip: &str) -> bool {
        self.ignored_addresses.iter().any(|a| a.matches(ip))
    }
}

/// Exclusion policy built from the current request's user agent and address
///
/// A request without a user agent is not treated as a robot; only a present
/// but empty or punctuation-only agent is.
#[derive(Debug, Clone)]
pub struct RequestExclusion {
    rules: Arc<ExclusionRules>,
    user_agent: Option<String>,
    ip: Option<String>,
}

impl RequestExclusion {
    pub fn new(rules: Arc<ExclusionRules>) -> Self {
        Self {
            rules,
            user_agent: None,
            ip: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn is_robot(&self) -> bool {
        self.user_agent
            .as_deref()
            .is_some_and(|ua| self.rules.is_robot(ua))
    }

    pub fn is_ignored_address(&self) -> bool {
        self.ip
            .as_deref()
            .is_some_and(|ip| self.rules.is_ignored_address(ip))
    }
}

impl ExclusionPolicy for RequestExclusion {
    fn is_excluded(&self) -> bool {
        self.is_robot() || self.is_ignored_address()
    }
}
