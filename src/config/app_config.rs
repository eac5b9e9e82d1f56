use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::domain::experiment::Algorithm;
use crate::domain::DomainError;
use crate::infrastructure::exclusion::ExclusionRules;
use crate::infrastructure::logging::LoggingConfig;
use crate::infrastructure::services::{RegistrySettings, ReloadStrategy};
use crate::infrastructure::store::StoreConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub split: SplitConfig,
}

/// Engine switches, exclusion lists and declared experiments
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub enabled: bool,
    pub db_failover: bool,
    pub db_failover_allow_parameter_override: bool,
    pub allow_multiple_experiments: bool,
    pub store_override: bool,
    pub algorithm: Algorithm,
    /// Reload on a timer instead of following `config_version`
    pub reload_period_secs: Option<u64>,
    /// Replaces the built-in bot table when set
    pub bots: Option<BTreeMap<String, String>>,
    /// Exact addresses, or `/regex/` patterns
    pub ignore_ip_addresses: Vec<String>,
    /// Declared experiments, keyed by name
    pub experiments: Value,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_failover: false,
            db_failover_allow_parameter_override: false,
            allow_multiple_experiments: false,
            store_override: false,
            algorithm: Algorithm::default(),
            reload_period_secs: None,
            bots: None,
            ignore_ip_addresses: Vec::new(),
            experiments: Value::Null,
        }
    }
}

impl SplitConfig {
    pub fn settings(&self) -> RegistrySettings {
        RegistrySettings {
            enabled: self.enabled,
            db_failover: self.db_failover,
            db_failover_allow_parameter_override: self.db_failover_allow_parameter_override,
            allow_multiple_experiments: self.allow_multiple_experiments,
            store_override: self.store_override,
            algorithm: self.algorithm,
            reload: match self.reload_period_secs {
                Some(secs) => ReloadStrategy::Periodic {
                    period: Duration::from_secs(secs),
                },
                None => ReloadStrategy::Versioned,
            },
        }
    }

    pub fn exclusion_rules(&self) -> Result<ExclusionRules, DomainError> {
        let rules = match &self.bots {
            Some(bots) => ExclusionRules::default().with_bots(bots.clone())?,
            None => ExclusionRules::default(),
        };

        rules.with_ignored_addresses(self.ignore_ip_addresses.iter())
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("SPLIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        let settings = config.split.settings();

        assert!(settings.enabled);
        assert!(!settings.db_failover);
        assert_eq!(settings.reload, ReloadStrategy::Versioned);
        assert_eq!(config.store.backend, "memory");
    }

    #[test]
    fn test_split_section_deserializes() {
        let split: SplitConfig = serde_json::from_value(json!({
            "db_failover": true,
            "algorithm": "whiplash",
            "reload_period_secs": 30,
            "ignore_ip_addresses": ["10.0.0.1", "/^192\\.168\\./"],
            "experiments": {
                "button_color": {"alternatives": ["red", "blue"]}
            }
        }))
        .unwrap();

        let settings = split.settings();
        assert!(settings.db_failover);
        assert_eq!(settings.algorithm, Algorithm::Whiplash);
        assert_eq!(
            settings.reload,
            ReloadStrategy::Periodic {
                period: Duration::from_secs(30)
            }
        );

        let rules = split.exclusion_rules().unwrap();
        assert!(rules.is_ignored_address("10.0.0.1"));
        assert!(rules.is_ignored_address("192.168.4.2"));
        assert!(!rules.is_ignored_address("10.0.0.2"));
        assert!(split.experiments.get("button_color").is_some());
    }

    #[test]
    fn test_custom_bots_replace_defaults() {
        let mut bots = BTreeMap::new();
        bots.insert("acmecrawler".to_string(), "Acme crawler".to_string());
        let split = SplitConfig {
            bots: Some(bots),
            ..Default::default()
        };

        let rules = split.exclusion_rules().unwrap();
        assert!(rules.is_robot("Mozilla/5.0 (compatible; AcmeCrawler/1.0)"));
        assert!(!rules.is_robot("Mozilla/5.0 (compatible; Googlebot/2.1)"));
    }
}
