//! Pipeline configuration from the environment (`LISTING_FACTS_*`).

use envconfig::Envconfig;
use thiserror::Error;

use listing_facts_listings::{RuleChain, RuleOrder};

use crate::fact_store::schema::is_valid_identifier;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing configuration: {0}")]
    Missing(&'static str),
}

#[derive(Envconfig, Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    #[envconfig(from = "LISTING_FACTS_DATABASE_URL")]
    pub database_url: Option<String>,
    #[envconfig(from = "LISTING_FACTS_TARGET_TABLE", default = "fact_listing_events")]
    pub target_table: String,
    #[envconfig(from = "LISTING_FACTS_FULL_REFRESH", default = "false")]
    pub full_refresh: bool,
    /// `standard` or `create-first`.
    #[envconfig(from = "LISTING_FACTS_RULE_ORDER", default = "standard")]
    pub rule_order: String,
    #[envconfig(from = "LISTING_FACTS_RETRY_ATTEMPTS", default = "3")]
    pub retry_attempts: u32,
    /// Base backoff, doubled per attempt.
    #[envconfig(from = "LISTING_FACTS_RETRY_BACKOFF_MS", default = "500")]
    pub retry_backoff_ms: u64,
    #[envconfig(from = "LISTING_FACTS_MAX_CONNECTIONS", default = "5")]
    pub max_connections: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            target_table: "fact_listing_events".to_string(),
            full_refresh: false,
            rule_order: RuleOrder::Standard.as_str().to_string(),
            retry_attempts: 3,
            retry_backoff_ms: 500,
            max_connections: 5,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_table.trim().is_empty() {
            return Err(ConfigError::Invalid("target table must not be empty".to_string()));
        }
        if !is_valid_identifier(&self.target_table) {
            return Err(ConfigError::Invalid(format!(
                "target table '{}' is not a plain lower-case identifier",
                self.target_table
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max connections must be at least 1".to_string()));
        }
        self.rule_order()?;
        Ok(())
    }

    pub fn rule_order(&self) -> Result<RuleOrder, ConfigError> {
        self.rule_order
            .parse::<RuleOrder>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn rule_chain(&self) -> Result<RuleChain, ConfigError> {
        Ok(RuleChain::from_order(self.rule_order()?))
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("LISTING_FACTS_DATABASE_URL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> PipelineConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::init_from_hashmap(&env).unwrap()
    }

    #[test]
    fn defaults_match_default_impl() {
        assert_eq!(from_pairs(&[]), PipelineConfig::default());
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn reads_overrides() {
        let config = from_pairs(&[
            ("LISTING_FACTS_DATABASE_URL", "postgres://localhost/facts"),
            ("LISTING_FACTS_TARGET_TABLE", "listing_events_v2"),
            ("LISTING_FACTS_FULL_REFRESH", "true"),
            ("LISTING_FACTS_RULE_ORDER", "create-first"),
            ("LISTING_FACTS_RETRY_ATTEMPTS", "5"),
        ]);
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/facts");
        assert_eq!(config.target_table, "listing_events_v2");
        assert!(config.full_refresh);
        assert_eq!(config.rule_order().unwrap(), RuleOrder::CreateFirst);
        assert_eq!(config.retry_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let bad_order = PipelineConfig {
            rule_order: "random".to_string(),
            ..PipelineConfig::default()
        };
        assert!(matches!(bad_order.validate(), Err(ConfigError::Invalid(_))));

        let bad_table = PipelineConfig {
            target_table: "facts; drop".to_string(),
            ..PipelineConfig::default()
        };
        assert!(bad_table.validate().is_err());

        let empty_table = PipelineConfig {
            target_table: "  ".to_string(),
            ..PipelineConfig::default()
        };
        assert!(empty_table.validate().is_err());
    }

    #[test]
    fn database_url_is_required_when_asked_for() {
        assert_eq!(
            PipelineConfig::default().database_url(),
            Err(ConfigError::Missing("LISTING_FACTS_DATABASE_URL"))
        );
    }
}
