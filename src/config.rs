//! TOML configuration loading and validation.
//!
//! ```toml
//! [db]
//! url = "sqlite:data/food.sqlite"
//!
//! [api]
//! base_url = "https://world.openfoodfacts.net/api/v2"
//! user_agent = "food-etl/0.1 (you@example.org)"
//! timeout_secs = 20
//!
//! [pipeline]
//! codes = ["3155250349793", "3017620422003"]
//! ```
//!
//! `config/food-etl.example.toml` ships with placeholder values for
//! `db.url` and `api.base_url`. [`Config::ensure_runnable`] refuses to run
//! the pipeline until both have been edited.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::EtlError;

/// Placeholder shipped in the example config for `db.url`.
pub const DB_URL_PLACEHOLDER: &str = "sqlite:CHANGE_ME.sqlite";

/// Placeholder shipped in the example config for `api.base_url`.
pub const API_BASE_URL_PLACEHOLDER: &str = "https://CHANGE_ME/api/v2";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// sqlx connection string, e.g. `sqlite:data/food.sqlite`.
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    /// Codes processed when none are given on the command line.
    #[serde(default)]
    pub codes: Vec<String>,
}

fn default_user_agent() -> String {
    format!("food-etl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    20
}

impl Config {
    /// Guard against running with missing or placeholder endpoints.
    pub fn ensure_runnable(&self) -> Result<(), EtlError> {
        let db_url = self.db.url.trim();
        if db_url.is_empty() || db_url == DB_URL_PLACEHOLDER {
            return Err(EtlError::Configuration(
                "db.url is not set; edit it in the config file".to_string(),
            ));
        }
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() || base_url == API_BASE_URL_PLACEHOLDER {
            return Err(EtlError::Configuration(
                "api.base_url is not set; edit it in the config file".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Config {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg = parse(
            r#"
            [db]
            url = "sqlite:data/food.sqlite"
            [api]
            base_url = "https://world.openfoodfacts.net/api/v2"
            "#,
        );
        assert_eq!(cfg.api.timeout_secs, 20);
        assert!(cfg.api.user_agent.starts_with("food-etl/"));
        assert!(cfg.pipeline.codes.is_empty());
        assert!(cfg.ensure_runnable().is_ok());
    }

    #[test]
    fn placeholder_db_url_is_rejected() {
        let cfg = parse(&format!(
            r#"
            [db]
            url = "{}"
            [api]
            base_url = "https://world.openfoodfacts.net/api/v2"
            "#,
            DB_URL_PLACEHOLDER
        ));
        let err = cfg.ensure_runnable().unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
        assert!(err.to_string().contains("db.url"));
    }

    #[test]
    fn blank_or_placeholder_base_url_is_rejected() {
        for base in ["", "   ", API_BASE_URL_PLACEHOLDER] {
            let cfg = parse(&format!(
                r#"
                [db]
                url = "sqlite:data/food.sqlite"
                [api]
                base_url = "{}"
                "#,
                base
            ));
            let err = cfg.ensure_runnable().unwrap_err();
            assert!(err.to_string().contains("api.base_url"), "{}", base);
        }
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("food-etl.toml");
        std::fs::write(
            &path,
            r#"
            [db]
            url = "sqlite:data/food.sqlite"
            [api]
            base_url = "https://world.openfoodfacts.net/api/v2"
            timeout_secs = 0
            "#,
        )
        .unwrap();
        assert!(load_config(&path).is_err());
    }
}
