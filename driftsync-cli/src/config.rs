//! Seed configuration.
//!
//! `driftsyncd` runs against an external catalog in production; the demo
//! daemon seeds an in-memory catalog from a JSON file holding settings,
//! limit groups, and rules.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use driftsync::catalog::models::{LimitGroup, Rule};
use driftsync::catalog::{Catalog, MemoryCatalog};
use driftsync::sizeparse::parse_size_bytes;

use crate::error::CliError;

/// One rule entry: the rule itself plus human-friendly size literals that
/// override the raw byte fields ("1.5G", "64MiB").
#[derive(Debug, Deserialize)]
pub struct SeedRule {
    #[serde(flatten)]
    pub rule: Rule,
    #[serde(default)]
    pub daily_limit: Option<String>,
    #[serde(default)]
    pub min_file_size: Option<String>,
}

/// Root of the seed file.
#[derive(Debug, Default, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub settings: HashMap<String, String>,
    #[serde(default)]
    pub limit_groups: Vec<LimitGroup>,
    #[serde(default)]
    pub rules: Vec<SeedRule>,
}

impl SeedConfig {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let body = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&body)
            .map_err(|e| CliError::Config(format!("parse {}: {}", path.display(), e)))
    }

    /// Builds a seeded in-memory catalog. Rule validation happens here, so
    /// a malformed rule stops the daemon before anything runs.
    pub async fn into_catalog(self) -> Result<Arc<MemoryCatalog>, CliError> {
        let catalog = Arc::new(MemoryCatalog::new());
        for (key, value) in &self.settings {
            catalog.set_setting(key, value).await?;
        }
        for group in self.limit_groups {
            catalog.upsert_limit_group(group).await?;
        }
        for seed_rule in self.rules {
            let mut rule = seed_rule.rule;
            if let Some(literal) = &seed_rule.daily_limit {
                rule.daily_limit_bytes = parse_size_bytes(literal)?;
            }
            if let Some(literal) = &seed_rule.min_file_size {
                rule.min_file_size_bytes = parse_size_bytes(literal)?;
            }
            catalog.upsert_rule(rule).await?;
        }
        Ok(catalog)
    }

    /// The configured log directory, if any.
    pub fn log_dir(&self) -> Option<&str> {
        self.settings
            .get(driftsync::catalog::settings::keys::LOG_DIR)
            .map(String::as_str)
            .filter(|dir| !dir.is_empty())
    }
}
