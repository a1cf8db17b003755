use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GenebaseError;
use crate::retry::RetryPolicy;
use crate::uniprot::DEFAULT_BASE_URL;

pub const DEFAULT_CONFIG_FILE: &str = "genebase.json";
pub const DEFAULT_TAXONOMY_FILTER: &str = "(taxonomy_id:201174)";

/// On-disk shape of `genebase.json`; every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub taxonomy_filter: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub per_taxon_cap: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<usize>,
    #[serde(default)]
    pub single_entry_attempts: Option<usize>,
    #[serde(default)]
    pub backoff_unit_ms: Option<u64>,
    #[serde(default)]
    pub term_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub taxonomy_filter: String,
    pub base_url: String,
    pub per_taxon_cap: usize,
    pub batch_size: usize,
    pub page_size: usize,
    pub max_attempts: usize,
    pub single_entry_attempts: usize,
    pub backoff_unit_ms: u64,
    pub term_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            taxonomy_filter: DEFAULT_TAXONOMY_FILTER.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            per_taxon_cap: 5,
            batch_size: 200,
            page_size: 500,
            max_attempts: 6,
            single_entry_attempts: 4,
            backoff_unit_ms: 1000,
            term_delay_ms: 1000,
            timeout_secs: 60,
        }
    }
}

impl ResolvedConfig {
    pub fn page_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.backoff_unit())
    }

    pub fn single_entry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.single_entry_attempts, self.backoff_unit())
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn term_delay(&self) -> Duration {
        Duration::from_millis(self.term_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Command-line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub taxonomy_filter: Option<String>,
    pub per_taxon_cap: Option<usize>,
    pub batch_size: Option<usize>,
    pub page_size: Option<usize>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `genebase.json` in the current directory when it
    /// exists. No file at all means defaults.
    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, GenebaseError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| GenebaseError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| GenebaseError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, GenebaseError> {
        let defaults = ResolvedConfig::default();
        let resolved = ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            taxonomy_filter: overrides
                .taxonomy_filter
                .clone()
                .or(config.taxonomy_filter)
                .unwrap_or(defaults.taxonomy_filter),
            base_url: config.base_url.unwrap_or(defaults.base_url),
            per_taxon_cap: overrides
                .per_taxon_cap
                .or(config.per_taxon_cap)
                .unwrap_or(defaults.per_taxon_cap),
            batch_size: overrides
                .batch_size
                .or(config.batch_size)
                .unwrap_or(defaults.batch_size),
            page_size: overrides
                .page_size
                .or(config.page_size)
                .unwrap_or(defaults.page_size),
            max_attempts: config.max_attempts.unwrap_or(defaults.max_attempts),
            single_entry_attempts: config
                .single_entry_attempts
                .unwrap_or(defaults.single_entry_attempts),
            backoff_unit_ms: config.backoff_unit_ms.unwrap_or(defaults.backoff_unit_ms),
            term_delay_ms: config.term_delay_ms.unwrap_or(defaults.term_delay_ms),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
        };

        for (name, value) in [
            ("per_taxon_cap", resolved.per_taxon_cap),
            ("batch_size", resolved.batch_size),
            ("page_size", resolved.page_size),
            ("max_attempts", resolved.max_attempts),
            ("single_entry_attempts", resolved.single_entry_attempts),
        ] {
            if value == 0 {
                return Err(GenebaseError::ConfigParse(format!("{name} must be at least 1")));
            }
        }
        if resolved.taxonomy_filter.trim().is_empty() {
            return Err(GenebaseError::ConfigParse(
                "taxonomy_filter must not be empty".to_string(),
            ));
        }

        Ok(resolved)
    }
}
