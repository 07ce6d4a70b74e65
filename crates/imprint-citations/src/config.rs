//! Configuration for imprint-citations
//!
//! Search tuning, the Zotero web connection and local bibliography policy.
//! Loaded from `~/.imprint/citations.toml` when present.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationsConfig {
    pub search: SearchConfig,
    pub zotero: ZoteroConfig,
    pub local: LocalConfig,
}

/// Fuzzy search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum matches returned by any fuzzy search
    pub max_results: usize,
    /// Minimum similarity (0.0 - 1.0) for a fuzzy token match
    pub fuzzy_threshold: f64,
    /// Minimum interval between debounced searches in milliseconds
    pub min_query_interval_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 1000,
            fuzzy_threshold: 0.85,
            min_query_interval_ms: 250,
        }
    }
}

impl SearchConfig {
    pub fn min_query_interval(&self) -> Duration {
        Duration::from_millis(self.min_query_interval_ms)
    }
}

/// Zotero web API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoteroConfig {
    pub enabled: bool,
    pub user_id: Option<String>,
    pub api_key: Option<String>,
    pub base_url: String,
    pub page_size: u32,
    pub timeout_secs: u64,
    /// Export BibLaTeX through a running Better BibTeX plugin
    pub better_bibtex: bool,
    pub better_bibtex_url: String,
}

impl Default for ZoteroConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user_id: None,
            api_key: None,
            base_url: "https://api.zotero.org".to_string(),
            page_size: 100,
            timeout_secs: 30,
            better_bibtex: false,
            better_bibtex_url: "http://127.0.0.1:23119/better-bibtex/json-rpc".to_string(),
        }
    }
}

/// Local bibliography file policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Extensions of bibliography files we can append entries to
    pub writable_extensions: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            writable_extensions: ["bib", "bibtex", "json", "yaml", "yml"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CitationsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Load and validate a TOML configuration file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Standard location: `~/.imprint/citations.toml`
    pub fn standard_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".imprint").join("citations.toml"))
    }

    /// Load from the standard location, falling back to defaults when absent
    pub fn load_standard() -> Result<Self, ConfigError> {
        match Self::standard_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading citations config from {:?}", path);
                Self::load_from(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.max_results == 0 {
            return Err(ConfigError::Invalid(
                "search.max_results must be positive".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.search.fuzzy_threshold) {
            return Err(ConfigError::Invalid(
                "search.fuzzy_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.zotero.enabled {
            let missing = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
            if missing(&self.zotero.user_id) || missing(&self.zotero.api_key) {
                return Err(ConfigError::Invalid(
                    "zotero.user_id and zotero.api_key are required when zotero is enabled"
                        .to_string(),
                ));
            }
            if self.zotero.page_size == 0 || self.zotero.page_size > 100 {
                return Err(ConfigError::Invalid(
                    "zotero.page_size must be between 1 and 100".to_string(),
                ));
            }
        }

        Ok(())
    }
}
