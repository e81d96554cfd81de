//! Configuration management for Eaders.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories, with a few environment
//! overrides for deployment secrets.

use crate::error::ConfigError;
use crate::store::Credits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "Eaders";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder value for unconfigured API keys.
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

/// Environment variable overriding `catalog.base_url`.
pub const ENV_CATALOG_BASE_URL: &str = "EADERS_CATALOG_BASE_URL";

/// Environment variable overriding `catalog.api_key`.
pub const ENV_CATALOG_API_KEY: &str = "EADERS_CATALOG_API_KEY";

/// Environment variable overriding `generative.key`.
pub const ENV_GENERATIVE_API_KEY: &str = "EADERS_GENERATIVE_API_KEY";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External catalog service.
    pub catalog: CatalogConfig,

    /// Generative image/text backend.
    pub generative: GenerativeConfig,

    /// Colorization credit amounts.
    pub credits: CreditsConfig,

    /// Image relay server.
    pub relay: RelayConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// External catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL including the API prefix, e.g. `https://komga.local/api/v1`.
    /// Empty means the built-in fixtures are used.
    pub base_url: String,

    /// API key sent with every request.
    pub api_key: String,

    /// Header carrying the API key.
    pub api_key_header: String,

    /// Number of series shown as featured when using the external catalog.
    pub featured_limit: usize,

    /// How long successful catalog responses are reused, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            api_key_header: "X-API-Key".to_string(),
            featured_limit: 4,
            cache_ttl_secs: 3600,
        }
    }
}

impl CatalogConfig {
    /// Checks if an external catalog endpoint is set.
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }
}

/// Generative backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerativeConfig {
    /// API key (required for colorize and enhance).
    pub key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Model used for panel colorization.
    pub image_model: String,

    /// Model used for synopsis rewriting.
    pub text_model: String,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            key: API_KEY_PLACEHOLDER.to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            image_model: "gemini-2.0-flash-exp".to_string(),
            text_model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl GenerativeConfig {
    /// Checks if the API key is configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        !self.key.is_empty() && self.key != API_KEY_PLACEHOLDER
    }
}

/// Credit amounts, as decimals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditsConfig {
    /// Cost of colorizing one page.
    pub colorize_cost: f64,

    /// Amount added by a top-up.
    pub top_up_amount: f64,

    /// Balance before anything was ever stored.
    pub initial_balance: f64,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            colorize_cost: 1.0,
            top_up_amount: 5.0,
            initial_balance: 0.0,
        }
    }
}

impl CreditsConfig {
    pub fn colorize_cost(&self) -> Credits {
        Credits::from_decimal(self.colorize_cost).unwrap_or_default()
    }

    pub fn top_up_amount(&self) -> Credits {
        Credits::from_decimal(self.top_up_amount).unwrap_or_default()
    }

    pub fn initial_balance(&self) -> Credits {
        Credits::from_decimal(self.initial_balance).unwrap_or_default()
    }
}

/// Image relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the relay server binds to.
    pub addr: String,

    /// URL clients use to reach the relay. Empty disables the relay path.
    pub base_url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9002".to_string(),
            base_url: "http://127.0.0.1:9002".to_string(),
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for persisted reader state (bookmarks, ratings, credits...).
    pub state_directory: Option<PathBuf>,
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location and applies
    /// environment overrides.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overrides secrets and endpoints from the environment.
    ///
    /// Blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get(ENV_CATALOG_BASE_URL) {
            self.catalog.base_url = url;
        }
        if let Some(key) = get(ENV_CATALOG_API_KEY) {
            self.catalog.api_key = key;
        }
        if let Some(key) = get(ENV_GENERATIVE_API_KEY) {
            self.generative.key = key;
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.is_configured() {
            url::Url::parse(self.catalog.base_url.trim()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "catalog.base_url".to_string(),
                    message: e.to_string(),
                }
            })?;
        }

        if self.catalog.featured_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "catalog.featured_limit".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if !self.relay.base_url.trim().is_empty() {
            url::Url::parse(self.relay.base_url.trim()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "relay.base_url".to_string(),
                    message: e.to_string(),
                }
            })?;
        }

        let amounts = [
            ("credits.colorize_cost", self.credits.colorize_cost),
            ("credits.top_up_amount", self.credits.top_up_amount),
            ("credits.initial_balance", self.credits.initial_balance),
        ];
        for (key, value) in amounts {
            if Credits::from_decimal(value).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be a non-negative number, got {}", value),
                });
            }
        }

        if self.credits.colorize_cost() == Credits::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "credits.colorize_cost".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the effective state directory, using config or default.
    pub fn state_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.paths.state_directory {
            Ok(dir.clone())
        } else {
            Ok(Self::config_dir()?.join("state"))
        }
    }
}
