//! Service configuration (`careline.toml`)
//!
//! Looked up in this order, first hit wins:
//! 1. `--config <path>`
//! 2. `./careline.toml`
//! 3. `~/.config/careline/config.toml`
//!
//! Environment variables override the file: `CARELINE_HOST`,
//! `CARELINE_PORT`, `CARELINE_DB`, `CARELINE_AI_BACKEND`.
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [storage]
//! path = "careline.redb"
//!
//! [ai]
//! enabled = true
//! backend = "anthropic"   # anthropic | openai | gemini | ollama
//! timeout_secs = 20
//!
//! [scoring]
//! moderate_threshold = 30
//! high_threshold = 60
//!
//! [[scoring.rules]]
//! id = "elderly"
//! label = "Age over 80"
//! weight = 30
//! when = { age_over = 80 }
//! ```

use crate::ai::{AiConfig, LlmBackend};
use crate::scoring::{RiskRule, RiskScorer, RuleSetError, TierThresholds, DEFAULT_MAX_SCORE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "careline.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid scoring configuration: {0}")]
    Scoring(#[from] RuleSetError),

    #[error("Unknown AI backend '{0}' (expected anthropic, openai, gemini or ollama)")]
    Backend(String),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub scoring: ScoringSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("careline.redb")
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AiSection {
    /// Off means every recommendation comes from the fallback table
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Backend default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_backend(),
            model: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_backend() -> String {
    "anthropic".to_string()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.4
}

impl AiSection {
    /// Client settings for the configured backend
    pub fn client_config(&self) -> Result<AiConfig, ConfigError> {
        let backend: LlmBackend = self
            .backend
            .parse()
            .map_err(|_| ConfigError::Backend(self.backend.clone()))?;
        Ok(AiConfig {
            backend,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoringSection {
    #[serde(default = "default_moderate")]
    pub moderate_threshold: u32,
    #[serde(default = "default_high")]
    pub high_threshold: u32,
    #[serde(default = "default_max_score")]
    pub max_score: u32,
    /// Replaces the built-in rule table when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RiskRule>>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            moderate_threshold: default_moderate(),
            high_threshold: default_high(),
            max_score: default_max_score(),
            rules: None,
        }
    }
}

fn default_moderate() -> u32 {
    TierThresholds::default().moderate
}
fn default_high() -> u32 {
    TierThresholds::default().high
}
fn default_max_score() -> u32 {
    DEFAULT_MAX_SCORE
}

impl ScoringSection {
    /// Build and validate the scorer described by this section
    pub fn scorer(&self) -> Result<RiskScorer, ConfigError> {
        let tiers = TierThresholds {
            moderate: self.moderate_threshold,
            high: self.high_threshold,
        };
        let rules = self
            .rules
            .clone()
            .unwrap_or_else(crate::scoring::default_rules);
        Ok(RiskScorer::new(rules, tiers, self.max_score)?)
    }
}

impl ServiceConfig {
    /// Load configuration from the first file found, then apply
    /// environment overrides.
    ///
    /// An explicit path must exist and parse. A discovered file that cannot
    /// be read or parsed is logged and replaced by defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::read_file(path)?,
            None => match Self::discover() {
                Some(path) => Self::load_file(&path),
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        Self::user_config_path().filter(|p| p.exists())
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str::<ServiceConfig>(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn load_file(path: &Path) -> Self {
        Self::read_file(path).unwrap_or_else(|e| {
            warn!("Failed to load {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Apply `CARELINE_*` overrides using `lookup` to read variables
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = lookup("CARELINE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CARELINE_PORT") {
            match port.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid CARELINE_PORT '{}'", port),
            }
        }
        if let Some(db) = lookup("CARELINE_DB") {
            self.storage.path = PathBuf::from(db);
        }
        if let Some(backend) = lookup("CARELINE_AI_BACKEND") {
            self.ai.backend = backend;
        }
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("careline").join("config.toml"))
    }

    /// Write an example config to `path`, or to the user config path.
    /// An existing file is left alone.
    pub fn init(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::user_config_path().ok_or(ConfigError::NoConfigDir)?,
        };

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        if !config_path.exists() {
            std::fs::write(&config_path, EXAMPLE_CONFIG)?;
        }

        Ok(config_path)
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

const EXAMPLE_CONFIG: &str = r#"# Careline configuration

[server]
# host = "127.0.0.1"
# port = 8080

[storage]
# path = "careline.redb"

[ai]
# Backend: "anthropic", "openai", "gemini" (need an API key in the
# environment) or "ollama" (local, no key)
# enabled = true
# backend = "anthropic"
# model = "claude-3-5-haiku-latest"
# timeout_secs = 20

[scoring]
# moderate_threshold = 30
# high_threshold = 60
# max_score = 100

# Uncomment to replace the built-in rule table.
# Conditions: age_over, prior_stays_over, condition_mentions,
# medications_over, stay_longer_than_days.
#
# [[scoring.rules]]
# id = "age-over-65"
# label = "Age over 65"
# weight = 20
# group = "age"
# when = { age_over = 65 }
"#;
