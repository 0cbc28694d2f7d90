//! Configuration module for Careline
//!
//! This module handles:
//! - Service configuration (careline.toml)
//! - Environment variable overrides
//! - Scoring rule table customization

mod service_config;

pub use service_config::{
    AiSection, ConfigError, ScoringSection, ServerSection, ServiceConfig, StorageSection,
    CONFIG_FILE_NAME,
};
