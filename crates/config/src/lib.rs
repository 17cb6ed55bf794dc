//! Configuration management for the TTS engine
//!
//! Supports loading configuration from:
//! - TOML/YAML files under the user config root
//! - Environment variables (TTS_ prefix)
//! - Runtime overrides (explicit `Settings` construction in tests)

pub mod paths;
pub mod settings;

pub use paths::{config_root, document_cache_dir, voice_journal_path};
pub use settings::{
    load_settings, ApiKeys, AudioConfig, DefaultsConfig, DocumentConfig, EndpointConfig,
    LocalServerConfig, Settings, TimeoutConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
