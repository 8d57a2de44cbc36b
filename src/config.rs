//! Service configuration
//!
//! Loaded from a YAML file, then overridden from the environment so that
//! secrets (store key, inference token) never have to live in the file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::vitals::{LayoutMode, RotationScope};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub vitals: VitalsConfig,
    pub inference: InferenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Rest,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::Rest,
            url: None,
            key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    pub layout: LayoutMode,
    pub scope: RotationScope,
    /// Number of rotation slots (days of retained history).
    pub depth: usize,
    pub slot_prefix: String,
    pub flat_table: String,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        VitalsConfig {
            layout: LayoutMode::Auto,
            scope: RotationScope::Patient,
            depth: 5,
            slot_prefix: "vitals_day_".to_string(),
            flat_table: "patient_vitals_timeseries".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub url: String,
    pub model: String,
    pub token: Option<String>,
    pub max_new_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            url: "https://api-inference.huggingface.co/models".to_string(),
            model: "aaditya/Llama3-OpenBioLLM-8B".to_string(),
            token: None,
            max_new_tokens: 400,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// Read `path` (defaults when it does not exist), apply environment
/// overrides and validate.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut config = if path.exists() {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse_config(&raw)?
    } else {
        Config::default()
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(raw)?)
}

pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("SUPABASE_URL") {
        config.store.url = Some(url);
    }
    if let Some(key) = lookup("SUPABASE_KEY") {
        config.store.key = Some(key);
    }
    if let Some(token) = lookup("HF_TOKEN") {
        config.inference.token = Some(token);
    }
    if let Some(port) = lookup("VITALSYNC_PORT") {
        config.api.port = port
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("VITALSYNC_PORT is not a port: {}", port)))?;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.vitals.depth == 0 {
        return Err(ConfigError::Invalid("vitals.depth must be at least 1".to_string()));
    }
    if config.store.backend == StoreBackend::Rest
        && (config.store.url.is_none() || config.store.key.is_none())
    {
        return Err(ConfigError::Invalid(
            "store.url and store.key (or SUPABASE_URL and SUPABASE_KEY) are required for the rest backend"
                .to_string(),
        ));
    }
    Ok(())
}
