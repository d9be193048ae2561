//! # Application Configuration
//!
//! This module defines the configuration structure for the `sqlask-server` and
//! the logic for loading it from a `config.yml` file and environment variables.
//!
//! Layers, lowest priority first:
//! 1. Programmatic defaults (port, database path, decoding bounds).
//! 2. `config.yml`, with `${VAR}` placeholders substituted from the environment.
//! 3. Plain environment variables for top-level keys (`PORT`, `DB_URL`, `MAX_ROWS`).
//! 4. `SQLASK_`-prefixed variables for nested keys (`SQLASK_MODEL__API_URL`).

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use sqlask::types::{DEFAULT_GENERATION_TIMEOUT, DEFAULT_MAX_ROWS};
use sqlask::GenerationOptions;
use std::env;
use std::fs;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::info;

static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}").expect("valid env placeholder regex")
});

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    pub port: u16,
    /// The path to the SQLite database file. Loaded from `DB_URL` env var.
    pub db_url: String,
    /// Upper bound on rows returned by one question.
    pub max_rows: usize,
    /// The served text-to-SQL model.
    pub model: ModelConfig,
    /// Replaces the built-in prompt. Must contain `{question}`; `{schema}` is optional.
    #[serde(default)]
    pub prompt_template: Option<String>,
}

/// Connection and decoding settings for the model server.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// The OpenAI-compatible completions endpoint.
    pub api_url: String,
    /// The API key, which can be null for local servers.
    #[serde(default)]
    pub api_key: Option<String>,
    pub model_name: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub repetition_penalty: f32,
    pub timeout_secs: u64,
}

impl ModelConfig {
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            repetition_penalty: self.repetition_penalty,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Reads a file and substitutes `${VAR}` placeholders from the environment.
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let expanded_content = ENV_PLACEHOLDER.replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });

    Ok(Some(expanded_content.into_owned()))
}

/// Loads the application configuration from a file and environment variables.
///
/// With `config_path_override`, that file must exist. Otherwise `config.yml` next to
/// the crate manifest is used when present, and the service can be configured
/// from the environment alone.
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let defaults = GenerationOptions::default();
    let mut builder = ConfigBuilder::builder()
        // Layer 1: Programmatic defaults.
        .set_default("port", 9090)?
        .set_default("db_url", "sales_data.db")?
        .set_default("max_rows", DEFAULT_MAX_ROWS as i64)?
        .set_default("model.max_new_tokens", i64::from(defaults.max_new_tokens))?
        .set_default("model.temperature", defaults.temperature as f64)?
        .set_default("model.repetition_penalty", defaults.repetition_penalty as f64)?
        .set_default(
            "model.timeout_secs",
            DEFAULT_GENERATION_TIMEOUT.as_secs() as i64,
        )?;

    // Layer 2: Main config file.
    let content = match config_path_override {
        Some(path) => Some(read_and_substitute(path)?.ok_or_else(|| {
            ConfigError::NotFound(format!("Config file not found at '{path}'."))
        })?),
        None => {
            let default_path = format!("{}/config.yml", env!("CARGO_MANIFEST_DIR"));
            let content = read_and_substitute(&default_path)?;
            if content.is_some() {
                info!("Loading configuration from '{default_path}'.");
            } else {
                info!("'{default_path}' not found; using defaults and environment only.");
            }
            content
        }
    };
    if let Some(content) = content {
        builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
    }

    let settings = builder
        // Layer 3: Environment variables for top-level keys like PORT.
        .add_source(Environment::default())
        // Layer 4: Prefixed environment variables for nested overrides.
        .add_source(
            Environment::with_prefix("SQLASK")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let mut config: AppConfig = settings.try_deserialize()?;

    // `${VAR}` substitution leaves an empty string for an unset key.
    if config
        .model
        .api_key
        .as_deref()
        .is_some_and(|key| key.trim().is_empty())
    {
        config.model.api_key = None;
    }
    if config
        .prompt_template
        .as_deref()
        .is_some_and(|template| template.trim().is_empty())
    {
        config.prompt_template = None;
    }

    Ok(config)
}
