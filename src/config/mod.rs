// src/config/mod.rs
//! Process configuration, built once at startup and passed into components.
//!
//! Tunables come from TOML (`$PIPELINE_CONFIG_PATH`, then
//! `config/pipeline.toml`, then built-in defaults). Secrets come from the
//! environment; a missing required secret is fatal.

pub mod tunables;

use std::fs;
use std::path::{Path, PathBuf};

pub use tunables::{AcquisitionTunables, ApprovalTunables, QueueTunables, Tunables};

use crate::error::ConfigError;

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_EXTRACTOR_BASE_URL: &str = "http://localhost:8787";
const DEFAULT_GENERATOR_BASE_URL: &str = "http://localhost:8788";

/// Connection info and API keys. Never logged; `Debug` redacts keys.
#[derive(Clone)]
pub struct Secrets {
    pub database_path: PathBuf,
    pub extractor_api_key: String,
    pub extractor_base_url: String,
    pub generator_api_key: String,
    pub generator_base_url: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("database_path", &self.database_path)
            .field("extractor_api_key_len", &self.extractor_api_key.len())
            .field("extractor_base_url", &self.extractor_base_url)
            .field("generator_api_key_len", &self.generator_api_key.len())
            .field("generator_base_url", &self.generator_base_url)
            .finish()
    }
}

impl Secrets {
    /// Resolve secrets through `lookup` (normally `std::env::var`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVar(key))
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            database_path: PathBuf::from(required("DATABASE_PATH")?),
            extractor_api_key: required("EXTRACTOR_API_KEY")?,
            extractor_base_url: optional("EXTRACTOR_BASE_URL", DEFAULT_EXTRACTOR_BASE_URL),
            generator_api_key: required("GENERATOR_API_KEY")?,
            generator_base_url: optional("GENERATOR_BASE_URL", DEFAULT_GENERATOR_BASE_URL),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub secrets: Secrets,
    pub tunables: Tunables,
    /// Listen address of the HTTP trigger surface (`BIND_ADDR`).
    pub bind_addr: String,
}

impl PipelineConfig {
    /// Load `.env`, tunables and secrets. Call once from `main`.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let tunables = load_tunables_default()?;
        let secrets = Secrets::from_env()?;
        let bind_addr = std::env::var("BIND_ADDR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        Ok(Self {
            secrets,
            tunables,
            bind_addr,
        })
    }
}

/// Load tunables from an explicit TOML file.
pub fn load_tunables_from(path: &Path) -> Result<Tunables, ConfigError> {
    let content = fs::read_to_string(path)?;
    let t: Tunables = toml::from_str(&content)?;
    Ok(t.sanitized())
}

/// Load tunables using env var + fallbacks:
/// 1) $PIPELINE_CONFIG_PATH
/// 2) config/pipeline.toml
/// 3) built-in defaults
pub fn load_tunables_default() -> Result<Tunables, ConfigError> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(&p);
        if pb.exists() {
            return load_tunables_from(&pb);
        }
        return Err(ConfigError::MissingFile(p));
    }
    let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default_p.exists() {
        return load_tunables_from(&default_p);
    }
    Ok(Tunables::default())
}
