//! Configuration layer: typed settings with layered precedence (file → env).

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vetrina";
const ENV_PREFIX: &str = "VETRINA";

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_ARTIFACT_ROOT: &str = "public";
const DEFAULT_LAYOUT_DOCUMENT: &str = "layouts.json";
const DEFAULT_COMBINED_SCRIPT_FILE: &str = "layouts.js";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
}

/// Fully-resolved deployment settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub artifacts: ArtifactSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    /// Directory the rendered artifacts are published into.
    pub root: PathBuf,
    /// Path of the JSON layout document.
    pub layout_document: PathBuf,
    /// Object key of the combined script artifact.
    pub combined_script_file: String,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ARTIFACT_ROOT),
            layout_document: PathBuf::from(DEFAULT_LAYOUT_DOCUMENT),
            combined_script_file: DEFAULT_COMBINED_SCRIPT_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub layout_ttl_secs: u64,
    pub item_ttl_secs: u64,
    pub table_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = crate::cache::CacheConfig::default();
        Self {
            layout_ttl_secs: defaults.layout_ttl_secs,
            item_ttl_secs: defaults.item_ttl_secs,
            table_ttl_secs: defaults.table_ttl_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::TRACE,
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}

/// Load settings from the optional config files and the environment.
///
/// Environment variables use the `VETRINA` prefix with `__` separating
/// nesting levels, e.g. `VETRINA__DATABASE__URL`.
pub fn load() -> Result<Settings, SettingsError> {
    let built = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;
    Ok(built.try_deserialize()?)
}
