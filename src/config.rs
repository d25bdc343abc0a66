use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::EngineSettings;

/// Application configuration
///
/// `directory` and `database` are optional; without them the service runs
/// against in-memory stores.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub directory: Option<DirectorySettings>,
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub cache: Option<CacheSettings>,
    #[serde(default)]
    pub advisory: AdvisorySettings,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySettings {
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    pub database_id: String,
    #[serde(default = "default_demandes_collection")]
    pub demandes_collection: String,
    #[serde(default = "default_professionals_collection")]
    pub professionals_collection: String,
    #[serde(default = "default_availability_collection")]
    pub availability_collection: String,
    pub timeout_secs: Option<u64>,
}

fn default_demandes_collection() -> String { "demandes".to_string() }
fn default_professionals_collection() -> String { "professionals".to_string() }
fn default_availability_collection() -> String { "availability_slots".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub redis_url: String,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorySettings {
    /// Generate endpoint; advisory is disabled when absent
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_advisory_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_advisory_max_candidates")]
    pub max_candidates: usize,
    /// Used for prompt wording; the applied bound comes from the run config
    #[serde(default = "default_advisory_max_adjustment")]
    pub max_adjustment: f64,
}

impl Default for AdvisorySettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_advisory_timeout_ms(),
            max_candidates: default_advisory_max_candidates(),
            max_adjustment: default_advisory_max_adjustment(),
        }
    }
}

fn default_advisory_timeout_ms() -> u64 { 20_000 }
fn default_advisory_max_candidates() -> usize { 20 }
fn default_advisory_max_adjustment() -> f64 { 0.1 }

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

fn default_max_concurrent_fetches() -> usize { 8 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. `config/default.toml`
    /// 2. `config/local.toml`
    /// 3. Environment variables prefixed with `RECO__`,
    ///    e.g. `RECO__SERVER__PORT` -> `server.port`
    /// 4. `DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        apply_env_overrides(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        settings.try_deserialize()
    }

    /// Engine tuning derived from the `engine` and `advisory` sections
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_concurrent_fetches: self.engine.max_concurrent_fetches.max(1),
            advisory_timeout: Duration::from_millis(self.advisory.timeout_ms),
            advisory_max_candidates: self.advisory.max_candidates,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix("RECO")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// `DATABASE_URL` takes precedence over any configured database url
fn apply_env_overrides(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}
