use serde::Deserialize;
use std::env;
use surge_pricing::FactorPolicy;
use surge_strategy::{ServicePolicy, DEFAULT_MAX_AGE_SECS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub service: ServicePolicy,
    #[serde(default)]
    pub pricing: FactorPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// No URL means the in-memory repository
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Age after which the next lookup reloads the strategy table
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: default_max_age_secs(),
        }
    }
}

fn default_max_connections() -> u32 { 5 }
fn default_true() -> bool { true }
fn default_max_age_secs() -> u64 { DEFAULT_MAX_AGE_SECS }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment overlay, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SURGE_DATABASE__URL=postgres://...`
            .add_source(
                config::Environment::with_prefix("SURGE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }
}
