//! Handles settings for the application. Configuration is written in
//! `config/settings.toml` and can be overridden with `YIELD_GUARDIAN__*`
//! environment variables.
//!
//! See `config/settings.example.toml` for the configuration.

use chrono::{DateTime, TimeDelta, Utc};
use config::{Config, ConfigError, Environment, File};
use engine::{EngineConfig, SpendingMode, Usd, YieldSourceConfig};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config/settings.toml";
const ENV_PREFIX: &str = "YIELD_GUARDIAN";

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Guardian {
    #[serde(default)]
    pub spending_mode: SpendingMode,
    pub external_limit_amount: Usd,
    pub external_limit_period_days: i64,
    #[serde(default)]
    pub external_limit_period_start: Option<DateTime<Utc>>,
    pub destination: String,
    #[serde(default)]
    pub epsilon_usd: Option<Usd>,
    #[serde(default)]
    pub yield_sources: Vec<YieldSourceConfig>,
}

impl Guardian {
    pub fn engine_config(&self) -> Result<EngineConfig, String> {
        let period = TimeDelta::try_days(self.external_limit_period_days)
            .filter(|period| *period > TimeDelta::zero())
            .ok_or_else(|| {
                format!(
                    "external_limit_period_days must be a positive number of days, got {}",
                    self.external_limit_period_days
                )
            })?;

        let mut config = EngineConfig::new(&self.destination, self.external_limit_amount, period)
            .spending_mode(self.spending_mode);
        if let Some(start) = self.external_limit_period_start {
            config = config.period_start(start);
        }
        if let Some(epsilon) = self.epsilon_usd {
            config = config.epsilon(epsilon);
        }
        for source in &self.yield_sources {
            config = config.yield_source(source.clone());
        }

        config.validate().map_err(|err| err.to_string())?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
pub struct Executor {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub explorer_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Telegram {
    pub token: String,
    pub allowed_users: Vec<u64>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub database: Database,
    pub guardian: Guardian,
    pub executor: Executor,
    pub telegram: Option<Telegram>,
}

impl Settings {
    pub fn new(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let settings = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}
