// Layered settings: optional TOML file, then EXECBOT__* environment overrides
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::error::{BotError, Result};

pub const ENV_PREFIX: &str = "EXECBOT";

/// Order type used for every entry, overriding what the signal asked for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryOrderType {
    #[default]
    Limit,
    Market,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    /// Seconds between cycles
    pub loop_interval_sec: f64,
    pub log_level: String,
    pub entry_order_type: EntryOrderType,
    /// Reserved for grouped execution. Accepted but has no effect.
    pub enable_aggregation: bool,
    /// Bars requested per `fetch_ohlcv`
    pub ohlcv_limit: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            loop_interval_sec: 1.0,
            log_level: "info".to_string(),
            entry_order_type: EntryOrderType::Limit,
            enable_aggregation: false,
            ohlcv_limit: 500,
        }
    }
}

impl BotConfig {
    /// Reject values the control loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.loop_interval_sec > 0.0 && self.loop_interval_sec.is_finite()) {
            return Err(BotError::Config(format!(
                "bot.loop_interval_sec must be positive and finite, got {}",
                self.loop_interval_sec
            )));
        }
        if self.ohlcv_limit == 0 {
            return Err(BotError::Config("bot.ohlcv_limit must be positive".to_string()));
        }
        if self.enable_aggregation {
            tracing::warn!("bot.enable_aggregation is set but grouped execution is not supported; ignoring");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
    pub max_retries: u32,
    /// First retry delay; doubles on every further attempt
    pub retry_backoff_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 30,
            requests_per_minute: 600,
            max_retries: 3,
            retry_backoff_ms: 2000,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(BotError::Config(
                "gateway.requests_per_minute must be positive".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(BotError::Config(
                "gateway.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bot: BotConfig,
    pub gateway: GatewayConfig,
}

impl Settings {
    /// Load `path` (if it exists) and apply environment overrides,
    /// e.g. `EXECBOT__BOT__ENTRY_ORDER_TYPE=market`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.bot.validate()?;
        self.gateway.validate()
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("execbot={}", level)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
