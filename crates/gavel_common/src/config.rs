//! Runtime configuration for the bidding engine.
//!
//! All behaviour knobs can be tuned through a hierarchical, multi-source
//! configuration system backed by the `config` crate.
//!
//! Priority (lowest → highest):
//! 1. Compile-time defaults (`impl Default`).
//! 2. An optional TOML/YAML/JSON file passed at start-up.
//! 3. Environment variables with `GAVEL_` prefix.
//!
//!     GAVEL_RETRY_BACKOFF_MS=50
//!
//! Durations travel as integer milliseconds in files and environment so
//! no custom parsers are needed; the loader converts them once into
//! [`std::time::Duration`] for the rest of the codebase.

use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Frozen engine configuration, passed explicitly to `AuctionEngine`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// How many times a bid transaction is retried after a write
    /// conflict or transient storage failure before surfacing
    /// `ContentionExhausted`.
    pub max_bid_retries: u32,
    /// Base back-off between retries; attempt `n` sleeps `n * backoff`.
    pub retry_backoff: Duration,
    /// How many times proxy resolution restarts from fresh state after
    /// hitting contention mid-resolution.
    pub max_resolution_restarts: u32,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Tick interval for the lifecycle sweep loop.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_bid_retries: 5,
            retry_backoff: Duration::from_millis(25),
            max_resolution_restarts: 3,
            event_capacity: 1024,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Wire representation used by the layered loader.
#[derive(Debug, Deserialize)]
struct RawEngineConfig {
    max_bid_retries: u32,
    retry_backoff_ms: u64,
    max_resolution_restarts: u32,
    event_capacity: usize,
    sweep_interval_ms: u64,
}

impl EngineConfig {
    /// Load configuration from defaults, an optional file and the
    /// environment, in that order of precedence.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let mut builder = Config::builder()
            .set_default("max_bid_retries", defaults.max_bid_retries as i64)?
            .set_default("retry_backoff_ms", defaults.retry_backoff.as_millis() as i64)?
            .set_default(
                "max_resolution_restarts",
                defaults.max_resolution_restarts as i64,
            )?
            .set_default("event_capacity", defaults.event_capacity as i64)?
            .set_default("sweep_interval_ms", defaults.sweep_interval.as_millis() as i64)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("GAVEL")
                .separator("__")
                .try_parsing(true),
        );

        let raw: RawEngineConfig = builder.build()?.try_deserialize()?;
        let cfg = Self {
            max_bid_retries: raw.max_bid_retries,
            retry_backoff: Duration::from_millis(raw.retry_backoff_ms),
            max_resolution_restarts: raw.max_resolution_restarts,
            event_capacity: raw.event_capacity,
            sweep_interval: Duration::from_millis(raw.sweep_interval_ms),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bid_retries == 0 {
            return Err(ConfigError::Message(
                "max_bid_retries must be at least 1".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Message(
                "event_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
