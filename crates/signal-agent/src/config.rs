use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Cadences
    pub cycle_interval_seconds: u64,   // evaluation loop, 60
    pub feed_interval_seconds: u64,    // market data refresh, 30
    pub order_poll_interval_cycles: u64, // re-poll open orders every N cycles

    // Order policy
    pub max_open_orders_per_symbol: i64,
    pub max_exposure_multiple: f64, // exposure ceiling = multiple x trade amount
    pub candle_interval: String,    // "1h"
    pub candle_limit: usize,        // 250: enough history for MA200

    // Concurrency
    pub max_concurrent_symbols: usize,

    // Feed tolerance
    pub max_feed_failures_before_warn: u32,

    // Telemetry
    pub metrics_log_interval_cycles: u64,
    pub heartbeat_interval_cycles: u64,

    // Database
    pub database_url: String,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            cycle_interval_seconds: env::var("CYCLE_INTERVAL")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            feed_interval_seconds: env::var("FEED_INTERVAL")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            order_poll_interval_cycles: env::var("ORDER_POLL_INTERVAL_CYCLES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
            max_open_orders_per_symbol: env::var("MAX_OPEN_ORDERS_PER_SYMBOL")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            max_exposure_multiple: env::var("MAX_EXPOSURE_MULTIPLE")
                .unwrap_or_else(|_| "3.0".to_string())
                .parse()?,
            candle_interval: env::var("CANDLE_INTERVAL").unwrap_or_else(|_| "1h".to_string()),
            candle_limit: env::var("CANDLE_LIMIT")
                .unwrap_or_else(|_| "250".to_string())
                .parse()?,
            max_concurrent_symbols: env::var("MAX_CONCURRENT_SYMBOLS")
                .unwrap_or_else(|_| "8".to_string())
                .parse()?,
            max_feed_failures_before_warn: env::var("MAX_FEED_FAILURES_BEFORE_WARN")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            metrics_log_interval_cycles: env::var("METRICS_LOG_INTERVAL_CYCLES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            heartbeat_interval_cycles: env::var("HEARTBEAT_INTERVAL_CYCLES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://watchtower.db".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cycle_interval_seconds == 0 {
            bail!("CYCLE_INTERVAL must be at least 1 second");
        }
        if self.feed_interval_seconds == 0 {
            bail!("FEED_INTERVAL must be at least 1 second");
        }
        if self.max_open_orders_per_symbol < 1 {
            bail!("MAX_OPEN_ORDERS_PER_SYMBOL must be at least 1");
        }
        if self.max_exposure_multiple <= 0.0 {
            bail!("MAX_EXPOSURE_MULTIPLE must be positive");
        }
        if self.candle_limit < 210 {
            // MA200 plus the rolling volume window need this much history
            bail!("CANDLE_LIMIT must be at least 210");
        }
        if self.max_concurrent_symbols == 0 {
            bail!("MAX_CONCURRENT_SYMBOLS must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = AgentConfig {
            cycle_interval_seconds: 60,
            feed_interval_seconds: 30,
            order_poll_interval_cycles: 2,
            max_open_orders_per_symbol: 3,
            max_exposure_multiple: 3.0,
            candle_interval: "1h".to_string(),
            candle_limit: 250,
            max_concurrent_symbols: 8,
            max_feed_failures_before_warn: 3,
            metrics_log_interval_cycles: 10,
            heartbeat_interval_cycles: 30,
            database_url: "sqlite::memory:".to_string(),
        };
        assert!(config.validate().is_ok());

        let mut short_history = config.clone();
        short_history.candle_limit = 100;
        assert!(short_history.validate().is_err());

        let mut bad_exposure = config;
        bad_exposure.max_exposure_multiple = 0.0;
        assert!(bad_exposure.validate().is_err());
    }
}
