use std::sync::Arc;

use dashmap::DashMap;
use exchange_trait::ExchangeClient;
use signal_core::MarketSnapshot;
use signal_engine::build_snapshot;

use crate::config::AgentConfig;

/// Keeps the latest per-symbol snapshot, refreshed on its own cadence.
///
/// Readers never wait for freshness: a refresh failure leaves the previous
/// snapshot in place and the evaluator works with stale-but-present data.
/// Consecutive failures per symbol are counted so persistent outages show up
/// in the logs without one flaky fetch causing noise.
pub struct MarketFeed {
    exchange: Arc<dyn ExchangeClient>,
    snapshots: DashMap<String, MarketSnapshot>,
    failure_counts: DashMap<String, u32>,
    candle_interval: String,
    candle_limit: usize,
    warn_after_failures: u32,
}

impl MarketFeed {
    pub fn new(exchange: Arc<dyn ExchangeClient>, config: &AgentConfig) -> Self {
        Self {
            exchange,
            snapshots: DashMap::new(),
            failure_counts: DashMap::new(),
            candle_interval: config.candle_interval.clone(),
            candle_limit: config.candle_limit,
            warn_after_failures: config.max_feed_failures_before_warn,
        }
    }

    /// Latest snapshot for a symbol, if one was ever fetched.
    pub fn snapshot(&self, symbol: &str) -> Option<MarketSnapshot> {
        self.snapshots.get(symbol).map(|s| s.clone())
    }

    /// Refresh every tracked symbol. One symbol failing never stops the rest.
    pub async fn refresh(&self, symbols: &[String]) {
        for symbol in symbols {
            match self.fetch_symbol(symbol).await {
                Ok(snapshot) => {
                    self.failure_counts.remove(symbol);
                    self.snapshots.insert(symbol.clone(), snapshot);
                }
                Err(e) => {
                    let failures = {
                        let mut entry = self.failure_counts.entry(symbol.clone()).or_insert(0);
                        *entry += 1;
                        *entry
                    };
                    if failures >= self.warn_after_failures {
                        tracing::warn!(
                            "Market data for {} failing ({} consecutive): {}",
                            symbol,
                            failures,
                            e
                        );
                    } else {
                        tracing::debug!("Market data fetch failed for {}: {}", symbol, e);
                    }
                }
            }
        }
    }

    async fn fetch_symbol(&self, symbol: &str) -> anyhow::Result<MarketSnapshot> {
        let ticker = self.exchange.get_ticker(symbol).await?;
        let candles = self
            .exchange
            .get_candles(symbol, &self.candle_interval, self.candle_limit)
            .await?;
        Ok(build_snapshot(symbol, Some(ticker.price), &candles))
    }
}
