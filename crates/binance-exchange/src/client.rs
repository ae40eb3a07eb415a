use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exchange_trait::{
    AssetBalance, Candle, ExchangeClient, ExchangeOrder, OrderRequest, Ticker,
};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::models::{AccountInfo, ApiErrorBody, RawOrder, Ticker24hr};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const TESTNET_MARKER: &str = "testnet";

type HmacSha256 = Hmac<Sha256>;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            // A zero budget would make acquire() spin forever on an empty
            // queue; one request per window is the floor.
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let wait_until = ts.front().unwrap().checked_add(self.window).unwrap();
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for exchange API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    rate_limiter: RateLimiter,
}

impl BinanceClient {
    pub fn new(api_key: String, secret_key: String, base_url: String) -> Result<Self> {
        // Spot API weight budget is 1200/min; stay well under it.
        let rate_limit: usize = std::env::var("BINANCE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600);

        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            secret_key,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("BINANCE_API_KEY")
            .map_err(|_| anyhow!("BINANCE_API_KEY not set"))?;
        let secret_key = std::env::var("BINANCE_SECRET_KEY")
            .map_err(|_| anyhow!("BINANCE_SECRET_KEY not set"))?;
        let base_url = std::env::var("BINANCE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Self::new(api_key, secret_key, base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sign a query string per Binance's HMAC-SHA256 scheme.
    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let mut query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let ts = format!("timestamp={}", Utc::now().timestamp_millis());
        if query.is_empty() {
            query = ts;
        } else {
            query.push('&');
            query.push_str(&ts);
        }
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.rate_limiter.acquire().await;
        let response = builder.header("X-MBX-APIKEY", &self.api_key).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| format!("code {}: {}", e.code, e.msg))
                .unwrap_or(body);
            return Err(anyhow!("Binance API error (HTTP {}): {}", status, detail));
        }

        Ok(response)
    }

    fn convert_order(&self, raw: RawOrder) -> ExchangeOrder {
        let submitted_at = raw
            .timestamp_millis()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        ExchangeOrder {
            id: raw.order_id.to_string(),
            symbol: raw.symbol,
            side: raw.side,
            status: raw.status,
            executed_qty: raw.executed_qty,
            cumulative_quote: raw.cumulative_quote_qty,
            submitted_at,
        }
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, symbol);
        let response = self.send(self.client.get(&url)).await?;
        let raw: Ticker24hr = response.json().await?;

        Ok(Ticker {
            symbol: raw.symbol,
            price: raw
                .last_price
                .parse()
                .map_err(|_| anyhow!("Unparseable price for {}: {}", symbol, raw.last_price))?,
            volume_24h: raw.quote_volume.and_then(|v| v.parse().ok()),
        })
    }

    async fn get_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let response = self.send(self.client.get(&url)).await?;

        // Klines arrive as heterogeneous JSON arrays:
        // [openTime, open, high, low, close, volume, closeTime, ...]
        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() < 6 {
                continue;
            }
            let parse_str = |v: &serde_json::Value| -> Option<f64> {
                v.as_str().and_then(|s| s.parse().ok())
            };
            let open_time = row[0]
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now);
            match (
                parse_str(&row[1]),
                parse_str(&row[2]),
                parse_str(&row[3]),
                parse_str(&row[4]),
                parse_str(&row[5]),
            ) {
                (Some(open), Some(high), Some(low), Some(close), Some(volume)) => {
                    candles.push(Candle {
                        open_time,
                        open,
                        high,
                        low,
                        close,
                        volume,
                    });
                }
                _ => {
                    tracing::warn!("Skipping malformed kline row for {}", symbol);
                }
            }
        }
        Ok(candles)
    }

    async fn get_balances(&self) -> Result<Vec<AssetBalance>> {
        let query = self.signed_query(&[]);
        let url = format!("{}/api/v3/account?{}", self.base_url, query);
        let response = self.send(self.client.get(&url)).await?;
        let info: AccountInfo = response.json().await?;
        if !info.can_trade {
            tracing::warn!("Exchange account has trading disabled; order submission will be rejected");
        }

        Ok(info
            .balances
            .into_iter()
            .map(|b| AssetBalance {
                asset: b.asset,
                free: b.free,
                locked: b.locked,
            })
            .collect())
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>> {
        let query = self.signed_query(&[("symbol", symbol.to_string())]);
        let url = format!("{}/api/v3/openOrders?{}", self.base_url, query);
        let response = self.send(self.client.get(&url)).await?;
        let raw: Vec<RawOrder> = response.json().await?;

        Ok(raw.into_iter().map(|r| self.convert_order(r)).collect())
    }

    async fn submit_market_order(&self, order: OrderRequest) -> Result<ExchangeOrder> {
        tracing::info!(
            "Submitting {} market order for {} ({} quote)",
            order.side.as_str(),
            order.symbol,
            order.quote_amount
        );

        let query = self.signed_query(&[
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quoteOrderQty", order.quote_amount.to_string()),
        ]);
        let url = format!("{}/api/v3/order?{}", self.base_url, query);
        let response = self.send(self.client.post(&url)).await?;
        let raw: RawOrder = response.json().await?;

        tracing::info!("Order accepted: {} (status {})", raw.order_id, raw.status);
        Ok(self.convert_order(raw))
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<ExchangeOrder> {
        let query = self.signed_query(&[
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ]);
        let url = format!("{}/api/v3/order?{}", self.base_url, query);
        let response = self.send(self.client.get(&url)).await?;
        let raw: RawOrder = response.json().await?;

        Ok(self.convert_order(raw))
    }

    fn is_testnet(&self) -> bool {
        self.base_url.contains(TESTNET_MARKER)
    }

    fn exchange_name(&self) -> &str {
        "binance"
    }
}
