use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Unified exchange types (exchange-agnostic)
// ---------------------------------------------------------------------------

/// Latest traded price and rolling 24h volume for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
    pub volume_24h: Option<f64>,
}

/// One OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Free/locked balance for a single asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

impl AssetBalance {
    pub fn free_decimal(&self) -> Decimal {
        Decimal::from_str(&self.free).unwrap_or_default()
    }
    pub fn locked_decimal(&self) -> Decimal {
        Decimal::from_str(&self.locked).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Market order sized in quote currency (e.g. USD notional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quote_amount: Decimal,
}

impl OrderRequest {
    pub fn buy(symbol: impl Into<String>, quote_amount: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Buy,
            quote_amount,
        }
    }
    pub fn sell(symbol: impl Into<String>, quote_amount: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: OrderSide::Sell,
            quote_amount,
        }
    }
}

/// Exchange-reported order state. Numeric fields arrive as strings on the
/// wire and stay strings here; callers convert with the decimal helpers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub id: String,
    pub symbol: String,
    pub side: String,
    pub status: String,
    pub executed_qty: Option<String>,
    pub cumulative_quote: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl ExchangeOrder {
    pub fn executed_qty_decimal(&self) -> Option<Decimal> {
        self.executed_qty
            .as_ref()
            .and_then(|s| Decimal::from_str(s).ok())
    }
    pub fn cumulative_quote_decimal(&self) -> Option<Decimal> {
        self.cumulative_quote
            .as_ref()
            .and_then(|s| Decimal::from_str(s).ok())
    }
    /// Filled or partially filled.
    pub fn has_fill(&self) -> bool {
        self.executed_qty_decimal()
            .map(|q| q > Decimal::ZERO)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Exchange trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Latest price + 24h volume for a symbol
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker>;

    /// Recent candles, oldest first
    async fn get_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;

    /// Account balances
    async fn get_balances(&self) -> Result<Vec<AssetBalance>>;

    /// Open (unfilled) orders for a symbol
    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>>;

    /// Submit a market order. Fire-and-forget: the returned order may still
    /// be unfilled; poll with `get_order`.
    async fn submit_market_order(&self, order: OrderRequest) -> Result<ExchangeOrder>;

    /// Look up an order by exchange id
    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<ExchangeOrder>;

    /// Whether this client points at a testnet/paper endpoint
    fn is_testnet(&self) -> bool;

    /// Exchange name for logging
    fn exchange_name(&self) -> &str;
}
