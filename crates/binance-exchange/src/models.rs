use serde::{Deserialize, Serialize};

/// Subset of /api/v3/ticker/24hr we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticker24hr {
    pub symbol: String,
    #[serde(rename = "lastPrice")]
    pub last_price: String,
    #[serde(rename = "quoteVolume")]
    pub quote_volume: Option<String>,
}

/// /api/v3/account response.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "canTrade")]
    pub can_trade: bool,
    pub balances: Vec<RawBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

/// Order payload shared by POST /api/v3/order, GET /api/v3/order and
/// GET /api/v3/openOrders responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOrder {
    #[serde(rename = "orderId")]
    pub order_id: i64,
    pub symbol: String,
    pub side: String,
    pub status: String,
    #[serde(rename = "executedQty")]
    pub executed_qty: Option<String>,
    #[serde(rename = "cummulativeQuoteQty")]
    pub cumulative_quote_qty: Option<String>,
    /// Present on GET responses; POST returns transactTime instead.
    #[serde(rename = "time")]
    pub time: Option<i64>,
    #[serde(rename = "transactTime")]
    pub transact_time: Option<i64>,
}

impl RawOrder {
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.time.or(self.transact_time)
    }
}

/// Error body Binance returns alongside non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}
