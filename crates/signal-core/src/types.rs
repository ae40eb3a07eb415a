use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of an emission: alerts and orders are tracked per (symbol, side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ternary per-cycle decision for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    Wait,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Sell => "SELL",
            Decision::Wait => "WAIT",
        }
    }

    /// Emission side for a non-WAIT decision.
    pub fn side(&self) -> Option<Side> {
        match self {
            Decision::Buy => Some(Side::Buy),
            Decision::Sell => Some(Side::Sell),
            Decision::Wait => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest per-symbol market state, written by the feed on its own cadence.
/// Readers tolerate staleness; missing indicators stay `None` rather than 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Option<f64>,
    pub rsi: Option<f64>,
    pub ema10: Option<f64>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub volume: Option<f64>,
    pub avg_volume: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: None,
            rsi: None,
            ema10: None,
            ma50: None,
            ma200: None,
            volume: None,
            avg_volume: None,
            fetched_at: Utc::now(),
        }
    }

    /// Current-period volume over rolling average volume, when both exist
    /// and the average is meaningful.
    pub fn volume_ratio(&self) -> Option<f64> {
        match (self.volume, self.avg_volume) {
            (Some(v), Some(avg)) if avg > 0.0 => Some(v / avg),
            _ => None,
        }
    }
}

/// Per-symbol configuration, mutated by the dashboard and read by the
/// evaluator and throttle gate every cycle. Numeric fields that admit zero
/// are `Option` — `None` means unset, `Some(0.0)` is a real value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub id: Option<i64>,
    pub symbol: String,
    /// Master alert switch.
    pub alerts_enabled: bool,
    pub buy_alerts_enabled: bool,
    pub sell_alerts_enabled: bool,
    pub trading_enabled: bool,
    /// Order size in quote currency (USD).
    pub trade_amount: Option<f64>,
    pub cooldown_minutes: i64,
    pub min_price_change_percent: f64,
    pub min_volume_ratio: Option<f64>,
    pub require_ema10: bool,
    pub require_ma50: bool,
    pub require_ma200: bool,
    pub rsi_buy_ceiling: Option<f64>,
    pub rsi_sell_floor: Option<f64>,
    pub buy_target_price: Option<f64>,
    pub sell_target_price: Option<f64>,
    pub strategy_preset: String,
    pub risk_mode: String,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

impl SymbolConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            id: None,
            symbol: symbol.into(),
            alerts_enabled: true,
            buy_alerts_enabled: true,
            sell_alerts_enabled: true,
            trading_enabled: false,
            trade_amount: None,
            cooldown_minutes: 60,
            min_price_change_percent: 1.0,
            min_volume_ratio: None,
            require_ema10: false,
            require_ma50: false,
            require_ma200: false,
            rsi_buy_ceiling: None,
            rsi_sell_floor: None,
            buy_target_price: None,
            sell_target_price: None,
            strategy_preset: "default".to_string(),
            risk_mode: "normal".to_string(),
            deleted: false,
            updated_at: Utc::now(),
        }
    }

    /// Whether any moving-average check is requested.
    pub fn requires_moving_averages(&self) -> bool {
        self.require_ema10 || self.require_ma50 || self.require_ma200
    }

    /// Alert switch for one side, gated by the master switch.
    pub fn alerts_enabled_for(&self, side: Side) -> bool {
        self.alerts_enabled
            && match side {
                Side::Buy => self.buy_alerts_enabled,
                Side::Sell => self.sell_alerts_enabled,
            }
    }
}

/// Named sub-conditions for one side. `None` means the condition is not
/// applicable under the current config and is excluded from the index
/// denominator — never counted as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionSet {
    pub rsi_ok: Option<bool>,
    pub ma_ok: Option<bool>,
    pub volume_ok: Option<bool>,
    pub target_ok: Option<bool>,
}

impl ConditionSet {
    fn flags(&self) -> [Option<bool>; 4] {
        [self.rsi_ok, self.ma_ok, self.volume_ok, self.target_ok]
    }

    pub fn applicable(&self) -> usize {
        self.flags().iter().filter(|f| f.is_some()).count()
    }

    pub fn satisfied(&self) -> usize {
        self.flags().iter().filter(|f| **f == Some(true)).count()
    }

    /// True iff at least one condition applies and every applicable one holds.
    pub fn all_satisfied(&self) -> bool {
        self.applicable() > 0 && self.satisfied() == self.applicable()
    }

    /// Completion percentage over applicable conditions; `None` when nothing
    /// applies.
    pub fn completion_index(&self) -> Option<u8> {
        let applicable = self.applicable();
        if applicable == 0 {
            return None;
        }
        Some((100.0 * self.satisfied() as f64 / applicable as f64).round() as u8)
    }
}

/// Transient evaluator output; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub symbol: String,
    pub decision: Decision,
    pub buy: ConditionSet,
    pub sell: ConditionSet,
    /// Completion index for the side that produced the decision; for WAIT,
    /// progress toward the buy side when it applies, else the sell side.
    pub index: Option<u8>,
}

/// Reason codes for skipping order submission. These gate orders only —
/// they must never influence alert delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSkipReason {
    TradingDisabled,
    ZeroTradeAmount,
    MissingIndicators,
    OpenOrderLimit,
    ExposureLimit,
}

impl OrderSkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            OrderSkipReason::TradingDisabled => "trading_disabled",
            OrderSkipReason::ZeroTradeAmount => "zero_trade_amount",
            OrderSkipReason::MissingIndicators => "missing_indicators",
            OrderSkipReason::OpenOrderLimit => "open_order_limit",
            OrderSkipReason::ExposureLimit => "exposure_limit",
        }
    }
}

impl std::fmt::Display for OrderSkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
