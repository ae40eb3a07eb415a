use signal_core::{ConditionSet, Decision, MarketSnapshot, SignalDecision, Side, SymbolConfig};

/// Tolerance band around each moving average, as a fraction of the average.
/// Short-period averages get a wider band than long-period ones.
pub const EMA10_TOLERANCE: f64 = 0.02;
pub const MA50_TOLERANCE: f64 = 0.01;
pub const MA200_TOLERANCE: f64 = 0.005;

/// Evaluate one symbol for one cycle. Pure: no clocks, no I/O, no shared
/// state — identical inputs always yield the identical decision.
///
/// BUY is checked first and wins outright when every applicable buy
/// sub-condition holds; a sell result computed in the same cycle can never
/// displace it.
pub fn evaluate(snapshot: &MarketSnapshot, config: &SymbolConfig) -> SignalDecision {
    // Missing price fails closed: no condition can be assessed.
    let price = match snapshot.price {
        Some(p) => p,
        None => {
            return SignalDecision {
                symbol: snapshot.symbol.clone(),
                decision: Decision::Wait,
                buy: ConditionSet::default(),
                sell: ConditionSet::default(),
                index: None,
            };
        }
    };

    let buy = side_conditions(snapshot, config, price, Side::Buy);
    let sell = side_conditions(snapshot, config, price, Side::Sell);

    let decision = if buy.all_satisfied() {
        Decision::Buy
    } else if sell.all_satisfied() {
        Decision::Sell
    } else {
        Decision::Wait
    };

    let index = match decision {
        Decision::Buy => buy.completion_index(),
        Decision::Sell => sell.completion_index(),
        Decision::Wait => buy.completion_index().or_else(|| sell.completion_index()),
    };

    SignalDecision {
        symbol: snapshot.symbol.clone(),
        decision,
        buy,
        sell,
        index,
    }
}

fn side_conditions(
    snapshot: &MarketSnapshot,
    config: &SymbolConfig,
    price: f64,
    side: Side,
) -> ConditionSet {
    // RSI threshold: applicable only when configured; configured but missing
    // data fails closed.
    let rsi_ok = match side {
        Side::Buy => config
            .rsi_buy_ceiling
            .map(|ceiling| snapshot.rsi.map(|r| r <= ceiling).unwrap_or(false)),
        Side::Sell => config
            .rsi_sell_floor
            .map(|floor| snapshot.rsi.map(|r| r >= floor).unwrap_or(false)),
    };

    // Moving averages: applicable when any is required; every required
    // average must pass, and a required average with no value fails closed.
    let ma_ok = if config.requires_moving_averages() {
        let checks = [
            (config.require_ema10, snapshot.ema10, EMA10_TOLERANCE),
            (config.require_ma50, snapshot.ma50, MA50_TOLERANCE),
            (config.require_ma200, snapshot.ma200, MA200_TOLERANCE),
        ];
        let all_pass = checks.iter().all(|&(required, value, tolerance)| {
            if !required {
                return true;
            }
            match value {
                Some(ma) => within_band(price, ma, tolerance, side),
                None => false,
            }
        });
        Some(all_pass)
    } else {
        None
    };

    // Volume ratio: fail-open on missing data, an explicit policy choice so
    // data gaps do not starve alerts.
    let volume_ok = config
        .min_volume_ratio
        .map(|min| snapshot.volume_ratio().map(|r| r >= min).unwrap_or(true));

    // Price target: "at or better" means below the target for buys, above
    // it for sells.
    let target_ok = match side {
        Side::Buy => config.buy_target_price.map(|t| price <= t),
        Side::Sell => config.sell_target_price.map(|t| price >= t),
    };

    ConditionSet {
        rsi_ok,
        ma_ok,
        volume_ok,
        target_ok,
    }
}

/// For buys the price must hold at or above the average minus its band; for
/// sells at or below the average plus its band.
fn within_band(price: f64, ma: f64, tolerance: f64, side: Side) -> bool {
    match side {
        Side::Buy => price >= ma * (1.0 - tolerance),
        Side::Sell => price <= ma * (1.0 + tolerance),
    }
}
