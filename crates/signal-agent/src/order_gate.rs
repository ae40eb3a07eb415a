use signal_core::{MarketSnapshot, OrderSkipReason, SymbolConfig};

/// Agent-level order policy knobs, fixed for the process lifetime.
pub struct OrderGateLimits {
    pub max_open_orders: i64,
    pub max_exposure_multiple: f64,
}

/// Decide whether an approved decision may become an order.
///
/// Every precondition has its own reason code and the checks run in a fixed
/// order so the recorded reason is deterministic. Failing here never touches
/// the alert path; the caller has already dispatched.
pub fn check_order(
    config: &SymbolConfig,
    snapshot: &MarketSnapshot,
    open_orders: i64,
    exposure: f64,
    limits: &OrderGateLimits,
) -> Result<f64, OrderSkipReason> {
    if !config.trading_enabled {
        return Err(OrderSkipReason::TradingDisabled);
    }

    let trade_amount = match config.trade_amount {
        Some(amount) if amount > 0.0 => amount,
        _ => return Err(OrderSkipReason::ZeroTradeAmount),
    };

    // Long-period averages must be present before risking money, regardless
    // of whether the evaluator's config required them for the signal.
    if snapshot.ma50.is_none() || snapshot.ma200.is_none() {
        return Err(OrderSkipReason::MissingIndicators);
    }

    if open_orders >= limits.max_open_orders {
        return Err(OrderSkipReason::OpenOrderLimit);
    }

    if exposure > limits.max_exposure_multiple * trade_amount {
        return Err(OrderSkipReason::ExposureLimit);
    }

    Ok(trade_amount)
}
