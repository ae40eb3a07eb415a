use chrono::Utc;
use exchange_trait::Candle;
use signal_core::MarketSnapshot;

/// Simple Moving Average over the trailing `period` values.
pub fn sma(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    let sum: f64 = data[data.len() - period..].iter().sum();
    Some(sum / period as f64)
}

/// Exponential Moving Average, seeded with the SMA of the first `period`
/// values and folded over the remainder.
pub fn ema(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;

    let mut value = seed;
    for &x in &data[period..] {
        value = (x - value) * multiplier + value;
    }
    Some(value)
}

/// Relative Strength Index (Wilder smoothing), latest value.
pub fn rsi(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period + 1 {
        return None;
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for w in data.windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Rolling average of the volumes preceding the current (last) period.
pub fn rolling_avg_volume(volumes: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || volumes.len() < lookback + 1 {
        return None;
    }
    let prior = &volumes[volumes.len() - 1 - lookback..volumes.len() - 1];
    Some(prior.iter().sum::<f64>() / lookback as f64)
}

pub const RSI_PERIOD: usize = 14;
pub const EMA_SHORT_PERIOD: usize = 10;
pub const MA_MID_PERIOD: usize = 50;
pub const MA_LONG_PERIOD: usize = 200;
pub const VOLUME_LOOKBACK: usize = 20;

/// Build a snapshot from recent candles (oldest first) and an optional
/// fresher trade price. Indicators that lack enough history stay `None`.
pub fn build_snapshot(symbol: &str, last_price: Option<f64>, candles: &[Candle]) -> MarketSnapshot {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    MarketSnapshot {
        symbol: symbol.to_string(),
        price: last_price.or_else(|| closes.last().copied()),
        rsi: rsi(&closes, RSI_PERIOD),
        ema10: ema(&closes, EMA_SHORT_PERIOD),
        ma50: sma(&closes, MA_MID_PERIOD),
        ma200: sma(&closes, MA_LONG_PERIOD),
        volume: volumes.last().copied(),
        avg_volume: rolling_avg_volume(&volumes, VOLUME_LOOKBACK),
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_of_constant_series() {
        let data = vec![5.0; 20];
        assert_eq!(sma(&data, 10), Some(5.0));
    }

    #[test]
    fn sma_insufficient_data() {
        assert_eq!(sma(&[1.0, 2.0], 5), None);
        assert_eq!(sma(&[1.0], 0), None);
    }

    #[test]
    fn ema_tracks_recent_values_more() {
        // Flat then a jump: EMA should sit between old and new levels,
        // closer to the jump than the SMA over the same window.
        let mut data = vec![100.0; 20];
        data.extend(vec![110.0; 5]);
        let e = ema(&data, 10).unwrap();
        let s = sma(&data, 10).unwrap();
        assert!(e > 100.0 && e < 110.0);
        assert!(s > 100.0);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let data: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&data, 14), Some(100.0));
    }

    #[test]
    fn rsi_alternating_is_midrange() {
        let data: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let r = rsi(&data, 14).unwrap();
        assert!(r > 30.0 && r < 70.0, "expected midrange RSI, got {}", r);
    }

    #[test]
    fn rolling_avg_excludes_current_period() {
        // 20 periods of volume 10, then a 100 spike as the current period.
        let mut volumes = vec![10.0; 20];
        volumes.push(100.0);
        assert_eq!(rolling_avg_volume(&volumes, 20), Some(10.0));
    }

    #[test]
    fn build_snapshot_without_history() {
        let snap = build_snapshot("BTCUSDT", Some(50_000.0), &[]);
        assert_eq!(snap.price, Some(50_000.0));
        assert!(snap.rsi.is_none());
        assert!(snap.ma200.is_none());
        assert!(snap.volume_ratio().is_none());
    }
}
