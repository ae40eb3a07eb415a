use sha2::{Digest, Sha256};
use signal_core::SymbolConfig;

/// Stable hash of the configuration fields that affect emission
/// eligibility. Drift between the stored fingerprint and the current one
/// arms the one-shot force flag; fields outside this set never do.
///
/// The encoding is an explicit field-by-field canonical string, so a field
/// added to `SymbolConfig` does not silently change fingerprints.
pub fn config_fingerprint(config: &SymbolConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(encode_bool(config.alerts_enabled));
    hasher.update(encode_bool(config.buy_alerts_enabled));
    hasher.update(encode_bool(config.sell_alerts_enabled));
    hasher.update(encode_bool(config.trading_enabled));
    hasher.update(config.strategy_preset.as_bytes());
    hasher.update(b"|");
    hasher.update(config.cooldown_minutes.to_le_bytes());
    hasher.update(config.min_price_change_percent.to_le_bytes());
    hasher.update(encode_opt(config.trade_amount));
    hex::encode(hasher.finalize())
}

fn encode_bool(b: bool) -> &'static [u8] {
    if b {
        b"1|"
    } else {
        b"0|"
    }
}

/// `None` and `Some(0.0)` must encode differently: zero is a value.
fn encode_opt(v: Option<f64>) -> [u8; 9] {
    let mut out = [0u8; 9];
    match v {
        Some(x) => {
            out[0] = 1;
            out[1..].copy_from_slice(&x.to_le_bytes());
        }
        None => {}
    }
    out
}
