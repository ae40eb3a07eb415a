use chrono::{Duration, Utc};
use signal_core::{Side, SymbolConfig};

use crate::{config_fingerprint, ThrottleGate, ThrottleOutcome};

async fn memory_gate() -> ThrottleGate {
    sqlx::any::install_default_drivers();
    // One connection: each sqlite::memory: connection is its own database.
    let pool = sqlx::any::AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let gate = ThrottleGate::new(pool);
    gate.init_tables().await.expect("init tables");
    gate
}

#[test]
fn fingerprint_ignores_cosmetics_and_tracks_behavior() {
    let mut a = SymbolConfig::new("BTCUSDT");
    let mut b = a.clone();
    b.id = Some(42);
    b.updated_at = a.updated_at + Duration::hours(3);
    assert_eq!(config_fingerprint(&a), config_fingerprint(&b));

    a.trade_amount = Some(10.0);
    b.trade_amount = Some(50.0);
    assert_ne!(config_fingerprint(&a), config_fingerprint(&b));
}

#[test]
fn fingerprint_distinguishes_none_from_zero() {
    let mut a = SymbolConfig::new("BTCUSDT");
    let mut b = a.clone();
    a.trade_amount = None;
    b.trade_amount = Some(0.0);
    assert_ne!(config_fingerprint(&a), config_fingerprint(&b));
}

#[tokio::test]
async fn first_decision_creates_state_and_emits() {
    let gate = memory_gate().await;
    let now = Utc::now();

    let verdict = gate
        .evaluate("BTCUSDT", Side::Buy, "fp1", Some(100.0), now, 5, 1.0)
        .await
        .unwrap()
        .expect("decision present");
    assert!(verdict.allowed);
    assert_eq!(verdict.outcome, ThrottleOutcome::FirstEmission);
    assert_eq!(gate.force_flag("BTCUSDT", Side::Buy).await.unwrap(), Some(false));
}

#[tokio::test]
async fn no_state_and_no_decision_is_a_noop() {
    let gate = memory_gate().await;
    let verdict = gate
        .evaluate("BTCUSDT", Side::Buy, "fp1", None, Utc::now(), 5, 1.0)
        .await
        .unwrap();
    assert!(verdict.is_none());
    assert_eq!(gate.force_flag("BTCUSDT", Side::Buy).await.unwrap(), None);
}

#[tokio::test]
async fn small_move_inside_cooldown_blocks_big_move_passes() {
    let gate = memory_gate().await;
    let emitted_at = Utc::now();
    gate.evaluate("BTCUSDT", Side::Buy, "fp1", Some(100.0), emitted_at, 5, 1.0)
        .await
        .unwrap();

    // Two minutes later, +0.5%: inside cooldown and under threshold.
    let now = emitted_at + Duration::minutes(2);
    let blocked = gate
        .evaluate("BTCUSDT", Side::Buy, "fp1", Some(100.5), now, 5, 1.0)
        .await
        .unwrap()
        .unwrap();
    assert!(!blocked.allowed);
    match blocked.outcome {
        ThrottleOutcome::Blocked {
            elapsed_minutes,
            price_change_percent,
        } => {
            assert_eq!(elapsed_minutes, 2);
            assert!((price_change_percent - 0.5).abs() < 1e-9);
        }
        other => panic!("expected Blocked, got {:?}", other),
    }

    // Same moment, +2%: threshold overrides the cooldown.
    let passed = gate
        .evaluate("BTCUSDT", Side::Buy, "fp1", Some(102.0), now, 5, 1.0)
        .await
        .unwrap()
        .unwrap();
    assert!(passed.allowed);
    assert_eq!(passed.outcome, ThrottleOutcome::PriceMoved);
}

#[tokio::test]
async fn cooldown_elapse_allows_emission() {
    let gate = memory_gate().await;
    let emitted_at = Utc::now();
    gate.evaluate("BTCUSDT", Side::Sell, "fp1", Some(100.0), emitted_at, 5, 1.0)
        .await
        .unwrap();

    let now = emitted_at + Duration::minutes(6);
    let verdict = gate
        .evaluate("BTCUSDT", Side::Sell, "fp1", Some(100.1), now, 5, 1.0)
        .await
        .unwrap()
        .unwrap();
    assert!(verdict.allowed);
    assert_eq!(verdict.outcome, ThrottleOutcome::CooldownElapsed);
}

#[tokio::test]
async fn fingerprint_drift_without_decision_arms_force_flag() {
    let gate = memory_gate().await;
    let emitted_at = Utc::now();
    gate.evaluate("BTCUSDT", Side::Buy, "fp1", Some(100.0), emitted_at, 5, 1.0)
        .await
        .unwrap();

    // Config changed, no decision this cycle. The flag must still be armed.
    let quiet = gate
        .evaluate("BTCUSDT", Side::Buy, "fp2", None, emitted_at + Duration::minutes(1), 5, 1.0)
        .await
        .unwrap();
    assert!(quiet.is_none());
    assert_eq!(gate.force_flag("BTCUSDT", Side::Buy).await.unwrap(), Some(true));

    // Next decision emits immediately even though nothing else qualifies,
    // then the flag is consumed.
    let verdict = gate
        .evaluate("BTCUSDT", Side::Buy, "fp2", Some(100.1), emitted_at + Duration::minutes(2), 5, 1.0)
        .await
        .unwrap()
        .unwrap();
    assert!(verdict.allowed);
    assert_eq!(verdict.outcome, ThrottleOutcome::Forced);
    assert_eq!(gate.force_flag("BTCUSDT", Side::Buy).await.unwrap(), Some(false));

    // The one-shot does not linger.
    let blocked = gate
        .evaluate("BTCUSDT", Side::Buy, "fp2", Some(100.15), emitted_at + Duration::minutes(3), 5, 1.0)
        .await
        .unwrap()
        .unwrap();
    assert!(!blocked.allowed);
}

#[tokio::test]
async fn sides_are_throttled_independently() {
    let gate = memory_gate().await;
    let now = Utc::now();
    gate.evaluate("ETHUSDT", Side::Buy, "fp1", Some(2000.0), now, 5, 1.0)
        .await
        .unwrap();

    // A sell decision one minute later is a first emission for its own key.
    let verdict = gate
        .evaluate("ETHUSDT", Side::Sell, "fp1", Some(2001.0), now + Duration::minutes(1), 5, 1.0)
        .await
        .unwrap()
        .unwrap();
    assert!(verdict.allowed);
    assert_eq!(verdict.outcome, ThrottleOutcome::FirstEmission);
}
