use chrono::{Duration, Utc};
use signal_core::SymbolConfig;

use crate::store::{select_canonical, SymbolConfigStore};

async fn setup_store() -> SymbolConfigStore {
    sqlx::any::install_default_drivers();
    let pool = sqlx::any::AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite");

    let store = SymbolConfigStore::new(pool);
    store.init_tables().await.unwrap();
    store
}

fn config_at(symbol: &str, id: i64, minutes_ago: i64) -> SymbolConfig {
    let mut c = SymbolConfig::new(symbol);
    c.id = Some(id);
    c.updated_at = Utc::now() - Duration::minutes(minutes_ago);
    c
}

#[test]
fn canonical_prefers_most_recent_non_deleted() {
    let old = config_at("BTCUSDT", 1, 60);
    let new = config_at("BTCUSDT", 2, 5);
    let winner = select_canonical(vec![old, new]).unwrap();
    assert_eq!(winner.id, Some(2));
}

#[test]
fn canonical_skips_deleted_rows() {
    let mut newest = config_at("BTCUSDT", 3, 1);
    newest.deleted = true;
    let older = config_at("BTCUSDT", 2, 30);
    let winner = select_canonical(vec![newest, older]).unwrap();
    assert_eq!(winner.id, Some(2));
}

#[test]
fn canonical_prefers_alert_enabled_over_newer_disabled() {
    let mut newer_muted = config_at("BTCUSDT", 4, 1);
    newer_muted.alerts_enabled = false;
    let older_enabled = config_at("BTCUSDT", 3, 30);
    let winner = select_canonical(vec![newer_muted, older_enabled]).unwrap();
    assert_eq!(winner.id, Some(3));
}

#[test]
fn canonical_is_none_when_all_deleted() {
    let mut only = config_at("BTCUSDT", 1, 5);
    only.deleted = true;
    assert!(select_canonical(vec![only]).is_none());
}

#[test]
fn canonical_is_stable_across_input_orderings() {
    let a = config_at("BTCUSDT", 1, 60);
    let b = config_at("BTCUSDT", 2, 5);
    let c = config_at("BTCUSDT", 3, 5);
    // Same updated_at for ids 2 and 3: id breaks the tie deterministically.
    let forward = select_canonical(vec![a.clone(), b.clone(), c.clone()]).unwrap();
    let reverse = select_canonical(vec![c, b, a]).unwrap();
    assert_eq!(forward.id, reverse.id);
    assert_eq!(forward.id, Some(3));
}

#[tokio::test]
async fn save_and_resolve_duplicates() {
    let store = setup_store().await;

    let mut first = SymbolConfig::new("ETHUSDT");
    first.trade_amount = Some(25.0);
    store.save(&first).await.unwrap();

    let mut second = SymbolConfig::new("ETHUSDT");
    second.trade_amount = Some(50.0);
    let second_id = store.save(&second).await.unwrap();

    let rows = store.candidates("ETHUSDT").await.unwrap();
    assert_eq!(rows.len(), 2);

    let canonical = store.canonical("ETHUSDT").await.unwrap().unwrap();
    assert_eq!(canonical.id, Some(second_id));
    assert_eq!(canonical.trade_amount, Some(50.0));
}

#[tokio::test]
async fn soft_delete_removes_symbol_from_active_list() {
    let store = setup_store().await;
    store.save(&SymbolConfig::new("BTCUSDT")).await.unwrap();
    store.save(&SymbolConfig::new("ETHUSDT")).await.unwrap();

    assert_eq!(store.active_symbols().await.unwrap().len(), 2);

    store.soft_delete("BTCUSDT").await.unwrap();
    let active = store.active_symbols().await.unwrap();
    assert_eq!(active, vec!["ETHUSDT".to_string()]);
    assert!(store.canonical("BTCUSDT").await.unwrap().is_none());
}

#[tokio::test]
async fn optional_zero_round_trips_as_a_value() {
    // Zero is a real value, not "unset": it must survive a round trip.
    let store = setup_store().await;
    let mut config = SymbolConfig::new("BTCUSDT");
    config.trade_amount = Some(0.0);
    config.min_volume_ratio = None;
    store.save(&config).await.unwrap();

    let loaded = store.canonical("BTCUSDT").await.unwrap().unwrap();
    assert_eq!(loaded.trade_amount, Some(0.0));
    assert_eq!(loaded.min_volume_ratio, None);
}
