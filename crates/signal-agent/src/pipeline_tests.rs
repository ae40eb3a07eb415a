use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alert_dispatcher::{Alert, AlertDispatcher, DispatchError, NotificationChannel};
use async_trait::async_trait;
use chrono::Utc;
use exchange_trait::{
    AssetBalance, Candle, ExchangeClient, ExchangeOrder, OrderRequest, Ticker,
};
use signal_core::{Decision, MarketSnapshot, Side, SymbolConfig};
use throttle_gate::ThrottleGate;

use crate::order_gate::OrderGateLimits;
use crate::pipeline::Pipeline;
use crate::state_store::StateStore;
use crate::trade_executor::TradeExecutor;

struct MockExchange {
    reject_orders: AtomicBool,
    open_orders: std::sync::Mutex<Vec<ExchangeOrder>>,
}

impl MockExchange {
    fn new() -> Self {
        Self {
            reject_orders: AtomicBool::new(false),
            open_orders: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_ticker(&self, symbol: &str) -> anyhow::Result<Ticker> {
        Ok(Ticker {
            symbol: symbol.to_string(),
            price: 100.0,
            volume_24h: None,
        })
    }

    async fn get_candles(
        &self,
        _symbol: &str,
        _interval: &str,
        _limit: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn get_balances(&self) -> anyhow::Result<Vec<AssetBalance>> {
        Ok(Vec::new())
    }

    async fn get_open_orders(&self, symbol: &str) -> anyhow::Result<Vec<ExchangeOrder>> {
        Ok(self
            .open_orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn submit_market_order(&self, order: OrderRequest) -> anyhow::Result<ExchangeOrder> {
        if self.reject_orders.load(Ordering::SeqCst) {
            anyhow::bail!("exchange rejected order");
        }
        Ok(ExchangeOrder {
            id: format!("mock-{}", rand_suffix()),
            symbol: order.symbol,
            side: order.side.as_str().to_string(),
            status: "FILLED".to_string(),
            executed_qty: Some("1.0".to_string()),
            cumulative_quote: Some(order.quote_amount.to_string()),
            submitted_at: Utc::now(),
        })
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> anyhow::Result<ExchangeOrder> {
        Ok(ExchangeOrder {
            id: order_id.to_string(),
            symbol: symbol.to_string(),
            side: "BUY".to_string(),
            status: "FILLED".to_string(),
            executed_qty: Some("1.0".to_string()),
            cumulative_quote: None,
            submitted_at: Utc::now(),
        })
    }

    fn is_testnet(&self) -> bool {
        true
    }

    fn exchange_name(&self) -> &str {
        "mock"
    }
}

fn rand_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

struct AcceptingChannel;

#[async_trait]
impl NotificationChannel for AcceptingChannel {
    async fn send(&self, _alert: &Alert) -> Result<(), DispatchError> {
        Ok(())
    }
    fn name(&self) -> &str {
        "accepting"
    }
}

struct FailingChannel;

#[async_trait]
impl NotificationChannel for FailingChannel {
    async fn send(&self, _alert: &Alert) -> Result<(), DispatchError> {
        Err(DispatchError::Telegram("unreachable".to_string()))
    }
    fn name(&self) -> &str {
        "failing"
    }
}

struct Fixture {
    pipeline: Pipeline,
    store: Arc<StateStore>,
    exchange: Arc<MockExchange>,
    executor: Arc<TradeExecutor>,
}

async fn fixture(dispatcher: AlertDispatcher) -> Fixture {
    sqlx::any::install_default_drivers();
    // One connection: each sqlite::memory: connection is its own database.
    let pool = sqlx::any::AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");

    let store = Arc::new(StateStore::new(pool.clone()));
    store.init_tables().await.expect("init state tables");

    let throttle = Arc::new(ThrottleGate::new(pool));
    throttle.init_tables().await.expect("init throttle tables");

    let exchange = Arc::new(MockExchange::new());
    let exchange_dyn: Arc<dyn ExchangeClient> = exchange.clone();
    let executor = Arc::new(TradeExecutor::new(exchange_dyn, store.clone()));

    let pipeline = Pipeline::new(
        store.clone(),
        throttle,
        Arc::new(dispatcher),
        executor.clone(),
        OrderGateLimits {
            max_open_orders: 3,
            max_exposure_multiple: 3.0,
        },
    );

    Fixture {
        pipeline,
        store,
        exchange,
        executor,
    }
}

/// Config that produces a BUY decision against [`buy_snapshot`], with no
/// throttle cooldown so every cycle is eligible to emit.
fn buy_config() -> SymbolConfig {
    let mut config = SymbolConfig::new("BTCUSDT");
    config.rsi_buy_ceiling = Some(55.0);
    config.cooldown_minutes = 0;
    config.trading_enabled = true;
    config.trade_amount = Some(10.0);
    config
}

fn buy_snapshot() -> MarketSnapshot {
    let mut snapshot = MarketSnapshot::empty("BTCUSDT");
    snapshot.price = Some(100.0);
    snapshot.rsi = Some(50.0);
    snapshot.ma50 = Some(98.0);
    snapshot.ma200 = Some(95.0);
    snapshot
}

#[tokio::test]
async fn alert_delivery_is_invariant_under_exposure() {
    let fx = fixture(AlertDispatcher::from_channels(vec![Box::new(
        AcceptingChannel,
    )]))
    .await;
    let config = buy_config();
    let snapshot = buy_snapshot();

    // Drive cycles until the exposure ceiling (3 x $10) trips. The alert
    // outcome must not change when the order outcome does.
    let mut saw_skip = false;
    for cycle in 0..6 {
        let outcome = fx
            .pipeline
            .process_symbol(&config, &snapshot, cycle, Utc::now())
            .await
            .expect("pipeline");
        assert_eq!(outcome.decision, Some(Decision::Buy));
        assert!(outcome.alert_sent, "alert must be sent on cycle {}", cycle);
        assert!(!outcome.alert_blocked);
        if outcome.order_skipped {
            saw_skip = true;
        }
    }
    assert!(saw_skip, "exposure limit never tripped");

    // Every persisted record agrees: delivery never blocked, and the later
    // rows carry the exposure skip without touching the delivery flags.
    // Flag columns decode as i64: the Any driver reports SQLite INTEGER
    // columns as BIGINT and refuses a direct `bool` decode.
    let rows: Vec<(i64, i64, Option<String>)> = sqlx::query_as(
        "SELECT delivery_blocked, order_skipped, order_skip_reason
         FROM alert_log WHERE symbol = 'BTCUSDT' ORDER BY cycle",
    )
    .fetch_all(&fx.store.db_pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), 6);
    for (delivery_blocked, order_skipped, reason) in &rows {
        let (delivery_blocked, order_skipped) = (*delivery_blocked != 0, *order_skipped != 0);
        assert!(!delivery_blocked);
        if order_skipped {
            assert_eq!(reason.as_deref(), Some("exposure_limit"));
        }
    }
}

#[tokio::test]
async fn order_skip_never_blocks_the_alert() {
    let fx = fixture(AlertDispatcher::from_channels(vec![Box::new(
        AcceptingChannel,
    )]))
    .await;
    let mut config = buy_config();
    config.trading_enabled = false;

    let outcome = fx
        .pipeline
        .process_symbol(&config, &buy_snapshot(), 1, Utc::now())
        .await
        .unwrap();
    assert!(outcome.alert_sent);
    assert!(outcome.order_skipped);
    assert!(!outcome.order_submitted);

    let (delivery_blocked, order_skipped, reason): (i64, i64, Option<String>) =
        sqlx::query_as(
            "SELECT delivery_blocked, order_skipped, order_skip_reason
             FROM alert_log WHERE symbol = 'BTCUSDT' AND cycle = 1",
        )
        .fetch_one(&fx.store.db_pool)
        .await
        .unwrap();
    let (delivery_blocked, order_skipped) = (delivery_blocked != 0, order_skipped != 0);
    assert!(!delivery_blocked);
    assert!(order_skipped);
    assert_eq!(reason.as_deref(), Some("trading_disabled"));
}

#[tokio::test]
async fn blocked_delivery_does_not_stop_the_order() {
    let fx = fixture(AlertDispatcher::from_channels(vec![Box::new(
        FailingChannel,
    )]))
    .await;

    let outcome = fx
        .pipeline
        .process_symbol(&buy_config(), &buy_snapshot(), 1, Utc::now())
        .await
        .unwrap();
    assert!(outcome.alert_blocked);
    assert!(outcome.order_submitted);

    let (delivery_blocked, block_reason, order_submitted): (i64, Option<String>, i64) =
        sqlx::query_as(
            "SELECT delivery_blocked, delivery_block_reason, order_submitted
             FROM alert_log WHERE symbol = 'BTCUSDT' AND cycle = 1",
        )
        .fetch_one(&fx.store.db_pool)
        .await
        .unwrap();
    let (delivery_blocked, order_submitted) = (delivery_blocked != 0, order_submitted != 0);
    assert!(delivery_blocked);
    assert!(block_reason.unwrap().contains("unreachable"));
    assert!(order_submitted);
}

#[tokio::test]
async fn failed_submission_is_recorded_not_retried() {
    let fx = fixture(AlertDispatcher::from_channels(vec![Box::new(
        AcceptingChannel,
    )]))
    .await;
    fx.exchange.reject_orders.store(true, Ordering::SeqCst);

    let outcome = fx
        .pipeline
        .process_symbol(&buy_config(), &buy_snapshot(), 1, Utc::now())
        .await
        .unwrap();
    assert!(outcome.alert_sent);
    assert!(outcome.order_failed);
    assert!(!outcome.order_submitted);
    assert!(!outcome.order_skipped);

    // Nothing was filled, so the ledger stays empty.
    assert_eq!(fx.store.symbol_exposure("BTCUSDT").await.unwrap(), 0.0);
}

#[tokio::test]
async fn wait_decision_writes_no_alert_row() {
    let fx = fixture(AlertDispatcher::from_channels(vec![Box::new(
        AcceptingChannel,
    )]))
    .await;
    let config = buy_config();
    let mut snapshot = buy_snapshot();
    snapshot.rsi = Some(70.0); // above the buy ceiling

    let outcome = fx
        .pipeline
        .process_symbol(&config, &snapshot, 1, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome.decision, Some(Decision::Wait));
    assert!(!outcome.alert_sent);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alert_log")
        .fetch_one(&fx.store.db_pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn disabled_side_switch_records_guardrail_block() {
    let fx = fixture(AlertDispatcher::from_channels(vec![Box::new(
        AcceptingChannel,
    )]))
    .await;
    let mut config = buy_config();
    config.buy_alerts_enabled = false;

    let outcome = fx
        .pipeline
        .process_symbol(&config, &buy_snapshot(), 1, Utc::now())
        .await
        .unwrap();
    assert!(!outcome.alert_sent);
    assert!(outcome.alert_blocked);
    // The order path is independent of the alert switches.
    assert!(outcome.order_submitted);

    let (delivery_blocked, reason): (i64, Option<String>) = sqlx::query_as(
        "SELECT delivery_blocked, delivery_block_reason
         FROM alert_log WHERE symbol = 'BTCUSDT' AND cycle = 1",
    )
    .fetch_one(&fx.store.db_pool)
    .await
    .unwrap();
    let delivery_blocked = delivery_blocked != 0;
    assert!(delivery_blocked);
    assert!(reason.unwrap().contains("disabled"));
}

#[tokio::test]
async fn sell_decision_fires_sell_side() {
    let fx = fixture(AlertDispatcher::from_channels(vec![Box::new(
        AcceptingChannel,
    )]))
    .await;
    let mut config = buy_config();
    config.rsi_buy_ceiling = None;
    config.rsi_sell_floor = Some(65.0);
    let mut snapshot = buy_snapshot();
    snapshot.rsi = Some(70.0);

    let outcome = fx
        .pipeline
        .process_symbol(&config, &snapshot, 1, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome.decision, Some(Decision::Sell));
    assert!(outcome.alert_sent);

    let (side,): (String,) =
        sqlx::query_as("SELECT side FROM alert_log WHERE symbol = 'BTCUSDT' AND cycle = 1")
            .fetch_one(&fx.store.db_pool)
            .await
            .unwrap();
    assert_eq!(side, Side::Sell.as_str());
}

#[tokio::test]
async fn startup_reconciliation_adopts_exchange_open_orders() {
    let fx = fixture(AlertDispatcher::from_channels(vec![Box::new(
        AcceptingChannel,
    )]))
    .await;
    fx.exchange.open_orders.lock().unwrap().push(ExchangeOrder {
        id: "ex-1".to_string(),
        symbol: "BTCUSDT".to_string(),
        side: "BUY".to_string(),
        status: "NEW".to_string(),
        executed_qty: None,
        cumulative_quote: None,
        submitted_at: Utc::now(),
    });

    fx.executor
        .reconcile_open_orders(&["BTCUSDT".to_string()])
        .await
        .unwrap();

    assert_eq!(fx.store.open_order_count("BTCUSDT").await.unwrap(), 1);
    let unresolved = fx.store.unresolved_orders().await.unwrap();
    assert_eq!(unresolved[0].0, "ex-1");
}
