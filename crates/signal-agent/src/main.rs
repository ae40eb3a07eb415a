use std::sync::Arc;
use std::time::Duration;

use alert_dispatcher::{Alert, AlertDispatcher, DispatchConfig, TelegramNotifier};
use anyhow::Result;
use binance_exchange::BinanceClient;
use config_store::SymbolConfigStore;
use exchange_trait::ExchangeClient;
use signal_core::MarketSnapshot;
use throttle_gate::ThrottleGate;
use tokio::signal::unix::SignalKind;
use tokio::time;

mod config;
mod market_feed;
mod metrics;
mod order_gate;
mod pipeline;
#[cfg(test)]
mod pipeline_tests;
mod state_store;
mod trade_executor;

use config::AgentConfig;
use market_feed::MarketFeed;
use metrics::AgentMetrics;
use order_gate::OrderGateLimits;
use pipeline::Pipeline;
use state_store::StateStore;
use trade_executor::TradeExecutor;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting Crypto Signal Watchtower agent");

    // 2. Load configuration (with validation)
    let agent_config = AgentConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Cycle interval: {}s", agent_config.cycle_interval_seconds);
    tracing::info!("  Feed interval: {}s", agent_config.feed_interval_seconds);
    tracing::info!(
        "  Order limits: {} open per symbol, exposure <= {}x trade amount",
        agent_config.max_open_orders_per_symbol,
        agent_config.max_exposure_multiple
    );
    tracing::info!(
        "  Candles: {} x {}",
        agent_config.candle_limit,
        agent_config.candle_interval
    );

    // 3. Exchange client
    let binance = BinanceClient::from_env()?;

    // 4. Safety gate: testnet by default, live requires LIVE_TRADING_APPROVED=yes
    if !binance.is_testnet() {
        let approved = std::env::var("LIVE_TRADING_APPROVED")
            .map(|v| v.eq_ignore_ascii_case("yes"))
            .unwrap_or(false);
        if !approved {
            tracing::error!(
                "BINANCE_BASE_URL points to live trading. \
                 Set LIVE_TRADING_APPROVED=yes to enable, or use \
                 https://testnet.binance.vision for the testnet."
            );
            std::process::exit(1);
        }
        tracing::warn!("LIVE TRADING MODE, real funds at risk");
    } else {
        tracing::info!("Testnet mode");
    }
    let exchange: Arc<dyn ExchangeClient> = Arc::new(binance);

    // 5. Database and stores
    sqlx::any::install_default_drivers();
    let db_pool = sqlx::AnyPool::connect(&agent_config.database_url).await?;

    let config_store = Arc::new(SymbolConfigStore::new(db_pool.clone()));
    config_store.init_tables().await?;
    tracing::info!("Config store initialized");

    let state_store = Arc::new(StateStore::new(db_pool.clone()));
    state_store.init_tables().await?;
    tracing::info!("State store initialized");

    let throttle = Arc::new(ThrottleGate::new(db_pool.clone()));
    throttle.init_tables().await?;
    tracing::info!("Throttle gate initialized");

    // 6. Alert dispatcher
    let dispatch_config = DispatchConfig::from_env();
    let dispatcher = Arc::new(AlertDispatcher::new(&dispatch_config));

    // 7. Feed, executor, pipeline
    let feed = Arc::new(MarketFeed::new(Arc::clone(&exchange), &agent_config));
    let executor = Arc::new(TradeExecutor::new(
        Arc::clone(&exchange),
        Arc::clone(&state_store),
    ));
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&state_store),
        Arc::clone(&throttle),
        Arc::clone(&dispatcher),
        Arc::clone(&executor),
        OrderGateLimits {
            max_open_orders: agent_config.max_open_orders_per_symbol,
            max_exposure_multiple: agent_config.max_exposure_multiple,
        },
    ));

    // 8. Metrics with optional restore from persisted state
    let mut agent_metrics = AgentMetrics::new(agent_config.metrics_log_interval_cycles);
    if let Ok(Some(saved)) = state_store.load_metrics().await {
        agent_metrics.restore_from_json(&saved);
    }
    let mut cycle = state_store.load_cycle().await.unwrap_or(0);

    // 9. Startup connectivity checks
    sqlx::query("SELECT 1")
        .execute(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database connectivity check failed: {}", e))?;
    tracing::info!("Startup check: database OK");

    exchange
        .get_ticker("BTCUSDT")
        .await
        .map_err(|e| anyhow::anyhow!("Exchange connectivity check failed: {}", e))?;
    tracing::info!("Startup check: {} market data OK", exchange.exchange_name());

    // Signed-endpoint check (warn-only: alerts still work without trading
    // credentials, orders will be recorded as failed).
    match exchange.get_balances().await {
        Ok(balances) => tracing::info!(
            "Startup check: {} account OK ({} assets)",
            exchange.exchange_name(),
            balances.len()
        ),
        Err(e) => tracing::warn!(
            "Startup check: signed {} API failed ({}), order submission will fail",
            exchange.exchange_name(),
            e
        ),
    }

    // Telegram check (warn-only, not fatal)
    match (
        &dispatch_config.telegram_bot_token,
        &dispatch_config.telegram_chat_id,
    ) {
        (Some(token), Some(chat_id)) => {
            let notifier = TelegramNotifier::new(token, chat_id);
            match notifier.check_connectivity().await {
                Ok(()) => tracing::info!("Startup check: Telegram OK"),
                Err(e) => tracing::warn!(
                    "Startup check: Telegram unreachable ({}), alerts will be recorded as blocked",
                    e
                ),
            }
        }
        _ => tracing::warn!("Startup check: Telegram not configured"),
    }

    let tracked = config_store.active_symbols().await?;
    tracing::info!("Tracking {} symbols", tracked.len());

    // 10. Startup notification
    dispatcher.dispatch_background(Alert::lifecycle(
        "Watchtower started",
        format!(
            "Tracking {} symbols | cycle {}s | feed {}s | {}",
            tracked.len(),
            agent_config.cycle_interval_seconds,
            agent_config.feed_interval_seconds,
            if exchange.is_testnet() {
                "testnet"
            } else {
                "LIVE"
            }
        ),
    ));

    // Re-adopt any orders left open by a previous run, then prime the feed
    // before the first evaluation cycle.
    if let Err(e) = executor.reconcile_open_orders(&tracked).await {
        tracing::warn!("Open-order reconciliation failed: {}", e);
    }
    feed.refresh(&tracked).await;

    tracing::info!(
        "Agent is now running. Evaluating every {}s. Press Ctrl+C to stop.",
        agent_config.cycle_interval_seconds
    );

    // Main loop with graceful shutdown (SIGINT + SIGTERM). The feed ticks on
    // its own cadence, independent of the evaluation cycle.
    let mut cycle_interval = time::interval(Duration::from_secs(agent_config.cycle_interval_seconds));
    let mut feed_interval = time::interval(Duration::from_secs(agent_config.feed_interval_seconds));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = feed_interval.tick() => {
                match config_store.active_symbols().await {
                    Ok(symbols) => feed.refresh(&symbols).await,
                    Err(e) => tracing::warn!("Failed to load symbols for feed: {}", e),
                }
            }
            _ = cycle_interval.tick() => {
                cycle += 1;
                if let Err(e) = run_cycle(
                    &config_store,
                    &feed,
                    &pipeline,
                    &agent_config,
                    &mut agent_metrics,
                    cycle,
                )
                .await
                {
                    tracing::error!("Error in evaluation cycle {}: {}", cycle, e);
                }

                // Out-of-band poll of unresolved orders
                if agent_config.order_poll_interval_cycles > 0
                    && cycle % agent_config.order_poll_interval_cycles as i64 == 0
                {
                    if let Err(e) = executor.poll_open_orders().await {
                        tracing::warn!("Open-order poll failed: {}", e);
                    }
                }

                // Persist counters after each cycle
                state_store.save_cycle(cycle).await.ok();
                if let Err(e) = state_store.save_metrics(&agent_metrics.to_json()).await {
                    tracing::debug!("Failed to persist metrics: {}", e);
                }

                // Heartbeat so the operator knows the agent is alive
                if agent_config.heartbeat_interval_cycles > 0
                    && cycle % agent_config.heartbeat_interval_cycles as i64 == 0
                {
                    dispatcher.dispatch_background(Alert::lifecycle(
                        "Heartbeat",
                        format!(
                            "Cycle #{} | {} evaluated, {} alerts sent, {} orders | last cycle {:.1}s",
                            agent_metrics.cycles_run,
                            agent_metrics.symbols_evaluated,
                            agent_metrics.alerts_sent,
                            agent_metrics.orders_submitted,
                            agent_metrics.last_total_duration_ms as f64 / 1000.0,
                        ),
                    ));
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");

                // Final persists
                state_store.save_cycle(cycle).await.ok();
                state_store.save_metrics(&agent_metrics.to_json()).await.ok();
                agent_metrics.log_metrics();

                dispatcher
                    .dispatch(&Alert::lifecycle("Watchtower stopped", "graceful shutdown"))
                    .await;
                break;
            }
        }
    }

    tracing::info!("Agent shut down.");
    Ok(())
}

/// One evaluation cycle: every active symbol runs through the pipeline,
/// concurrently up to the configured bound. Each symbol is independent; one
/// failing never stops the rest.
async fn run_cycle(
    config_store: &Arc<SymbolConfigStore>,
    feed: &Arc<MarketFeed>,
    pipeline: &Arc<Pipeline>,
    agent_config: &AgentConfig,
    metrics: &mut AgentMetrics,
    cycle: i64,
) -> Result<()> {
    let cycle_start = AgentMetrics::start_timer();
    let configs = config_store.list_canonical().await?;
    if configs.is_empty() {
        metrics.finish_cycle(cycle_start);
        tracing::debug!("Cycle #{} complete (no symbols configured)", cycle);
        return Ok(());
    }

    let eval_start = AgentMetrics::start_timer();
    let now = chrono::Utc::now();
    let sem = Arc::new(tokio::sync::Semaphore::new(
        agent_config.max_concurrent_symbols,
    ));
    let mut handles = Vec::with_capacity(configs.len());

    for symbol_config in configs {
        // A missing snapshot still goes through the pipeline: the evaluator
        // fails closed to WAIT, and the throttle gate observes the config
        // fingerprint either way.
        let snapshot = feed
            .snapshot(&symbol_config.symbol)
            .unwrap_or_else(|| MarketSnapshot::empty(&symbol_config.symbol));
        let pipeline = Arc::clone(pipeline);
        let sem = Arc::clone(&sem);

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return (symbol_config.symbol.clone(), Err(anyhow::anyhow!("semaphore closed")));
            };
            let result = pipeline
                .process_symbol(&symbol_config, &snapshot, cycle, now)
                .await;
            (symbol_config.symbol.clone(), result)
        }));
    }

    for handle in handles {
        let Ok((symbol, result)) = handle.await else {
            continue;
        };
        match result {
            Ok(outcome) => {
                metrics.symbols_evaluated += 1;
                if outcome.throttled {
                    metrics.emissions_throttled += 1;
                }
                if outcome.alert_sent || outcome.alert_blocked {
                    metrics.decisions_emitted += 1;
                }
                if outcome.alert_sent {
                    metrics.alerts_sent += 1;
                }
                if outcome.alert_blocked {
                    metrics.alerts_blocked += 1;
                }
                if outcome.order_submitted {
                    metrics.orders_submitted += 1;
                }
                if outcome.order_skipped {
                    metrics.orders_skipped += 1;
                }
                if outcome.order_failed {
                    metrics.orders_failed += 1;
                }
            }
            Err(e) => {
                tracing::error!("Pipeline failed for {}: {:#}", symbol, e);
            }
        }
    }
    metrics.record_eval_duration(eval_start);

    metrics.finish_cycle(cycle_start);
    tracing::info!(
        "Cycle #{} complete in {:.1}s ({} evaluated, {} emitted, {} throttled)",
        cycle,
        metrics.last_total_duration_ms as f64 / 1000.0,
        metrics.symbols_evaluated,
        metrics.decisions_emitted,
        metrics.emissions_throttled,
    );
    Ok(())
}
