use std::sync::Arc;

use alert_dispatcher::{Alert, AlertDispatcher, DispatchOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use signal_core::{Decision, MarketSnapshot, OrderSkipReason, Side, SymbolConfig};
use signal_engine::evaluate;
use throttle_gate::{config_fingerprint, ThrottleGate};

use crate::order_gate::{check_order, OrderGateLimits};
use crate::state_store::{AlertRecord, StateStore};
use crate::trade_executor::TradeExecutor;

/// What happened to one symbol in one cycle, for metrics and logging.
#[derive(Debug, Default)]
pub struct SymbolOutcome {
    pub decision: Option<Decision>,
    pub throttled: bool,
    pub alert_sent: bool,
    pub alert_blocked: bool,
    pub order_submitted: bool,
    pub order_skipped: bool,
    pub order_failed: bool,
}

/// Per-symbol pipeline: evaluate, throttle, dispatch, then gate the order.
///
/// The alert is dispatched before the order gate runs, and nothing the order
/// path learns (exposure, open orders, policy skips) can reach back into the
/// already-recorded delivery outcome.
pub struct Pipeline {
    store: Arc<StateStore>,
    throttle: Arc<ThrottleGate>,
    dispatcher: Arc<AlertDispatcher>,
    executor: Arc<TradeExecutor>,
    limits: OrderGateLimits,
}

impl Pipeline {
    pub fn new(
        store: Arc<StateStore>,
        throttle: Arc<ThrottleGate>,
        dispatcher: Arc<AlertDispatcher>,
        executor: Arc<TradeExecutor>,
        limits: OrderGateLimits,
    ) -> Self {
        Self {
            store,
            throttle,
            dispatcher,
            executor,
            limits,
        }
    }

    pub async fn process_symbol(
        &self,
        config: &SymbolConfig,
        snapshot: &MarketSnapshot,
        cycle: i64,
        now: DateTime<Utc>,
    ) -> Result<SymbolOutcome> {
        let symbol = &config.symbol;
        let mut outcome = SymbolOutcome::default();

        let decision = evaluate(snapshot, config);
        outcome.decision = Some(decision.decision);
        let decision_side = decision.decision.side();

        // The gate observes both sides every cycle so a config change is
        // persisted (and the force flag armed) even without a decision.
        let fingerprint = config_fingerprint(config);
        let mut verdict = None;
        for side in [Side::Buy, Side::Sell] {
            let decision_price = if decision_side == Some(side) {
                snapshot.price
            } else {
                None
            };
            let result = self
                .throttle
                .evaluate(
                    symbol,
                    side,
                    &fingerprint,
                    decision_price,
                    now,
                    config.cooldown_minutes,
                    config.min_price_change_percent,
                )
                .await?;
            if decision_side == Some(side) {
                verdict = result;
            }
        }

        let Some(side) = decision_side else {
            self.record_status(config, &decision.decision, decision.index, snapshot, &outcome, None)
                .await;
            return Ok(outcome);
        };

        let Some(verdict) = verdict else {
            // Decision without a price cannot happen (the evaluator fails
            // closed on missing price), but a gate no-op is still a no-op.
            self.record_status(config, &decision.decision, decision.index, snapshot, &outcome, None)
                .await;
            return Ok(outcome);
        };

        if !verdict.allowed {
            outcome.throttled = true;
            tracing::info!(
                "Throttled {} {} ({:?})",
                symbol,
                side,
                verdict.outcome
            );
            self.record_status(config, &decision.decision, decision.index, snapshot, &outcome, None)
                .await;
            return Ok(outcome);
        }

        tracing::info!(
            "Emission approved for {} {} ({:?}, index {:?})",
            symbol,
            side,
            verdict.outcome,
            decision.index
        );

        // Alert first. Eligibility is only the decision, the switches, and
        // the throttle approval above.
        let price = snapshot.price.unwrap_or_default();
        let alert = Alert::signal(symbol, side, price, decision.index);
        let (delivery_blocked, delivery_block_reason) = if !config.alerts_enabled_for(side) {
            (true, Some(format!("{} alerts disabled", side)))
        } else {
            match self.dispatcher.dispatch(&alert).await {
                DispatchOutcome::Delivered => (false, None),
                DispatchOutcome::Blocked { reason } => {
                    tracing::warn!("Alert delivery blocked for {} {}: {}", symbol, side, reason);
                    (true, Some(reason))
                }
            }
        };
        outcome.alert_sent = !delivery_blocked;
        outcome.alert_blocked = delivery_blocked;

        // Order gate second, independently. A skip here never alters the
        // delivery outcome recorded above.
        let mut order_skip_reason: Option<OrderSkipReason> = None;
        let mut order_id: Option<String> = None;
        let mut order_error: Option<String> = None;

        let open_orders = self.store.open_order_count(symbol).await?;
        let exposure = self.store.symbol_exposure(symbol).await?;
        match check_order(config, snapshot, open_orders, exposure, &self.limits) {
            Ok(trade_amount) => match self.executor.execute(symbol, side, trade_amount).await {
                Ok(order) => {
                    outcome.order_submitted = true;
                    order_id = Some(order.id);
                }
                Err(e) => {
                    outcome.order_failed = true;
                    order_error = Some(format!("{:#}", e));
                    tracing::warn!("Order submission failed for {} {}: {:#}", symbol, side, e);
                }
            },
            Err(reason) => {
                outcome.order_skipped = true;
                order_skip_reason = Some(reason);
                tracing::info!(
                    "Order skipped for {} {}: {} (open={}, exposure=${:.2})",
                    symbol,
                    side,
                    reason,
                    open_orders,
                    exposure
                );
            }
        }

        // One immutable log row per (symbol, side, cycle).
        let record = AlertRecord {
            symbol: symbol.clone(),
            side,
            message: alert.message.clone(),
            price: snapshot.price,
            delivery_blocked,
            delivery_block_reason,
            order_skipped: outcome.order_skipped,
            order_skip_reason: order_skip_reason.map(|r| r.code().to_string()),
            order_submitted: outcome.order_submitted,
            order_id,
            cycle,
        };
        if !self.store.record_alert(&record).await? {
            tracing::debug!(
                "Alert record for {} {} cycle {} already exists",
                symbol,
                side,
                cycle
            );
        }

        self.record_status(
            config,
            &decision.decision,
            decision.index,
            snapshot,
            &outcome,
            order_error
                .as_deref()
                .or(order_skip_reason.map(|r| r.code())),
        )
        .await;

        Ok(outcome)
    }

    async fn record_status(
        &self,
        config: &SymbolConfig,
        decision: &Decision,
        index: Option<u8>,
        snapshot: &MarketSnapshot,
        outcome: &SymbolOutcome,
        skip_or_error: Option<&str>,
    ) {
        let (skip_reason, error) = if outcome.order_failed {
            (None, skip_or_error)
        } else {
            (skip_or_error, None)
        };
        if let Err(e) = self
            .store
            .update_symbol_status(
                &config.symbol,
                decision.as_str(),
                index.map(i64::from),
                snapshot.price,
                outcome.alert_sent,
                outcome.order_submitted,
                skip_reason,
                error,
            )
            .await
        {
            tracing::debug!("Failed to update status for {}: {}", config.symbol, e);
        }
    }
}
