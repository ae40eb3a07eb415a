use std::sync::Arc;

use anyhow::{Context, Result};
use exchange_trait::{ExchangeClient, ExchangeOrder, OrderRequest};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use signal_core::Side;

use crate::state_store::StateStore;

/// Submits quote-sized market orders and settles them against the fill
/// ledger. Submission is fire-and-forget within a cycle; unresolved orders
/// are re-polled out of band.
pub struct TradeExecutor {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<StateStore>,
}

impl TradeExecutor {
    pub fn new(exchange: Arc<dyn ExchangeClient>, store: Arc<StateStore>) -> Self {
        Self { exchange, store }
    }

    /// Submit a market order for `quote_amount` of quote currency. No retry
    /// on failure; the next cycle re-evaluates from scratch.
    pub async fn execute(&self, symbol: &str, side: Side, quote_amount: f64) -> Result<ExchangeOrder> {
        let amount = Decimal::try_from(quote_amount)
            .with_context(|| format!("invalid trade amount {}", quote_amount))?;

        let request = match side {
            Side::Buy => OrderRequest::buy(symbol, amount),
            Side::Sell => OrderRequest::sell(symbol, amount),
        };

        let order = self
            .exchange
            .submit_market_order(request)
            .await
            .with_context(|| format!("submitting {} {} order", symbol, side))?;

        tracing::info!(
            "Submitted {} {} market order for ${:.2} (order {}, status {})",
            symbol,
            side,
            quote_amount,
            order.id,
            order.status
        );

        if order_is_final(&order.status) {
            self.settle(&order, symbol, side, quote_amount).await?;
        } else {
            self.store
                .track_open_order(&order.id, symbol, side, quote_amount, &order.status)
                .await?;
        }

        Ok(order)
    }

    /// Adopt exchange-side open orders into the tracking table. Run once at
    /// startup so orders submitted before a crash or restart are not lost to
    /// the out-of-band poll. Fetch failures skip the symbol; the next
    /// reconciliation or poll picks it up.
    pub async fn reconcile_open_orders(&self, symbols: &[String]) -> Result<()> {
        for symbol in symbols {
            let orders = match self.exchange.get_open_orders(symbol).await {
                Ok(orders) => orders,
                Err(e) => {
                    tracing::warn!("Could not list open orders for {}: {}", symbol, e);
                    continue;
                }
            };
            for order in orders {
                let side = if order.side == "SELL" { Side::Sell } else { Side::Buy };
                // Market orders do not report their requested notional;
                // whatever has filled so far is the best available figure.
                let quote_amount = order
                    .cumulative_quote_decimal()
                    .and_then(|d| d.to_f64())
                    .unwrap_or(0.0);
                self.store
                    .track_open_order(&order.id, symbol, side, quote_amount, &order.status)
                    .await?;
                tracing::info!(
                    "Adopted open order {} for {} ({})",
                    order.id,
                    symbol,
                    order.status
                );
            }
        }
        Ok(())
    }

    /// Re-poll every tracked open order and settle the ones that resolved.
    /// Errors on individual orders are logged and left for the next poll.
    pub async fn poll_open_orders(&self) -> Result<()> {
        let unresolved = self.store.unresolved_orders().await?;
        if unresolved.is_empty() {
            return Ok(());
        }
        tracing::debug!("Polling {} unresolved orders", unresolved.len());

        for (order_id, symbol, side_str, quote_amount) in unresolved {
            let side = if side_str == "SELL" { Side::Sell } else { Side::Buy };
            match self.exchange.get_order(&symbol, &order_id).await {
                Ok(order) if order_is_final(&order.status) => {
                    if let Err(e) = self.settle(&order, &symbol, side, quote_amount).await {
                        tracing::warn!("Failed to settle order {}: {}", order_id, e);
                    }
                }
                Ok(order) => {
                    self.store
                        .track_open_order(&order_id, &symbol, side, quote_amount, &order.status)
                        .await
                        .ok();
                }
                Err(e) => {
                    tracing::warn!("Failed to poll order {} for {}: {}", order_id, symbol, e);
                }
            }
        }
        Ok(())
    }

    /// Record the outcome of a resolved order and drop it from the open set.
    async fn settle(
        &self,
        order: &ExchangeOrder,
        symbol: &str,
        side: Side,
        requested_amount: f64,
    ) -> Result<()> {
        if order.has_fill() {
            // Prefer the exchange-reported filled quote value; fall back to
            // the requested notional for exchanges that omit it.
            let filled_quote = order
                .cumulative_quote_decimal()
                .and_then(|d| d.to_f64())
                .unwrap_or(requested_amount);
            self.store
                .record_fill(symbol, side, filled_quote, &order.id)
                .await?;
            tracing::info!(
                "Order {} for {} settled: {} ${:.2}",
                order.id,
                symbol,
                order.status,
                filled_quote
            );
        } else {
            tracing::info!(
                "Order {} for {} resolved without a fill ({})",
                order.id,
                symbol,
                order.status
            );
        }
        self.store.resolve_order(&order.id).await?;
        Ok(())
    }
}

/// Terminal order states: nothing further will change on the exchange side.
fn order_is_final(status: &str) -> bool {
    matches!(status, "FILLED" | "CANCELED" | "REJECTED" | "EXPIRED")
}
