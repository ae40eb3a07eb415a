//! Read-only status and alert-history endpoints for the dashboard.
//!
//! The agent owns the tables; these handlers only read. Missing tables (agent
//! never ran) degrade to empty results rather than errors.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/alerts", get(get_alerts))
}

#[derive(Serialize)]
pub struct SymbolStatus {
    pub symbol: String,
    pub last_decision: String,
    pub last_index: Option<i64>,
    pub last_price: Option<f64>,
    pub last_evaluated_at: String,
    pub last_alert_at: Option<String>,
    pub last_order_at: Option<String>,
    pub last_skip_reason: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub symbols: Vec<SymbolStatus>,
    pub metrics: Option<serde_json::Value>,
}

async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatusResponse>>, AppError> {
    type StatusRow = (
        String,
        String,
        Option<i64>,
        Option<f64>,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    );
    let rows: Vec<StatusRow> = sqlx::query_as(
        "SELECT symbol, last_decision, last_index, last_price, last_evaluated_at,
                last_alert_at, last_order_at, last_skip_reason, last_error
         FROM symbol_status ORDER BY symbol",
    )
    .fetch_all(&state.pool)
    .await
    .unwrap_or_default();

    let symbols = rows
        .into_iter()
        .map(
            |(
                symbol,
                last_decision,
                last_index,
                last_price,
                last_evaluated_at,
                last_alert_at,
                last_order_at,
                last_skip_reason,
                last_error,
            )| SymbolStatus {
                symbol,
                last_decision,
                last_index,
                last_price,
                last_evaluated_at,
                last_alert_at,
                last_order_at,
                last_skip_reason,
                last_error,
            },
        )
        .collect();

    let metrics: Option<serde_json::Value> =
        sqlx::query_as::<_, (String,)>("SELECT value FROM agent_state WHERE key = 'agent_metrics'")
            .fetch_optional(&state.pool)
            .await
            .ok()
            .flatten()
            .and_then(|(v,)| serde_json::from_str(&v).ok());

    Ok(Json(ApiResponse::success(StatusResponse {
        symbols,
        metrics,
    })))
}

#[derive(Deserialize)]
pub struct AlertsQuery {
    pub symbol: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AlertEntry {
    pub id: i64,
    pub symbol: String,
    pub side: String,
    pub message: String,
    pub price: Option<f64>,
    pub delivery_blocked: bool,
    pub delivery_block_reason: Option<String>,
    pub order_skipped: bool,
    pub order_skip_reason: Option<String>,
    pub order_submitted: bool,
    pub order_id: Option<String>,
    pub cycle: i64,
    pub created_at: String,
}

async fn get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<ApiResponse<Vec<AlertEntry>>>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    // Flag columns decode as i64: the Any driver reports SQLite INTEGER
    // columns as BIGINT and refuses a direct `bool` decode.
    type AlertRow = (
        i64,
        String,
        String,
        String,
        Option<f64>,
        i64,
        Option<String>,
        i64,
        Option<String>,
        i64,
        Option<String>,
        i64,
        String,
    );

    let rows: Vec<AlertRow> = match query.symbol {
        Some(symbol) => sqlx::query_as(
            "SELECT id, symbol, side, message, price, delivery_blocked,
                    delivery_block_reason, order_skipped, order_skip_reason,
                    order_submitted, order_id, cycle, created_at
             FROM alert_log WHERE symbol = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(symbol.to_uppercase())
        .bind(limit)
        .fetch_all(&state.pool)
        .await
        .unwrap_or_default(),
        None => sqlx::query_as(
            "SELECT id, symbol, side, message, price, delivery_blocked,
                    delivery_block_reason, order_skipped, order_skip_reason,
                    order_submitted, order_id, cycle, created_at
             FROM alert_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&state.pool)
        .await
        .unwrap_or_default(),
    };

    let alerts = rows
        .into_iter()
        .map(
            |(
                id,
                symbol,
                side,
                message,
                price,
                delivery_blocked,
                delivery_block_reason,
                order_skipped,
                order_skip_reason,
                order_submitted,
                order_id,
                cycle,
                created_at,
            )| AlertEntry {
                id,
                symbol,
                side,
                message,
                price,
                delivery_blocked: delivery_blocked != 0,
                delivery_block_reason,
                order_skipped: order_skipped != 0,
                order_skip_reason,
                order_submitted: order_submitted != 0,
                order_id,
                cycle,
                created_at,
            },
        )
        .collect();

    Ok(Json(ApiResponse::success(alerts)))
}
