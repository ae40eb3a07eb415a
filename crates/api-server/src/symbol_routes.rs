//! Symbol configuration endpoints.
//!
//! Write paths append rows; the store resolves duplicates through canonical
//! selection, so readers always see one deterministic config per symbol.

use axum::{
    extract::{Path, State},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use signal_core::SymbolConfig;

use crate::{ApiResponse, AppError, AppState};

pub fn symbol_routes() -> Router<AppState> {
    Router::new()
        .route("/api/symbols", get(list_symbols))
        .route("/api/symbols/:symbol", get(get_symbol))
        .route("/api/symbols/:symbol", put(upsert_symbol))
        .route("/api/symbols/:symbol", delete(delete_symbol))
}

/// Body for PUT. Every field optional; omitted fields keep the current
/// canonical value (or the default for a new symbol).
#[derive(Deserialize)]
pub struct UpsertSymbolRequest {
    pub alerts_enabled: Option<bool>,
    pub buy_alerts_enabled: Option<bool>,
    pub sell_alerts_enabled: Option<bool>,
    pub trading_enabled: Option<bool>,
    pub trade_amount: Option<f64>,
    pub cooldown_minutes: Option<i64>,
    pub min_price_change_percent: Option<f64>,
    pub min_volume_ratio: Option<f64>,
    pub require_ema10: Option<bool>,
    pub require_ma50: Option<bool>,
    pub require_ma200: Option<bool>,
    pub rsi_buy_ceiling: Option<f64>,
    pub rsi_sell_floor: Option<f64>,
    pub buy_target_price: Option<f64>,
    pub sell_target_price: Option<f64>,
    pub strategy_preset: Option<String>,
    pub risk_mode: Option<String>,
}

async fn list_symbols(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<SymbolConfig>>>, AppError> {
    let configs = state.store.list_canonical().await?;
    Ok(Json(ApiResponse::success(configs)))
}

async fn get_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<SymbolConfig>>, AppError> {
    let symbol = symbol.to_uppercase();
    match state.store.canonical(&symbol).await? {
        Some(config) => Ok(Json(ApiResponse::success(config))),
        None => Ok(Json(ApiResponse::error(format!(
            "no configuration for {}",
            symbol
        )))),
    }
}

async fn upsert_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Json(req): Json<UpsertSymbolRequest>,
) -> Result<Json<ApiResponse<SymbolConfig>>, AppError> {
    let symbol = symbol.to_uppercase();

    let mut config = state
        .store
        .canonical(&symbol)
        .await?
        .unwrap_or_else(|| SymbolConfig::new(&symbol));

    if let Some(v) = req.alerts_enabled {
        config.alerts_enabled = v;
    }
    if let Some(v) = req.buy_alerts_enabled {
        config.buy_alerts_enabled = v;
    }
    if let Some(v) = req.sell_alerts_enabled {
        config.sell_alerts_enabled = v;
    }
    if let Some(v) = req.trading_enabled {
        config.trading_enabled = v;
    }
    if let Some(v) = req.trade_amount {
        config.trade_amount = Some(v);
    }
    if let Some(v) = req.cooldown_minutes {
        config.cooldown_minutes = v;
    }
    if let Some(v) = req.min_price_change_percent {
        config.min_price_change_percent = v;
    }
    if let Some(v) = req.min_volume_ratio {
        config.min_volume_ratio = Some(v);
    }
    if let Some(v) = req.require_ema10 {
        config.require_ema10 = v;
    }
    if let Some(v) = req.require_ma50 {
        config.require_ma50 = v;
    }
    if let Some(v) = req.require_ma200 {
        config.require_ma200 = v;
    }
    if let Some(v) = req.rsi_buy_ceiling {
        config.rsi_buy_ceiling = Some(v);
    }
    if let Some(v) = req.rsi_sell_floor {
        config.rsi_sell_floor = Some(v);
    }
    if let Some(v) = req.buy_target_price {
        config.buy_target_price = Some(v);
    }
    if let Some(v) = req.sell_target_price {
        config.sell_target_price = Some(v);
    }
    if let Some(v) = req.strategy_preset {
        config.strategy_preset = v;
    }
    if let Some(v) = req.risk_mode {
        config.risk_mode = v;
    }
    config.deleted = false;
    config.updated_at = chrono::Utc::now();

    let id = state.store.save(&config).await?;
    config.id = Some(id);
    tracing::info!("Saved configuration for {} (row {})", symbol, id);

    Ok(Json(ApiResponse::success(config)))
}

async fn delete_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let symbol = symbol.to_uppercase();
    let affected = state.store.soft_delete(&symbol).await?;
    tracing::info!("Soft-deleted {} rows for {}", affected, symbol);
    Ok(Json(ApiResponse::success(format!(
        "{} disabled ({} rows)",
        symbol, affected
    ))))
}
