pub mod status_routes;
pub mod symbol_routes;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use config_store::SymbolConfigStore;
use serde::Serialize;
use tower_http::cors::CorsLayer;

/// Standard JSON envelope for every endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler-level error, rendered as a 500 with the envelope.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error(self.0.to_string())),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::AnyPool,
    pub store: Arc<SymbolConfigStore>,
}

impl AppState {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        let store = Arc::new(SymbolConfigStore::new(pool.clone()));
        Self { pool, store }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(symbol_routes::symbol_routes())
        .merge(status_routes::status_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
