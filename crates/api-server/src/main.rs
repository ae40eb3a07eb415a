use anyhow::{Context, Result};
use api_server::{build_router, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    sqlx::any::install_default_drivers();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://watchtower.db".to_string());
    let pool = sqlx::AnyPool::connect(&database_url)
        .await
        .with_context(|| format!("connecting to {}", database_url))?;

    let state = AppState::new(pool);
    state.store.init_tables().await?;

    let port: u16 = std::env::var("API_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, build_router(state))
        .await
        .context("server error")?;

    Ok(())
}
