use anyhow::Result;
use chrono::{DateTime, Utc};
use signal_core::SymbolConfig;

/// Persistence for per-symbol configuration.
///
/// The legacy dashboard schema tolerates duplicate rows per symbol, so every
/// read goes through [`select_canonical`] — a pure function, the single place
/// that decides which row wins. The eventual fix is a uniqueness constraint
/// on (symbol); until the migration lands, selection stays tolerant.
pub struct SymbolConfigStore {
    pool: sqlx::AnyPool,
}

// Boolean columns decode as i64: the Any driver reports SQLite INTEGER
// columns as BIGINT and refuses a direct `bool` decode.
#[derive(sqlx::FromRow)]
struct ConfigRow {
    id: i64,
    symbol: String,
    alerts_enabled: i64,
    buy_alerts_enabled: i64,
    sell_alerts_enabled: i64,
    trading_enabled: i64,
    trade_amount: Option<f64>,
    cooldown_minutes: i64,
    min_price_change_percent: f64,
    min_volume_ratio: Option<f64>,
    require_ema10: i64,
    require_ma50: i64,
    require_ma200: i64,
    rsi_buy_ceiling: Option<f64>,
    rsi_sell_floor: Option<f64>,
    buy_target_price: Option<f64>,
    sell_target_price: Option<f64>,
    strategy_preset: String,
    risk_mode: String,
    deleted: i64,
    updated_at: String,
}

impl From<ConfigRow> for SymbolConfig {
    fn from(row: ConfigRow) -> Self {
        SymbolConfig {
            id: Some(row.id),
            symbol: row.symbol,
            alerts_enabled: row.alerts_enabled != 0,
            buy_alerts_enabled: row.buy_alerts_enabled != 0,
            sell_alerts_enabled: row.sell_alerts_enabled != 0,
            trading_enabled: row.trading_enabled != 0,
            trade_amount: row.trade_amount,
            cooldown_minutes: row.cooldown_minutes,
            min_price_change_percent: row.min_price_change_percent,
            min_volume_ratio: row.min_volume_ratio,
            require_ema10: row.require_ema10 != 0,
            require_ma50: row.require_ma50 != 0,
            require_ma200: row.require_ma200 != 0,
            rsi_buy_ceiling: row.rsi_buy_ceiling,
            rsi_sell_floor: row.rsi_sell_floor,
            buy_target_price: row.buy_target_price,
            sell_target_price: row.sell_target_price,
            strategy_preset: row.strategy_preset,
            risk_mode: row.risk_mode,
            deleted: row.deleted != 0,
            updated_at: row
                .updated_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

const SELECT_COLUMNS: &str = "id, symbol, alerts_enabled, buy_alerts_enabled, \
     sell_alerts_enabled, trading_enabled, trade_amount, cooldown_minutes, \
     min_price_change_percent, min_volume_ratio, require_ema10, require_ma50, \
     require_ma200, rsi_buy_ceiling, rsi_sell_floor, buy_target_price, \
     sell_target_price, strategy_preset, risk_mode, deleted, updated_at";

impl SymbolConfigStore {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::AnyPool {
        &self.pool
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS symbol_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                alerts_enabled INTEGER NOT NULL DEFAULT 1,
                buy_alerts_enabled INTEGER NOT NULL DEFAULT 1,
                sell_alerts_enabled INTEGER NOT NULL DEFAULT 1,
                trading_enabled INTEGER NOT NULL DEFAULT 0,
                trade_amount REAL,
                cooldown_minutes INTEGER NOT NULL DEFAULT 60,
                min_price_change_percent REAL NOT NULL DEFAULT 1.0,
                min_volume_ratio REAL,
                require_ema10 INTEGER NOT NULL DEFAULT 0,
                require_ma50 INTEGER NOT NULL DEFAULT 0,
                require_ma200 INTEGER NOT NULL DEFAULT 0,
                rsi_buy_ceiling REAL,
                rsi_sell_floor REAL,
                buy_target_price REAL,
                sell_target_price REAL,
                strategy_preset TEXT NOT NULL DEFAULT 'default',
                risk_mode TEXT NOT NULL DEFAULT 'normal',
                deleted INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_symbol_configs_symbol ON symbol_configs(symbol)")
            .execute(&self.pool)
            .await
            .ok();

        Ok(())
    }

    /// Insert a configuration row. Duplicates per symbol are allowed; reads
    /// resolve them through [`select_canonical`]. Returns the new row id.
    pub async fn save(&self, config: &SymbolConfig) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO symbol_configs (
                symbol, alerts_enabled, buy_alerts_enabled, sell_alerts_enabled,
                trading_enabled, trade_amount, cooldown_minutes,
                min_price_change_percent, min_volume_ratio, require_ema10,
                require_ma50, require_ma200, rsi_buy_ceiling, rsi_sell_floor,
                buy_target_price, sell_target_price, strategy_preset, risk_mode,
                deleted, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(&config.symbol)
        .bind(config.alerts_enabled)
        .bind(config.buy_alerts_enabled)
        .bind(config.sell_alerts_enabled)
        .bind(config.trading_enabled)
        .bind(config.trade_amount)
        .bind(config.cooldown_minutes)
        .bind(config.min_price_change_percent)
        .bind(config.min_volume_ratio)
        .bind(config.require_ema10)
        .bind(config.require_ma50)
        .bind(config.require_ma200)
        .bind(config.rsi_buy_ceiling)
        .bind(config.rsi_sell_floor)
        .bind(config.buy_target_price)
        .bind(config.sell_target_price)
        .bind(&config.strategy_preset)
        .bind(&config.risk_mode)
        .bind(config.deleted)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// All rows for one symbol, deleted included. Raw input for canonical
    /// selection.
    pub async fn candidates(&self, symbol: &str) -> Result<Vec<SymbolConfig>> {
        let rows: Vec<ConfigRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM symbol_configs WHERE symbol = ?"
        ))
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SymbolConfig::from).collect())
    }

    /// The canonical configuration for a symbol, or None when every row is
    /// deleted (or none exists).
    pub async fn canonical(&self, symbol: &str) -> Result<Option<SymbolConfig>> {
        let candidates = self.candidates(symbol).await?;
        Ok(select_canonical(candidates))
    }

    /// Symbols with at least one non-deleted configuration row.
    pub async fn active_symbols(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT symbol FROM symbol_configs WHERE deleted = 0 ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    /// Canonical configuration for every active symbol.
    pub async fn list_canonical(&self) -> Result<Vec<SymbolConfig>> {
        let mut configs = Vec::new();
        for symbol in self.active_symbols().await? {
            if let Some(config) = self.canonical(&symbol).await? {
                configs.push(config);
            }
        }
        Ok(configs)
    }

    /// Soft-delete every row for a symbol.
    pub async fn soft_delete(&self, symbol: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE symbol_configs SET deleted = 1, updated_at = ? WHERE symbol = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(symbol)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Pick the canonical row among duplicates: non-deleted first, then
/// alerts-enabled, then most recently updated, with row id as the final
/// tiebreaker. Pure and total — the same candidate set always yields the
/// same winner, within a cycle and across calls.
pub fn select_canonical(mut candidates: Vec<SymbolConfig>) -> Option<SymbolConfig> {
    candidates.sort_by(|a, b| {
        a.deleted
            .cmp(&b.deleted)
            .then(b.alerts_enabled.cmp(&a.alerts_enabled))
            .then(b.updated_at.cmp(&a.updated_at))
            .then(b.id.cmp(&a.id))
    });
    candidates.into_iter().find(|c| !c.deleted)
}
