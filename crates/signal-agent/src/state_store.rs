use anyhow::Result;
use chrono::Utc;
use signal_core::Side;

/// Persistent agent state: alert log, per-symbol status, fill ledger, open
/// orders, and misc key-value state (metrics, cycle counter).
pub struct StateStore {
    pub db_pool: sqlx::AnyPool,
}

/// One row of the append-only alert log. Built fully in memory, inserted
/// exactly once per (symbol, side, cycle), never updated.
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub symbol: String,
    pub side: Side,
    pub message: String,
    pub price: Option<f64>,
    pub delivery_blocked: bool,
    pub delivery_block_reason: Option<String>,
    pub order_skipped: bool,
    pub order_skip_reason: Option<String>,
    pub order_submitted: bool,
    pub order_id: Option<String>,
    pub cycle: i64,
}

impl StateStore {
    pub fn new(db_pool: sqlx::AnyPool) -> Self {
        Self { db_pool }
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS alert_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                message TEXT NOT NULL,
                price REAL,
                delivery_blocked INTEGER NOT NULL DEFAULT 0,
                delivery_block_reason TEXT,
                order_skipped INTEGER NOT NULL DEFAULT 0,
                order_skip_reason TEXT,
                order_submitted INTEGER NOT NULL DEFAULT 0,
                order_id TEXT,
                cycle INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(symbol, side, cycle)
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS symbol_status (
                symbol TEXT PRIMARY KEY,
                last_decision TEXT NOT NULL,
                last_index INTEGER,
                last_price REAL,
                last_evaluated_at TEXT NOT NULL,
                last_alert_at TEXT,
                last_order_at TEXT,
                last_skip_reason TEXT,
                last_error TEXT
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS fill_ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quote_amount REAL NOT NULL,
                order_id TEXT NOT NULL,
                filled_at TEXT NOT NULL
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS open_orders (
                order_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quote_amount REAL NOT NULL,
                status TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_alert_log_symbol ON alert_log(symbol)")
            .execute(&self.db_pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_fill_ledger_symbol ON fill_ledger(symbol)")
            .execute(&self.db_pool)
            .await
            .ok();

        Ok(())
    }

    /// Save a state key-value pair.
    pub async fn save_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Load a state value by key.
    pub async fn load_state(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM agent_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn save_metrics(&self, metrics: &serde_json::Value) -> Result<()> {
        self.save_state("agent_metrics", &metrics.to_string()).await
    }

    pub async fn load_metrics(&self) -> Result<Option<serde_json::Value>> {
        Ok(self
            .load_state("agent_metrics")
            .await?
            .and_then(|v| serde_json::from_str(&v).ok()))
    }

    pub async fn save_cycle(&self, cycle: i64) -> Result<()> {
        self.save_state("cycle_counter", &cycle.to_string()).await
    }

    pub async fn load_cycle(&self) -> Result<i64> {
        Ok(self
            .load_state("cycle_counter")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    /// Insert an alert record. The UNIQUE(symbol, side, cycle) constraint
    /// makes this idempotent; a second insert for the same key is a no-op and
    /// returns false.
    pub async fn record_alert(&self, record: &AlertRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO alert_log
             (symbol, side, message, price, delivery_blocked, delivery_block_reason,
              order_skipped, order_skip_reason, order_submitted, order_id, cycle, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(symbol, side, cycle) DO NOTHING",
        )
        .bind(&record.symbol)
        .bind(record.side.as_str())
        .bind(&record.message)
        .bind(record.price)
        .bind(record.delivery_blocked)
        .bind(record.delivery_block_reason.as_deref())
        .bind(record.order_skipped)
        .bind(record.order_skip_reason.as_deref())
        .bind(record.order_submitted)
        .bind(record.order_id.as_deref())
        .bind(record.cycle)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Upsert the dashboard-facing per-symbol status row.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_symbol_status(
        &self,
        symbol: &str,
        last_decision: &str,
        last_index: Option<i64>,
        last_price: Option<f64>,
        alert_sent: bool,
        order_submitted: bool,
        skip_reason: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO symbol_status
             (symbol, last_decision, last_index, last_price, last_evaluated_at,
              last_alert_at, last_order_at, last_skip_reason, last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(symbol) DO UPDATE SET
                last_decision = excluded.last_decision,
                last_index = excluded.last_index,
                last_price = excluded.last_price,
                last_evaluated_at = excluded.last_evaluated_at,
                last_alert_at = COALESCE(excluded.last_alert_at, symbol_status.last_alert_at),
                last_order_at = COALESCE(excluded.last_order_at, symbol_status.last_order_at),
                last_skip_reason = excluded.last_skip_reason,
                last_error = excluded.last_error",
        )
        .bind(symbol)
        .bind(last_decision)
        .bind(last_index)
        .bind(last_price)
        .bind(&now)
        .bind(alert_sent.then(|| now.clone()))
        .bind(order_submitted.then(|| now.clone()))
        .bind(skip_reason)
        .bind(error)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Append a fill to the ledger.
    pub async fn record_fill(
        &self,
        symbol: &str,
        side: Side,
        quote_amount: f64,
        order_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO fill_ledger (symbol, side, quote_amount, order_id, filled_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(symbol)
        .bind(side.as_str())
        .bind(quote_amount)
        .bind(order_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Net quote-currency exposure for a symbol from the internal fill
    /// ledger: buys add, sells subtract, floored at zero. Diverges from the
    /// exchange balance when trades happen outside this agent.
    pub async fn symbol_exposure(&self, symbol: &str) -> Result<f64> {
        let (exposure,): (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(CASE WHEN side = 'BUY' THEN quote_amount ELSE -quote_amount END)
             FROM fill_ledger WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_one(&self.db_pool)
        .await?;
        Ok(exposure.unwrap_or(0.0).max(0.0))
    }

    /// Track a submitted order until it resolves.
    pub async fn track_open_order(
        &self,
        order_id: &str,
        symbol: &str,
        side: Side,
        quote_amount: f64,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO open_orders (order_id, symbol, side, quote_amount, status, submitted_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(order_id) DO UPDATE SET status = excluded.status",
        )
        .bind(order_id)
        .bind(symbol)
        .bind(side.as_str())
        .bind(quote_amount)
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    pub async fn open_order_count(&self, symbol: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM open_orders WHERE symbol = ?")
                .bind(symbol)
                .fetch_one(&self.db_pool)
                .await?;
        Ok(count)
    }

    /// Orders still awaiting an out-of-band result poll, as
    /// (order_id, symbol, side, quote_amount).
    pub async fn unresolved_orders(&self) -> Result<Vec<(String, String, String, f64)>> {
        let rows: Vec<(String, String, String, f64)> = sqlx::query_as(
            "SELECT order_id, symbol, side, quote_amount FROM open_orders",
        )
        .fetch_all(&self.db_pool)
        .await?;
        Ok(rows)
    }

    /// Drop an order from the open set once it is filled, canceled, or
    /// rejected.
    pub async fn resolve_order(&self, order_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM open_orders WHERE order_id = ?")
            .bind(order_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> StateStore {
        sqlx::any::install_default_drivers();
        // One connection: each sqlite::memory: connection is its own database.
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let store = StateStore::new(pool);
        store.init_tables().await.expect("init tables");
        store
    }

    fn record(symbol: &str, side: Side, cycle: i64) -> AlertRecord {
        AlertRecord {
            symbol: symbol.to_string(),
            side,
            message: format!("{} {} test", symbol, side),
            price: Some(100.0),
            delivery_blocked: false,
            delivery_block_reason: None,
            order_skipped: false,
            order_skip_reason: None,
            order_submitted: false,
            order_id: None,
            cycle,
        }
    }

    #[tokio::test]
    async fn alert_log_is_idempotent_per_symbol_side_cycle() {
        let store = memory_store().await;
        assert!(store
            .record_alert(&record("BTCUSDT", Side::Buy, 7))
            .await
            .unwrap());
        // Same key again: silently ignored.
        assert!(!store
            .record_alert(&record("BTCUSDT", Side::Buy, 7))
            .await
            .unwrap());
        // Other side and other cycle are distinct keys.
        assert!(store
            .record_alert(&record("BTCUSDT", Side::Sell, 7))
            .await
            .unwrap());
        assert!(store
            .record_alert(&record("BTCUSDT", Side::Buy, 8))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn exposure_nets_buys_against_sells() {
        let store = memory_store().await;
        store
            .record_fill("ETHUSDT", Side::Buy, 50.0, "o1")
            .await
            .unwrap();
        store
            .record_fill("ETHUSDT", Side::Buy, 25.0, "o2")
            .await
            .unwrap();
        store
            .record_fill("ETHUSDT", Side::Sell, 30.0, "o3")
            .await
            .unwrap();
        assert!((store.symbol_exposure("ETHUSDT").await.unwrap() - 45.0).abs() < 1e-9);

        // Over-selling floors at zero rather than going negative.
        store
            .record_fill("ETHUSDT", Side::Sell, 100.0, "o4")
            .await
            .unwrap();
        assert_eq!(store.symbol_exposure("ETHUSDT").await.unwrap(), 0.0);

        // Untouched symbols have zero exposure.
        assert_eq!(store.symbol_exposure("BTCUSDT").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn open_orders_resolve_and_count() {
        let store = memory_store().await;
        store
            .track_open_order("o1", "BTCUSDT", Side::Buy, 10.0, "NEW")
            .await
            .unwrap();
        store
            .track_open_order("o2", "BTCUSDT", Side::Buy, 10.0, "NEW")
            .await
            .unwrap();
        assert_eq!(store.open_order_count("BTCUSDT").await.unwrap(), 2);

        store.resolve_order("o1").await.unwrap();
        assert_eq!(store.open_order_count("BTCUSDT").await.unwrap(), 1);

        let unresolved = store.unresolved_orders().await.unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].0, "o2");
    }

    #[tokio::test]
    async fn cycle_counter_round_trips() {
        let store = memory_store().await;
        assert_eq!(store.load_cycle().await.unwrap(), 0);
        store.save_cycle(42).await.unwrap();
        assert_eq!(store.load_cycle().await.unwrap(), 42);
    }
}
