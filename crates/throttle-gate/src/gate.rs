use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use signal_core::Side;
use tokio::sync::Mutex;

/// Why an emission was allowed or blocked.
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleOutcome {
    /// First qualifying decision for this (symbol, side).
    FirstEmission,
    /// One-shot force flag was armed by a config change.
    Forced,
    CooldownElapsed,
    PriceMoved,
    Blocked {
        elapsed_minutes: i64,
        price_change_percent: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleVerdict {
    pub allowed: bool,
    pub outcome: ThrottleOutcome,
}

// force_next decodes as i64: the Any driver reports SQLite INTEGER columns
// as BIGINT and refuses a direct `bool` decode.
#[derive(sqlx::FromRow)]
struct StateRow {
    last_price: f64,
    last_emitted_at: String,
    config_fingerprint: String,
    force_next: i64,
}

/// Per-(symbol, side) emission rate limiter.
///
/// All state transitions for one key happen under that key's async mutex, so
/// concurrent evaluation of different symbols never races a key against
/// itself. Rows are created on the first qualifying decision and then only
/// updated in place.
pub struct ThrottleGate {
    pool: sqlx::AnyPool,
    locks: DashMap<(String, Side), Arc<Mutex<()>>>,
}

impl ThrottleGate {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self {
            pool,
            locks: DashMap::new(),
        }
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS throttle_state (
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                last_price REAL NOT NULL,
                last_emitted_at TEXT NOT NULL,
                config_fingerprint TEXT NOT NULL,
                force_next INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (symbol, side)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn key_lock(&self, symbol: &str, side: Side) -> Arc<Mutex<()>> {
        self.locks
            .entry((symbol.to_string(), side))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one throttle evaluation for a key.
    ///
    /// Called every cycle for both sides, decision or not: fingerprint drift
    /// is persisted (and the force flag armed) immediately, so a config
    /// change made between decisions is never lost. `decision_price` is
    /// `Some` only when the evaluator produced a decision for this side.
    pub async fn evaluate(
        &self,
        symbol: &str,
        side: Side,
        fingerprint: &str,
        decision_price: Option<f64>,
        now: DateTime<Utc>,
        cooldown_minutes: i64,
        price_change_threshold_percent: f64,
    ) -> Result<Option<ThrottleVerdict>> {
        let lock = self.key_lock(symbol, side);
        let _guard = lock.lock().await;

        let row: Option<StateRow> = sqlx::query_as(
            "SELECT last_price, last_emitted_at, config_fingerprint, force_next
             FROM throttle_state WHERE symbol = ? AND side = ?",
        )
        .bind(symbol)
        .bind(side.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            // No stored state yet. Nothing to drift from; the row is created
            // by the first qualifying decision, which always emits.
            let Some(price) = decision_price else {
                return Ok(None);
            };
            self.insert_state(symbol, side, price, now, fingerprint)
                .await?;
            return Ok(Some(ThrottleVerdict {
                allowed: true,
                outcome: ThrottleOutcome::FirstEmission,
            }));
        };

        // Fingerprint sync happens before anything else, independent of
        // whether a decision was produced this cycle.
        let mut force_next = row.force_next != 0;
        if row.config_fingerprint != fingerprint {
            force_next = true;
            sqlx::query(
                "UPDATE throttle_state SET config_fingerprint = ?, force_next = 1
                 WHERE symbol = ? AND side = ?",
            )
            .bind(fingerprint)
            .bind(symbol)
            .bind(side.as_str())
            .execute(&self.pool)
            .await?;
            tracing::info!(
                "Config fingerprint changed for {} {}, next emission forced",
                symbol,
                side
            );
        }

        let Some(price) = decision_price else {
            return Ok(None);
        };

        let last_emitted_at = row
            .last_emitted_at
            .parse::<DateTime<Utc>>()
            .unwrap_or(now);
        let elapsed_minutes = (now - last_emitted_at).num_minutes();
        let price_change_percent = if row.last_price > 0.0 {
            ((price - row.last_price) / row.last_price).abs() * 100.0
        } else {
            0.0
        };

        let outcome = if force_next {
            ThrottleOutcome::Forced
        } else if elapsed_minutes >= cooldown_minutes {
            ThrottleOutcome::CooldownElapsed
        } else if price_change_percent >= price_change_threshold_percent {
            ThrottleOutcome::PriceMoved
        } else {
            return Ok(Some(ThrottleVerdict {
                allowed: false,
                outcome: ThrottleOutcome::Blocked {
                    elapsed_minutes,
                    price_change_percent,
                },
            }));
        };

        // Approved: record the emission and consume the force flag.
        sqlx::query(
            "UPDATE throttle_state
             SET last_price = ?, last_emitted_at = ?, force_next = 0
             WHERE symbol = ? AND side = ?",
        )
        .bind(price)
        .bind(now.to_rfc3339())
        .bind(symbol)
        .bind(side.as_str())
        .execute(&self.pool)
        .await?;

        Ok(Some(ThrottleVerdict {
            allowed: true,
            outcome,
        }))
    }

    async fn insert_state(
        &self,
        symbol: &str,
        side: Side,
        price: f64,
        now: DateTime<Utc>,
        fingerprint: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO throttle_state
             (symbol, side, last_price, last_emitted_at, config_fingerprint, force_next)
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(symbol)
        .bind(side.as_str())
        .bind(price)
        .bind(now.to_rfc3339())
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stored force flag, for status surfaces and tests.
    pub async fn force_flag(&self, symbol: &str, side: Side) -> Result<Option<bool>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT force_next FROM throttle_state WHERE symbol = ? AND side = ?",
        )
        .bind(symbol)
        .bind(side.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(f,)| f != 0))
    }
}
