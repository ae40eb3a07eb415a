mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signal_core::Side;

/// What the alert is about. Signal alerts carry the completion index so the
/// message can show how close the setup was to fully forming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertKind {
    Signal {
        symbol: String,
        side: Side,
        price: f64,
        index: Option<u8>,
    },
    OrderFilled {
        symbol: String,
        side: Side,
        quote_amount: f64,
        order_id: String,
    },
    OrderFailed {
        symbol: String,
        side: Side,
        reason: String,
    },
    Lifecycle {
        event: String,
    },
}

/// A fully formatted alert ready for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now(),
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn signal(symbol: &str, side: Side, price: f64, index: Option<u8>) -> Self {
        let emoji = match side {
            Side::Buy => "🟢",
            Side::Sell => "🔴",
        };
        let title = format!("{} {} signal: {}", emoji, side, symbol);
        let mut message = format!("{} {} at ${:.4}", symbol, side, price);
        if let Some(index) = index {
            message.push_str(&format!(" (conditions {}%)", index));
        }
        Self::new(
            AlertKind::Signal {
                symbol: symbol.to_string(),
                side,
                price,
                index,
            },
            title,
            message,
        )
    }

    pub fn order_filled(symbol: &str, side: Side, quote_amount: f64, order_id: &str) -> Self {
        Self::new(
            AlertKind::OrderFilled {
                symbol: symbol.to_string(),
                side,
                quote_amount,
                order_id: order_id.to_string(),
            },
            format!("✅ Order filled: {}", symbol),
            format!(
                "{} {} for ${:.2} (order {})",
                side, symbol, quote_amount, order_id
            ),
        )
    }

    pub fn order_failed(symbol: &str, side: Side, reason: &str) -> Self {
        Self::new(
            AlertKind::OrderFailed {
                symbol: symbol.to_string(),
                side,
                reason: reason.to_string(),
            },
            format!("⚠️ Order failed: {}", symbol),
            format!("{} {} order failed: {}", side, symbol, reason),
        )
    }

    pub fn lifecycle(event: &str, detail: impl Into<String>) -> Self {
        Self::new(
            AlertKind::Lifecycle {
                event: event.to_string(),
            },
            event.to_string(),
            detail,
        )
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), DispatchError>;
    fn name(&self) -> &str;
}

/// Errors from the dispatch layer. These feed the `delivery_blocked` flag on
/// the alert log and are never conflated with order-skip reasons.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Telegram API error: {0}")]
    Telegram(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the dispatch layer.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl DispatchConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        Self {
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Outcome of a dispatch attempt. `Blocked` maps to `delivery_blocked = true`
/// on the alert log row, with its reason kept separate from order skips.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered,
    Blocked { reason: String },
}

impl DispatchOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, DispatchOutcome::Blocked { .. })
    }
}

/// Dispatches alerts to every configured channel.
///
/// Signal alerts are sent synchronously so the caller gets a definite
/// delivered-or-blocked answer before moving on to the order path.
pub struct AlertDispatcher {
    channels: std::sync::Arc<Vec<Box<dyn NotificationChannel>>>,
}

impl AlertDispatcher {
    pub fn new(config: &DispatchConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => {
                channels.push(Box::new(TelegramNotifier::new(token, chat_id)));
                tracing::info!("Telegram notifications enabled");
            }
            _ => {
                tracing::warn!(
                    "Telegram not configured (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID); \
                     alerts will be recorded as blocked"
                );
            }
        }

        Self {
            channels: std::sync::Arc::new(channels),
        }
    }

    /// Build from explicit channels. Useful for custom transports and for
    /// exercising the pipeline without network access.
    pub fn from_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels: std::sync::Arc::new(channels),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.channels.is_empty()
    }

    /// Send an alert and report a definite outcome. Delivered means at least
    /// one channel accepted it; otherwise the collected reasons come back.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchOutcome {
        if self.channels.is_empty() {
            return DispatchOutcome::Blocked {
                reason: "no notification channel configured".to_string(),
            };
        }

        let mut failures = Vec::new();
        for channel in self.channels.iter() {
            match channel.send(alert).await {
                Ok(()) => {
                    tracing::debug!("Sent alert via {}", channel.name());
                    return DispatchOutcome::Delivered;
                }
                Err(e) => {
                    tracing::warn!("Failed to send alert via {}: {}", channel.name(), e);
                    failures.push(format!("{}: {}", channel.name(), e));
                }
            }
        }

        DispatchOutcome::Blocked {
            reason: failures.join("; "),
        }
    }

    /// Fire-and-forget send for lifecycle messages where the caller does not
    /// care about the outcome.
    pub fn dispatch_background(&self, alert: Alert) {
        let channels = self.channels.clone();
        tokio::spawn(async move {
            for channel in channels.iter() {
                if let Err(e) = channel.send(&alert).await {
                    tracing::warn!("Failed to send alert via {}: {}", channel.name(), e);
                }
            }
        });
    }
}
