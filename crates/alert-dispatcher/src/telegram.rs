use async_trait::async_trait;
use serde::Deserialize;

use crate::{Alert, DispatchError, NotificationChannel};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API channel. One bot, one chat.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    /// getMe round trip, used as a startup connectivity check.
    pub async fn check_connectivity(&self) -> Result<(), DispatchError> {
        let url = format!("{}/bot{}/getMe", TELEGRAM_API_BASE, self.bot_token);
        let response = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| DispatchError::Telegram(e.to_string()))?;

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Telegram(e.to_string()))?;

        if !body.ok {
            return Err(DispatchError::Telegram(
                body.description
                    .unwrap_or_else(|| "getMe rejected".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": format!("{}\n\n{}", alert.title, alert.message),
        });

        let response = self
            .client
            .post(&url)
            .timeout(std::time::Duration::from_secs(10))
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Telegram(e.to_string()))?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Telegram(e.to_string()))?;

        if !body.ok {
            return Err(DispatchError::Telegram(format!(
                "sendMessage failed ({}): {}",
                status,
                body.description.unwrap_or_else(|| "no detail".to_string())
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
