//! Message sending and command registration.

use super::types::TgResponse;
use super::TelegramChannel;
use crate::utils::split_message;
use classbell_core::error::ClassbellError;
use tracing::{info, warn};

/// Telegram's per-message text limit.
const MAX_MESSAGE_LEN: usize = 4096;

impl TelegramChannel {
    /// Send a plain text message to a specific chat.
    pub(crate) async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ClassbellError> {
        let url = format!("{}/sendMessage", self.base_url);

        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });

            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| ClassbellError::TransientNetwork(format!("telegram send failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                return Err(ClassbellError::TransientNetwork(format!(
                    "telegram send failed ({status}): {error_text}"
                )));
            }

            let body: TgResponse<serde_json::Value> = resp.json().await.map_err(|e| {
                ClassbellError::TransientNetwork(format!("telegram send parse failed: {e}"))
            })?;
            if !body.ok {
                return Err(ClassbellError::TransientNetwork(format!(
                    "telegram send rejected: {}",
                    body.description.unwrap_or_default()
                )));
            }
        }

        Ok(())
    }

    /// Register bot commands with Telegram so users see an autocomplete menu.
    /// Best-effort: logs failures but does not propagate errors.
    pub(crate) async fn set_commands(&self) {
        let commands = serde_json::json!({
            "commands": [
                { "command": "start", "description": "Register for class reminders" },
            ]
        });

        let url = format!("{}/setMyCommands", self.base_url);
        match self.client.post(&url).json(&commands).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("telegram: registered bot commands");
            }
            Ok(resp) => {
                warn!("telegram: setMyCommands returned {}", resp.status());
            }
            Err(e) => {
                warn!("telegram: setMyCommands failed: {e}");
            }
        }
    }
}
