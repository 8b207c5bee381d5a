//! Long polling and the Messenger trait implementation.

use super::types::{TgResponse, TgUpdate};
use super::TelegramChannel;
use async_trait::async_trait;
use classbell_core::{
    error::ClassbellError,
    message::{InboundMessage, UpdateBatch},
    traits::Messenger,
};
use std::time::Duration;
use tracing::{debug, info};

/// Slack added to the HTTP timeout on top of the long-poll timeout.
const POLL_HTTP_SLACK_SECS: u64 = 5;

#[async_trait]
impl Messenger for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, target: &str, text: &str) -> Result<(), ClassbellError> {
        let chat_id: i64 = target.trim().parse().map_err(|e| {
            ClassbellError::TransientNetwork(format!("invalid telegram chat_id '{target}': {e}"))
        })?;
        self.send_text(chat_id, text).await
    }

    async fn receive_updates(&self, cursor: Option<i64>) -> Result<UpdateBatch, ClassbellError> {
        let timeout = self.config.poll_timeout_secs;
        let mut url = format!("{}/getUpdates?timeout={timeout}", self.base_url);
        if let Some(off) = cursor {
            url.push_str(&format!("&offset={off}"));
        }

        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(timeout + POLL_HTTP_SLACK_SECS))
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            // The HTTP timeout firing means the long poll ran out with nothing new.
            Err(e) if e.is_timeout() => {
                debug!("telegram poll timed out without updates");
                return Ok(UpdateBatch {
                    messages: Vec::new(),
                    next_cursor: cursor,
                });
            }
            Err(e) => {
                return Err(ClassbellError::TransientNetwork(format!(
                    "telegram poll failed: {e}"
                )))
            }
        };

        let body: TgResponse<Vec<TgUpdate>> = resp.json().await.map_err(|e| {
            ClassbellError::TransientNetwork(format!("telegram poll parse failed: {e}"))
        })?;

        if !body.ok {
            return Err(ClassbellError::TransientNetwork(format!(
                "telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        Ok(updates_to_batch(body.result.unwrap_or_default(), cursor))
    }

    async fn register_commands(&self) {
        self.set_commands().await;
    }
}

/// Convert raw updates into inbound text messages and the next offset.
///
/// Every update advances the cursor, including the ones dropped here
/// (group chats, non-text content), so they are never fetched again.
pub(crate) fn updates_to_batch(updates: Vec<TgUpdate>, cursor: Option<i64>) -> UpdateBatch {
    let next_cursor = updates
        .iter()
        .map(|u| u.update_id + 1)
        .max()
        .or(cursor);

    let mut messages = Vec::with_capacity(updates.len());
    for update in updates {
        let msg = match update.message {
            Some(m) => m,
            None => continue,
        };

        let text = match msg.text {
            Some(t) => t,
            None => {
                debug!("telegram: skipping non-text message in chat {}", msg.chat.id);
                continue;
            }
        };

        // Registration is person-to-person only.
        if matches!(msg.chat.chat_type.as_str(), "group" | "supergroup" | "channel") {
            debug!("telegram: ignoring group message from chat {}", msg.chat.id);
            continue;
        }

        let sender_name = msg.from.map(|user| {
            if let Some(ref un) = user.username {
                format!("@{un}")
            } else if let Some(ref ln) = user.last_name {
                format!("{} {ln}", user.first_name)
            } else {
                user.first_name.clone()
            }
        });

        messages.push(InboundMessage {
            update_id: update.update_id,
            sender_name,
            chat_id: msg.chat.id.to_string(),
            text,
        });
    }

    if !messages.is_empty() {
        info!("telegram: received {} message(s)", messages.len());
    }

    UpdateBatch {
        messages,
        next_cursor,
    }
}
