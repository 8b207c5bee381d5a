//! Telegram Bot API channel.
//!
//! Uses long polling via `getUpdates` and `sendMessage` for replies.
//! Docs: <https://core.telegram.org/bots/api>

mod polling;
pub(crate) mod send;
pub(crate) mod types;


use classbell_core::config::TelegramConfig;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram channel using the Bot API with long polling.
///
/// Holds no cursor of its own: the caller owns the offset and passes it to
/// every `receive_updates` call.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    base_url: String,
}

impl TelegramChannel {
    /// Create a new Telegram channel from config.
    pub fn new(config: TelegramConfig) -> Self {
        Self::with_api_base(config, API_BASE)
    }

    /// Create a channel against a different Bot API host (e.g. a local bot server).
    pub fn with_api_base(config: TelegramConfig, api_base: &str) -> Self {
        let base_url = format!(
            "{}/bot{}",
            api_base.trim_end_matches('/'),
            config.bot_token
        );
        // Bounds every call; the long poll sets its own longer per-request timeout.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.send_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            base_url,
        }
    }
}
