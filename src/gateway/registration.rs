//! Self-registration: bind a chat to the roster record matching the name it sends.

use super::Gateway;
use classbell_core::{error::ClassbellError, message::InboundMessage};
use tracing::{debug, error, info, warn};

const PROMPT: &str = "Hi! Please reply with your full name.";

/// What an inbound message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Greeting command; the name prompt was sent.
    Prompted,
    /// Name matched an unbound record, which is now bound to the sender.
    Bound(String),
    /// Name already bound to this same chat. Nothing sent.
    AlreadyBound(String),
    /// Name bound to a different chat. Rejection sent.
    Conflict(String),
    /// No record has this name.
    NotFound,
    /// Empty text.
    Ignored,
}

/// `/start` (also `/start@botname` and deep-link payloads) or `/help`.
pub(crate) fn is_greeting(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.starts_with("/start") || lower == "/help"
}

fn success_text(name: &str) -> String {
    format!("Registered successfully, {name}! You'll receive reminders for your classes.")
}

fn not_found_text(text: &str) -> String {
    format!("Your name '{text}' was not found in the sheet. Please contact the admin.")
}

fn conflict_text(name: &str) -> String {
    format!("The name '{name}' is already registered to another account. Please contact the admin.")
}

fn sender_label(msg: &InboundMessage) -> &str {
    msg.sender_name.as_deref().unwrap_or("unknown sender")
}

impl Gateway {
    /// Handle one inbound message.
    ///
    /// At most one roster write, and only when a new binding is made. The
    /// reply goes out after the critical section is released.
    pub(crate) async fn handle_inbound(
        &self,
        msg: &InboundMessage,
    ) -> Result<Registration, ClassbellError> {
        let text = msg.text.trim();
        if text.is_empty() {
            debug!("ignoring empty message from chat {}", msg.chat_id);
            return Ok(Registration::Ignored);
        }

        if is_greeting(text) {
            self.reply(&msg.chat_id, PROMPT).await;
            return Ok(Registration::Prompted);
        }

        let outcome = {
            let txn = self.store.begin().await;
            let mut roster = txn.load().await?;
            let outcome = match roster.find_by_name_mut(text) {
                None => Registration::NotFound,
                Some(record) => match record.chat_identity.as_deref() {
                    Some(bound) if bound == msg.chat_id => {
                        Registration::AlreadyBound(record.name.clone())
                    }
                    Some(_) => Registration::Conflict(record.name.clone()),
                    None => {
                        record.chat_identity = Some(msg.chat_id.clone());
                        Registration::Bound(record.name.clone())
                    }
                },
            };
            if matches!(outcome, Registration::Bound(_)) {
                txn.replace_all(&roster).await?;
            }
            outcome
        };

        match &outcome {
            Registration::Bound(name) => {
                info!(
                    "registered '{name}' to chat {} ({})",
                    msg.chat_id,
                    sender_label(msg)
                );
                self.reply(&msg.chat_id, &success_text(name)).await;
            }
            Registration::AlreadyBound(name) => {
                debug!("'{name}' already registered to chat {}", msg.chat_id);
            }
            Registration::Conflict(name) => {
                let err = ClassbellError::Conflict(format!(
                    "'{name}' requested by chat {} but bound elsewhere",
                    msg.chat_id
                ));
                warn!("registration rejected: {err}");
                self.reply(&msg.chat_id, &conflict_text(name)).await;
            }
            Registration::NotFound => {
                info!(
                    "no roster entry for '{text}' (chat {}, {})",
                    msg.chat_id,
                    sender_label(msg)
                );
                self.reply(&msg.chat_id, &not_found_text(text)).await;
            }
            Registration::Prompted | Registration::Ignored => {}
        }

        Ok(outcome)
    }

    /// Send and log failures; never propagates.
    pub(super) async fn reply(&self, chat_id: &str, text: &str) {
        if let Err(e) = self.messenger.send(chat_id, text).await {
            error!("failed to send message to chat {chat_id}: {e}");
        }
    }
}
