use serde::{Deserialize, Serialize};

/// An inbound chat message from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform update identifier (monotonic).
    pub update_id: i64,
    /// Display name of the sender, for logs.
    pub sender_name: Option<String>,
    /// Chat to reply into. This is the identity bound on registration.
    pub chat_id: String,
    /// Message text content, untrimmed.
    pub text: String,
}

/// Result of one long poll: messages in order plus the cursor for the next call.
#[derive(Debug, Clone, Default)]
pub struct UpdateBatch {
    pub messages: Vec<InboundMessage>,
    /// Offset to pass to the next poll. Unchanged when the poll timed out empty.
    pub next_cursor: Option<i64>,
}
