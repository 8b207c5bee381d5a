//! Operator-invoked test sends. They never touch reminder flags.

use super::Gateway;
use classbell_core::error::ClassbellError;
use tracing::{info, warn};

pub(crate) fn test_text(label: &str, date: Option<chrono::NaiveDate>) -> String {
    let date = date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "TBD".to_string());
    format!("TEST: You have {label} on {date}.")
}

impl Gateway {
    /// Send a TEST message to each registered record whose name is listed.
    /// Returns how many were sent.
    pub(crate) async fn send_test_messages(&self, names: &[String]) -> Result<usize, ClassbellError> {
        let roster = self.store.load().await?;
        let mut sent = 0;

        for name in names {
            let record = match roster.find_by_name(name) {
                Some(r) => r,
                None => {
                    warn!("diagnostics: no roster entry named '{name}'");
                    continue;
                }
            };
            let chat_id = match record.chat_identity.as_deref() {
                Some(c) => c,
                None => {
                    warn!("diagnostics: '{}' is not registered yet", record.name);
                    continue;
                }
            };

            let text = test_text(
                record.label_or(&self.reminder_config.default_label),
                record.event_date,
            );
            match self.messenger.send(chat_id, &text).await {
                Ok(()) => {
                    info!("sent test message to '{}'", record.name);
                    sent += 1;
                }
                Err(e) => warn!("test message to '{}' failed: {e}", record.name),
            }
        }

        Ok(sent)
    }
}
