//! The two long-running loops: inbound polling and the daily scan.

use super::Gateway;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_SECS: u64 = 60;

/// Time from `now` until the next wall-clock `at`, strictly in the future.
pub(crate) fn until_next_trigger(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let today_at = now.date().and_time(at);
    let next = if today_at > now {
        today_at
    } else {
        today_at + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

impl Gateway {
    /// Poll for messages forever, handling each through registration.
    ///
    /// The long poll runs outside the roster's critical section. The
    /// cursor only moves past a message once it has been handled; on a
    /// store outage the rest of the batch is left for redelivery.
    pub(super) async fn inbound_loop(self: Arc<Self>) {
        info!("listening for new messages via {}", self.messenger.name());
        let idle = Duration::from_secs(self.telegram_config.idle_delay_secs);
        let mut cursor: Option<i64> = None;
        let mut backoff_secs: u64 = 1;

        loop {
            let batch = match self.messenger.receive_updates(cursor).await {
                Ok(b) => b,
                Err(e) => {
                    error!("poll error (retry in {backoff_secs}s): {e}");
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }
            };

            // Successful poll -- reset backoff.
            backoff_secs = 1;
            let mut next_cursor = batch.next_cursor.or(cursor);

            for msg in &batch.messages {
                match self.handle_inbound(msg).await {
                    Ok(outcome) => debug!("update {}: {outcome:?}", msg.update_id),
                    Err(e) if e.is_transient() => {
                        warn!("update {} deferred: {e}", msg.update_id);
                        next_cursor = Some(msg.update_id);
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                        break;
                    }
                    Err(e) => error!("update {} dropped: {e}", msg.update_id),
                }
            }

            cursor = next_cursor;
            tokio::time::sleep(idle).await;
        }
    }

    /// Scan once per day at the configured wall-clock time.
    pub(super) async fn reminder_loop(self: Arc<Self>) {
        let at = match self.reminder_config.trigger_time() {
            Ok(t) => t,
            Err(e) => {
                error!("reminder loop not started: {e}");
                return;
            }
        };
        let mut last_run: Option<NaiveDate> = None;

        loop {
            let now = self.reminder_config.local_now(Utc::now());
            let wait = until_next_trigger(now, at);
            info!("next reminder scan in {}m", wait.as_secs() / 60);
            tokio::time::sleep(wait).await;

            let today = self.reminder_config.today();
            if last_run == Some(today) {
                continue;
            }
            last_run = Some(today);

            if let Err(e) = self.scan_reminders(today).await {
                error!("reminder scan aborted, retrying at next trigger: {e}");
            }
        }
    }
}
