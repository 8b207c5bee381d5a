//! Reminder scan: fire each threshold once per record per event date.

use super::Gateway;
use chrono::NaiveDate;
use classbell_core::{
    config::MatchPolicy,
    error::ClassbellError,
    record::{PersonRecord, Threshold},
};
use std::time::Duration;
use tracing::{info, warn};

/// Counters from one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Registered records with an event date.
    pub scanned: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_malformed: usize,
}

/// One reminder to send, and the flags it settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReminderPlan {
    pub days_until: i64,
    /// Flags to set once the send succeeds. The fired threshold is among them.
    pub covers: Vec<Threshold>,
}

/// Decide whether `record` is due a reminder `today`.
///
/// `Exact` fires a threshold only on the day it is reached. `AtOrBefore`
/// also catches thresholds passed while the scan was not running; when
/// several are pending, one message goes out and settles them all.
pub(crate) fn plan_reminder(
    record: &PersonRecord,
    today: NaiveDate,
    thresholds: &[Threshold],
    policy: MatchPolicy,
) -> Option<ReminderPlan> {
    let days_until = record.days_until(today)?;
    if days_until < 0 {
        return None;
    }

    let covers: Vec<Threshold> = thresholds
        .iter()
        .copied()
        .filter(|t| !record.has_flag(*t))
        .filter(|t| {
            let days = i64::from(t.days());
            match policy {
                MatchPolicy::Exact => days_until == days,
                MatchPolicy::AtOrBefore => days_until <= days,
            }
        })
        .collect();

    if covers.is_empty() {
        None
    } else {
        Some(ReminderPlan { days_until, covers })
    }
}

pub(crate) fn reminder_text(label: &str, date: NaiveDate, days_until: i64) -> String {
    let when = match days_until {
        0 => "today".to_string(),
        1 => "in 1 day".to_string(),
        n => format!("in {n} days"),
    };
    format!("Reminder: You have {label} on {date} ({when}).")
}

impl Gateway {
    /// One pass over the whole roster inside a single critical section,
    /// ending in at most one `replace_all`.
    ///
    /// A flag is set only after its message was accepted by the platform,
    /// so a failed send can be retried by a later scan the same day.
    pub(crate) async fn scan_reminders(&self, today: NaiveDate) -> Result<ScanReport, ClassbellError> {
        let thresholds = self.store.thresholds().to_vec();
        let policy = self.reminder_config.policy;
        let default_label = self.reminder_config.default_label.as_str();

        let txn = self.store.begin().await;
        let mut roster = txn.load().await?;
        let mut report = ScanReport {
            skipped_malformed: roster.report_malformed(),
            ..Default::default()
        };

        for record in roster.people_mut() {
            let (chat_id, date) = match (record.chat_identity.clone(), record.event_date) {
                (Some(chat_id), Some(date)) => (chat_id, date),
                _ => continue,
            };
            report.scanned += 1;

            let plan = match plan_reminder(record, today, &thresholds, policy) {
                Some(p) => p,
                None => continue,
            };

            let text = reminder_text(record.label_or(default_label), date, plan.days_until);
            match self.send_within_limit(&chat_id, &text).await {
                Ok(()) => {
                    for threshold in &plan.covers {
                        record.mark(*threshold);
                    }
                    report.sent += 1;
                    info!(
                        "reminder sent to '{}' ({} days before {date})",
                        record.name, plan.days_until
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("reminder to '{}' not sent, flag left unset: {e}", record.name);
                }
            }
        }

        txn.replace_all(&roster).await?;

        info!(
            "checked reminders for {today}: {} scanned, {} sent, {} failed, {} malformed",
            report.scanned, report.sent, report.failed, report.skipped_malformed
        );
        Ok(report)
    }

    /// Sends made inside the critical section are capped so a stalled
    /// platform cannot hold the roster.
    async fn send_within_limit(&self, chat_id: &str, text: &str) -> Result<(), ClassbellError> {
        let limit = Duration::from_secs(self.telegram_config.send_timeout_secs);
        match tokio::time::timeout(limit, self.messenger.send(chat_id, text)).await {
            Ok(result) => result,
            Err(_) => Err(ClassbellError::TransientNetwork(format!(
                "send to chat {chat_id} timed out after {}s",
                limit.as_secs()
            ))),
        }
    }
}
