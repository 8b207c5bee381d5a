//! Person records and reminder thresholds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A day-count at which exactly one reminder fires per record per event date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold(pub u32);

impl Threshold {
    pub fn days(self) -> u32 {
        self.0
    }

    /// Short marker, e.g. `7d`.
    pub fn flag(self) -> String {
        format!("{}d", self.0)
    }

    /// Roster column holding this threshold's sent flag, e.g. `Reminder Sent (7d)`.
    pub fn column(self) -> String {
        format!("Reminder Sent ({})", self.flag())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flag())
    }
}

/// One teacher's registration and scheduling state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRecord {
    pub name: String,
    pub chat_identity: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_label: Option<String>,
    pub reminder_flags: BTreeSet<Threshold>,
}

impl PersonRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chat_identity: None,
            event_date: None,
            event_label: None,
            reminder_flags: BTreeSet::new(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.chat_identity.is_some()
    }

    /// Whether `text` names this record (trimmed, case-insensitive).
    pub fn matches_name(&self, text: &str) -> bool {
        normalize_name(&self.name) == normalize_name(text)
    }

    /// Event label, or `default` when absent or blank.
    pub fn label_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.event_label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => default,
        }
    }

    /// Calendar days from `today` to the event, if there is one.
    pub fn days_until(&self, today: NaiveDate) -> Option<i64> {
        self.event_date.map(|d| (d - today).num_days())
    }

    pub fn has_flag(&self, threshold: Threshold) -> bool {
        self.reminder_flags.contains(&threshold)
    }

    /// Record a fired threshold. Returns false if it was already set.
    pub fn mark(&mut self, threshold: Threshold) -> bool {
        self.reminder_flags.insert(threshold)
    }
}

/// Normalize a name for matching: trimmed and lowercased.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
