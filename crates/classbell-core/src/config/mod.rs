mod defaults;


use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::ClassbellError;
use crate::record::Threshold;
use defaults::*;

/// Top-level classbell configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Telegram bot config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Pause after each returned batch.
    #[serde(default = "default_idle_delay")]
    pub idle_delay_secs: u64,
    /// Upper bound on a single outbound send, including the HTTP round trip.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_timeout_secs: default_poll_timeout(),
            idle_delay_secs: default_idle_delay(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

/// Which table backend holds the roster.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Google Sheets values API.
    Sheets,
    /// Local JSON file.
    #[default]
    File,
}

/// Roster store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub sheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    /// OAuth bearer token for the Sheets API.
    #[serde(default)]
    pub access_token: String,
    /// Upper bound on one Sheets API request.
    #[serde(default = "default_store_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_roster_path")]
    pub file_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sheet_id: String::new(),
            sheet_name: default_sheet_name(),
            access_token: String::new(),
            request_timeout_secs: default_store_timeout(),
            file_path: default_roster_path(),
        }
    }
}

/// How a threshold is matched against days-until-event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Fire only when days-until equals the threshold.
    #[default]
    Exact,
    /// Fire when days-until is at or below the threshold and the flag is unset.
    AtOrBefore,
}

/// Daily reminder scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Wall-clock trigger time, `HH:MM`.
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<u32>,
    #[serde(default)]
    pub policy: MatchPolicy,
    /// Fixed offset such as `+02:00`. Empty = process local time.
    #[serde(default)]
    pub utc_offset: Option<String>,
    /// Used when a record has no lesson type.
    #[serde(default = "default_label")]
    pub default_label: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_at: default_daily_at(),
            thresholds: default_thresholds(),
            policy: MatchPolicy::default(),
            utc_offset: None,
            default_label: default_label(),
        }
    }
}

impl ReminderConfig {
    /// Configured thresholds, largest first, deduplicated.
    pub fn threshold_set(&self) -> Vec<Threshold> {
        let mut out: Vec<Threshold> = self.thresholds.iter().copied().map(Threshold).collect();
        out.sort_by(|a, b| b.cmp(a));
        out.dedup();
        out
    }

    pub fn trigger_time(&self) -> Result<NaiveTime, ClassbellError> {
        NaiveTime::parse_from_str(self.daily_at.trim(), "%H:%M").map_err(|e| {
            ClassbellError::Config(format!("invalid reminders.daily_at '{}': {e}", self.daily_at))
        })
    }

    pub fn offset(&self) -> Result<Option<FixedOffset>, ClassbellError> {
        match self.utc_offset.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_utc_offset(raw).map(Some),
        }
    }

    /// Today's date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        self.local_now(Utc::now()).date()
    }

    /// Convert a UTC instant to wall-clock time in the configured timezone.
    pub fn local_now(&self, now: DateTime<Utc>) -> chrono::NaiveDateTime {
        match self.offset().ok().flatten() {
            Some(off) => now.with_timezone(&off).naive_local(),
            None => now.with_timezone(&Local).naive_local(),
        }
    }
}

/// Startup diagnostic sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Names to send a TEST message to at startup. Empty = disabled.
    #[serde(default)]
    pub startup_names: Vec<String>,
    #[serde(default = "default_startup_delay")]
    pub startup_delay_secs: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            startup_names: Vec::new(),
            startup_delay_secs: default_startup_delay(),
        }
    }
}

/// Parse `+HH:MM`, `-HH:MM`, `+HH`, or `Z`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ClassbellError> {
    let bad = || ClassbellError::Config(format!("invalid utc_offset '{raw}'"));
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(bad);
    }
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(bad()),
    };
    if !rest.chars().all(|c| c.is_ascii_digit() || c == ':') {
        return Err(bad());
    }
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h: i32 = h.parse().map_err(|_| bad())?;
    let m: i32 = m.parse().map_err(|_| bad())?;
    if h > 14 || m > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60)).ok_or_else(bad)
}

impl Config {
    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides from an arbitrary lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("BOT_TOKEN").or_else(|| get("TELEGRAM_BOT_TOKEN")) {
            self.telegram.bot_token = token;
        }
        if let Some(id) = get("SHEET_ID") {
            self.store.sheet_id = id;
        }
        if let Some(token) = get("SHEETS_ACCESS_TOKEN") {
            self.store.access_token = token;
        }
        if let Some(at) = get("CLASSBELL_DAILY_AT") {
            self.reminders.daily_at = at;
        }
    }

    /// Reject configurations the loops cannot run with.
    pub fn validate(&self) -> Result<(), ClassbellError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ClassbellError::Config(
                "telegram.bot_token is empty. Set it in config.toml or the BOT_TOKEN env var."
                    .into(),
            ));
        }
        if self.telegram.send_timeout_secs == 0 {
            return Err(ClassbellError::Config(
                "telegram.send_timeout_secs must be at least 1".into(),
            ));
        }
        if self.store.request_timeout_secs == 0 {
            return Err(ClassbellError::Config(
                "store.request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.store.backend == StoreBackend::Sheets {
            if self.store.sheet_id.trim().is_empty() {
                return Err(ClassbellError::Config(
                    "store.backend is 'sheets' but store.sheet_id is empty".into(),
                ));
            }
            if self.store.access_token.trim().is_empty() {
                return Err(ClassbellError::Config(
                    "store.backend is 'sheets' but no access token is set (SHEETS_ACCESS_TOKEN)"
                        .into(),
                ));
            }
        }
        self.reminders.trigger_time()?;
        self.reminders.offset()?;
        if self.reminders.thresholds.is_empty() || self.reminders.thresholds.contains(&0) {
            return Err(ClassbellError::Config(
                "reminders.thresholds must be a non-empty list of positive day counts".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Environment
/// overrides are applied on top either way.
pub fn load(path: &str) -> Result<Config, ClassbellError> {
    let path = Path::new(path);
    let mut config = if !path.exists() {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    } else {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClassbellError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ClassbellError::Config(format!("failed to parse config: {}", e)))?
    };

    config.apply_env();
    Ok(config)
}
