pub fn default_name() -> String {
    "classbell".to_string()
}

pub fn default_data_dir() -> String {
    "~/.classbell".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_poll_timeout() -> u64 {
    100
}

pub fn default_idle_delay() -> u64 {
    5
}

pub fn default_send_timeout() -> u64 {
    30
}

pub fn default_store_timeout() -> u64 {
    30
}

pub fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

pub fn default_roster_path() -> String {
    "~/.classbell/data/roster.json".to_string()
}

pub fn default_daily_at() -> String {
    "09:00".to_string()
}

pub fn default_thresholds() -> Vec<u32> {
    vec![7, 2]
}

pub fn default_label() -> String {
    "a class".to_string()
}

pub fn default_startup_delay() -> u64 {
    5
}
