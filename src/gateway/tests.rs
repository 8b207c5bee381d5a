use super::registration::{is_greeting, Registration};
use super::reminders::{plan_reminder, reminder_text, ReminderPlan};
use super::scheduler::until_next_trigger;
use super::*;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use classbell_core::{
    config::MatchPolicy,
    error::ClassbellError,
    message::{InboundMessage, UpdateBatch},
    record::{PersonRecord, Threshold},
    traits::Table,
};
use classbell_roster::tables::MemoryTable;
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeMessenger {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
    batches: Mutex<VecDeque<UpdateBatch>>,
    cursors: Mutex<Vec<Option<i64>>>,
}

impl FakeMessenger {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_to(&self, chat: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == chat)
            .map(|(_, t)| t)
            .collect()
    }

    fn fail_for(&self, chat: &str) {
        self.failing.lock().unwrap().insert(chat.to_string());
    }

    /// Sends to `chat` never complete.
    fn stall_for(&self, chat: &str) {
        self.stalled.lock().unwrap().insert(chat.to_string());
    }

    fn queue(&self, batch: UpdateBatch) {
        self.batches.lock().unwrap().push_back(batch);
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(&self, target: &str, text: &str) -> Result<(), ClassbellError> {
        let stalled = self.stalled.lock().unwrap().contains(target);
        if stalled {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(target) {
            return Err(ClassbellError::TransientNetwork("chat not found".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), text.to_string()));
        Ok(())
    }

    async fn receive_updates(&self, cursor: Option<i64>) -> Result<UpdateBatch, ClassbellError> {
        self.cursors.lock().unwrap().push(cursor);
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(UpdateBatch {
                    messages: Vec::new(),
                    next_cursor: cursor,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
}

fn in_days(n: i64) -> String {
    (today() + chrono::Duration::days(n)).to_string()
}

fn columns() -> Vec<String> {
    [
        "Teacher Name",
        "Chat ID",
        "Teaching Date",
        "Lesson Type",
        "Reminder Sent (7d)",
        "Reminder Sent (2d)",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn row(name: &str, chat: &str, date: &str, label: &str, f7: bool, f2: bool) -> Vec<String> {
    let flag = |b: bool| (if b { "TRUE" } else { "FALSE" }).to_string();
    vec![
        name.to_string(),
        chat.to_string(),
        date.to_string(),
        label.to_string(),
        flag(f7),
        flag(f2),
    ]
}

fn setup_with(
    rows: Vec<Vec<String>>,
    policy: MatchPolicy,
) -> (Arc<Gateway>, Arc<MemoryTable>, Arc<FakeMessenger>) {
    let table = Arc::new(MemoryTable::new(Table {
        columns: columns(),
        rows,
    }));
    let messenger = Arc::new(FakeMessenger::default());
    let reminder_config = ReminderConfig {
        policy,
        ..Default::default()
    };
    let store = RosterStore::new(table.clone(), reminder_config.threshold_set());
    let telegram_config = TelegramConfig {
        idle_delay_secs: 0,
        send_timeout_secs: 1,
        ..Default::default()
    };
    let gw = Gateway::new(
        messenger.clone(),
        store,
        telegram_config,
        reminder_config,
        DiagnosticsConfig::default(),
    );
    (Arc::new(gw), table, messenger)
}

fn setup(rows: Vec<Vec<String>>) -> (Arc<Gateway>, Arc<MemoryTable>, Arc<FakeMessenger>) {
    setup_with(rows, MatchPolicy::Exact)
}

fn inbound(update_id: i64, chat: &str, text: &str) -> InboundMessage {
    InboundMessage {
        update_id,
        sender_name: None,
        chat_id: chat.to_string(),
        text: text.to_string(),
    }
}

async fn record(gw: &Gateway, name: &str) -> PersonRecord {
    gw.store.load().await.unwrap().find_by_name(name).unwrap().clone()
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn test_is_greeting() {
    assert!(is_greeting("/start"));
    assert!(is_greeting("  /START "));
    assert!(is_greeting("/start@classbell_bot"));
    assert!(is_greeting("/help"));
    assert!(!is_greeting("Jane Doe"));
    assert!(!is_greeting("/helpme"));
}

#[tokio::test]
async fn test_greeting_prompts_without_touching_store() {
    let (gw, table, messenger) = setup(vec![row("Ann", "", "", "", false, false)]);
    let outcome = gw.handle_inbound(&inbound(1, "10", "/start")).await.unwrap();
    assert_eq!(outcome, Registration::Prompted);
    assert_eq!(
        messenger.sent(),
        vec![("10".to_string(), "Hi! Please reply with your full name.".to_string())]
    );
    assert_eq!(table.writes(), 0);
}

#[tokio::test]
async fn test_register_binds_identity() {
    let (gw, table, messenger) = setup(vec![row("Jane Doe", "", &in_days(10), "", false, false)]);
    let outcome = gw
        .handle_inbound(&inbound(1, "42", "  jane DOE "))
        .await
        .unwrap();
    assert_eq!(outcome, Registration::Bound("Jane Doe".into()));
    assert_eq!(table.writes(), 1);
    assert_eq!(record(&gw, "jane doe").await.chat_identity.as_deref(), Some("42"));

    let replies = messenger.sent_to("42");
    assert_eq!(replies.len(), 1);
    assert!(replies[0].starts_with("Registered successfully, Jane Doe!"));
}

#[tokio::test]
async fn test_reregistration_is_idempotent() {
    let (gw, table, messenger) = setup(vec![row("Ann", "", "", "", false, false)]);
    let first = gw.handle_inbound(&inbound(1, "7", "Ann")).await.unwrap();
    let second = gw.handle_inbound(&inbound(2, "7", "ann")).await.unwrap();
    assert_eq!(first, Registration::Bound("Ann".into()));
    assert_eq!(second, Registration::AlreadyBound("Ann".into()));
    assert_eq!(table.writes(), 1);
    assert_eq!(messenger.sent_to("7").len(), 1);
}

#[tokio::test]
async fn test_conflicting_registration_is_rejected() {
    let (gw, table, messenger) = setup(vec![row("Ann", "100", "", "", false, false)]);
    let outcome = gw.handle_inbound(&inbound(1, "200", "Ann")).await.unwrap();
    assert_eq!(outcome, Registration::Conflict("Ann".into()));
    assert_eq!(table.writes(), 0);
    assert_eq!(record(&gw, "ann").await.chat_identity.as_deref(), Some("100"));

    let replies = messenger.sent_to("200");
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("already registered"));
    assert!(messenger.sent_to("100").is_empty());
}

#[tokio::test]
async fn test_unknown_name_gets_notice() {
    let (gw, table, messenger) = setup(vec![row("Ann", "", "", "", false, false)]);
    let before = table.snapshot();
    let outcome = gw.handle_inbound(&inbound(1, "5", "Zed")).await.unwrap();
    assert_eq!(outcome, Registration::NotFound);
    assert_eq!(table.writes(), 0);
    assert_eq!(table.snapshot(), before);
    assert_eq!(
        messenger.sent_to("5"),
        vec!["Your name 'Zed' was not found in the sheet. Please contact the admin.".to_string()]
    );
}

#[tokio::test]
async fn test_empty_text_is_ignored() {
    let (gw, _table, messenger) = setup(vec![]);
    let outcome = gw.handle_inbound(&inbound(1, "5", "   ")).await.unwrap();
    assert_eq!(outcome, Registration::Ignored);
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn test_one_chat_may_hold_several_names() {
    let (gw, _table, _messenger) = setup(vec![
        row("Ann", "", "", "", false, false),
        row("Ann Smith", "", "", "", false, false),
    ]);
    gw.handle_inbound(&inbound(1, "9", "Ann")).await.unwrap();
    let outcome = gw.handle_inbound(&inbound(2, "9", "Ann Smith")).await.unwrap();
    assert_eq!(outcome, Registration::Bound("Ann Smith".into()));
}

#[tokio::test]
async fn test_registration_store_outage_sends_nothing() {
    let (gw, table, messenger) = setup(vec![row("Ann", "", "", "", false, false)]);
    table.set_unavailable(true);
    let err = gw.handle_inbound(&inbound(1, "5", "Ann")).await.unwrap_err();
    assert!(matches!(err, ClassbellError::StoreUnavailable(_)));
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn test_failed_confirmation_still_binds() {
    let (gw, table, messenger) = setup(vec![row("Ann", "", "", "", false, false)]);
    messenger.fail_for("5");
    let outcome = gw.handle_inbound(&inbound(1, "5", "Ann")).await.unwrap();
    assert_eq!(outcome, Registration::Bound("Ann".into()));
    assert_eq!(table.writes(), 1);
}

// ---------------------------------------------------------------------------
// Reminder planning
// ---------------------------------------------------------------------------

fn person(days: i64, flags: &[u32]) -> PersonRecord {
    let mut rec = PersonRecord::new("P");
    rec.chat_identity = Some("1".into());
    rec.event_date = Some(today() + chrono::Duration::days(days));
    for f in flags {
        rec.mark(Threshold(*f));
    }
    rec
}

const THRESHOLDS: &[Threshold] = &[Threshold(7), Threshold(2)];

#[test]
fn test_plan_exact_matches_only_threshold_days() {
    let plan = plan_reminder(&person(7, &[]), today(), THRESHOLDS, MatchPolicy::Exact);
    assert_eq!(
        plan,
        Some(ReminderPlan {
            days_until: 7,
            covers: vec![Threshold(7)]
        })
    );
    for days in [8, 6, 5, 3, 1, 0, -2] {
        assert_eq!(
            plan_reminder(&person(days, &[]), today(), THRESHOLDS, MatchPolicy::Exact),
            None,
            "day {days} must not fire under exact matching"
        );
    }
    assert!(plan_reminder(&person(2, &[7]), today(), THRESHOLDS, MatchPolicy::Exact).is_some());
}

#[test]
fn test_plan_skips_fired_flags() {
    assert_eq!(
        plan_reminder(&person(7, &[7]), today(), THRESHOLDS, MatchPolicy::Exact),
        None
    );
    assert_eq!(
        plan_reminder(&person(2, &[7, 2]), today(), THRESHOLDS, MatchPolicy::AtOrBefore),
        None
    );
}

#[test]
fn test_plan_at_or_before_catches_missed_days() {
    let plan = plan_reminder(&person(5, &[]), today(), THRESHOLDS, MatchPolicy::AtOrBefore).unwrap();
    assert_eq!(plan.days_until, 5);
    assert_eq!(plan.covers, vec![Threshold(7)]);

    let plan = plan_reminder(&person(1, &[]), today(), THRESHOLDS, MatchPolicy::AtOrBefore).unwrap();
    assert_eq!(plan.covers, vec![Threshold(7), Threshold(2)]);

    let plan = plan_reminder(&person(1, &[7]), today(), THRESHOLDS, MatchPolicy::AtOrBefore).unwrap();
    assert_eq!(plan.covers, vec![Threshold(2)]);

    assert_eq!(
        plan_reminder(&person(9, &[]), today(), THRESHOLDS, MatchPolicy::AtOrBefore),
        None
    );
    assert_eq!(
        plan_reminder(&person(-1, &[]), today(), THRESHOLDS, MatchPolicy::AtOrBefore),
        None
    );
}

#[test]
fn test_plan_without_date() {
    let mut rec = person(7, &[]);
    rec.event_date = None;
    assert_eq!(plan_reminder(&rec, today(), THRESHOLDS, MatchPolicy::Exact), None);
}

#[test]
fn test_reminder_text() {
    let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    assert_eq!(
        reminder_text("Teaching Corinthians", date, 7),
        "Reminder: You have Teaching Corinthians on 2026-03-08 (in 7 days)."
    );
    assert_eq!(
        reminder_text("a class", date, 1),
        "Reminder: You have a class on 2026-03-08 (in 1 day)."
    );
}

// ---------------------------------------------------------------------------
// Reminder scan
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scan_sends_seven_day_reminder_once() {
    let (gw, table, messenger) = setup(vec![
        row("Ann", "1", &in_days(7), "Teaching Corinthians", false, false),
        row("Bob", "2", &in_days(6), "", false, false),
    ]);

    let report = gw.scan_reminders(today()).await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(table.writes(), 1);

    let to_ann = messenger.sent_to("1");
    assert_eq!(to_ann.len(), 1);
    assert!(to_ann[0].contains("7 days"));
    assert!(to_ann[0].contains("Teaching Corinthians"));
    assert!(messenger.sent_to("2").is_empty());

    let ann = record(&gw, "ann").await;
    assert!(ann.has_flag(Threshold(7)));
    assert!(!ann.has_flag(Threshold(2)));
    assert!(record(&gw, "bob").await.reminder_flags.is_empty());

    // A second pass the same day sends nothing and writes nothing.
    let again = gw.scan_reminders(today()).await.unwrap();
    assert_eq!(again.sent, 0);
    assert_eq!(messenger.sent().len(), 1);
    assert_eq!(table.writes(), 1);
}

#[tokio::test]
async fn test_scan_respects_existing_flag() {
    let (gw, table, messenger) = setup(vec![row("Ann", "1", &in_days(7), "", true, false)]);
    let report = gw.scan_reminders(today()).await.unwrap();
    assert_eq!(report.sent, 0);
    assert!(messenger.sent().is_empty());
    assert_eq!(table.writes(), 0);
}

#[tokio::test]
async fn test_scan_two_day_reminder_uses_default_label() {
    let (gw, _table, messenger) = setup(vec![row("Ann", "1", &in_days(2), "", true, false)]);
    gw.scan_reminders(today()).await.unwrap();
    assert_eq!(
        messenger.sent_to("1"),
        vec![format!(
            "Reminder: You have a class on {} (in 2 days).",
            in_days(2)
        )]
    );
    let ann = record(&gw, "ann").await;
    assert!(ann.has_flag(Threshold(7)) && ann.has_flag(Threshold(2)));
}

#[tokio::test]
async fn test_scan_skips_unregistered_and_undated() {
    let (gw, table, messenger) = setup(vec![
        row("Ann", "", &in_days(7), "", false, false),
        row("Bob", "2", "", "", false, false),
    ]);
    let report = gw.scan_reminders(today()).await.unwrap();
    assert_eq!(report.scanned, 0);
    assert!(messenger.sent().is_empty());
    assert_eq!(table.writes(), 0);
}

#[tokio::test]
async fn test_scan_failed_send_leaves_flag_unset() {
    let (gw, table, messenger) = setup(vec![
        row("Ann", "1", &in_days(7), "", false, false),
        row("Bob", "2", &in_days(7), "", false, false),
    ]);
    messenger.fail_for("1");
    let report = gw.scan_reminders(today()).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(table.writes(), 1);
    assert!(!record(&gw, "ann").await.has_flag(Threshold(7)));
    assert!(record(&gw, "bob").await.has_flag(Threshold(7)));
}

#[tokio::test]
async fn test_stalled_send_releases_roster_for_registration() {
    let (gw, _table, messenger) = setup(vec![
        row("Ann", "1", &in_days(7), "", false, false),
        row("Cara", "", &in_days(10), "", false, false),
    ]);
    messenger.stall_for("1");

    let scan = tokio::spawn({
        let gw = gw.clone();
        async move { gw.scan_reminders(today()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        gw.handle_inbound(&inbound(1, "3", "Cara")),
    )
    .await
    .expect("registration stuck behind a stalled send")
    .unwrap();
    assert_eq!(outcome, Registration::Bound("Cara".into()));

    let report = scan.await.unwrap().unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 1);
    assert!(!record(&gw, "ann").await.has_flag(Threshold(7)));
    assert_eq!(record(&gw, "cara").await.chat_identity.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_scan_skips_and_preserves_malformed_rows() {
    let (gw, table, messenger) = setup(vec![
        row("", "3", &in_days(7), "", false, false),
        row("Ann", "1", &in_days(7), "", false, false),
        row("Eve", "4", "someday", "", false, false),
    ]);
    let report = gw.scan_reminders(today()).await.unwrap();
    assert_eq!(report.skipped_malformed, 2);
    assert_eq!(report.sent, 1);
    assert!(messenger.sent_to("3").is_empty());

    let written = table.snapshot();
    assert_eq!(written.rows.len(), 3);
    assert_eq!(written.rows[0], row("", "3", &in_days(7), "", false, false));
    assert_eq!(written.rows[2][2], "someday");
}

#[tokio::test]
async fn test_scan_store_outage_aborts_cleanly() {
    let (gw, table, messenger) = setup(vec![row("Ann", "1", &in_days(7), "", false, false)]);
    table.set_unavailable(true);
    let err = gw.scan_reminders(today()).await.unwrap_err();
    assert!(matches!(err, ClassbellError::StoreUnavailable(_)));
    assert!(messenger.sent().is_empty());

    table.set_unavailable(false);
    let report = gw.scan_reminders(today()).await.unwrap();
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn test_scan_exact_vs_at_or_before_for_missed_day() {
    // Scanner was down on the 7-day mark; five days remain.
    let rows = vec![row("Ann", "1", &in_days(5), "", false, false)];

    let (gw, _table, messenger) = setup_with(rows.clone(), MatchPolicy::Exact);
    gw.scan_reminders(today()).await.unwrap();
    assert!(messenger.sent().is_empty());

    let (gw, _table, messenger) = setup_with(rows, MatchPolicy::AtOrBefore);
    gw.scan_reminders(today()).await.unwrap();
    let sent = messenger.sent_to("1");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("in 5 days"));
    let ann = record(&gw, "ann").await;
    assert!(ann.has_flag(Threshold(7)));
    assert!(!ann.has_flag(Threshold(2)));
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_diagnostics_send_without_flags() {
    let (gw, table, messenger) = setup(vec![
        row("Kami Test", "77", &in_days(7), "Teaching Corinthians", false, false),
        row("Unbound", "", &in_days(7), "", false, false),
    ]);
    let names = vec!["kami test".to_string(), "Unbound".to_string(), "Nobody".to_string()];
    let sent = gw.send_test_messages(&names).await.unwrap();
    assert_eq!(sent, 1);
    assert_eq!(
        messenger.sent_to("77"),
        vec![format!("TEST: You have Teaching Corinthians on {}.", in_days(7))]
    );
    assert_eq!(table.writes(), 0);
    assert!(record(&gw, "kami test").await.reminder_flags.is_empty());
}

#[tokio::test]
async fn test_startup_hooks_send_only_test_messages() {
    let reminder_config = ReminderConfig::default();
    // Due a real 7-day reminder today, so a production scan would fire.
    let date = (reminder_config.today() + chrono::Duration::days(7)).to_string();
    let table = Arc::new(MemoryTable::new(Table {
        columns: columns(),
        rows: vec![row("Ann", "1", &date, "Teaching Corinthians", false, false)],
    }));
    let messenger = Arc::new(FakeMessenger::default());
    let store = RosterStore::new(table.clone(), reminder_config.threshold_set());
    let gw = Arc::new(Gateway::new(
        messenger.clone(),
        store,
        TelegramConfig::default(),
        reminder_config,
        DiagnosticsConfig {
            startup_names: vec!["ann".into()],
            startup_delay_secs: 0,
        },
    ));

    for handle in gw.spawn_startup_hooks() {
        handle.await.unwrap();
    }

    assert_eq!(
        messenger.sent_to("1"),
        vec![format!("TEST: You have Teaching Corinthians on {date}.")]
    );
    assert_eq!(table.writes(), 0);
    assert!(record(&gw, "ann").await.reminder_flags.is_empty());
}

#[tokio::test]
async fn test_no_startup_hooks_without_diagnostic_names() {
    let (gw, table, messenger) = setup(vec![row("Ann", "1", &in_days(7), "", false, false)]);
    assert!(gw.spawn_startup_hooks().is_empty());
    assert!(messenger.sent().is_empty());
    assert_eq!(table.writes(), 0);
}

#[test]
fn test_diagnostic_text_without_date() {
    assert_eq!(
        super::diagnostics::test_text("a class", None),
        "TEST: You have a class on TBD."
    );
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

fn at(date: &str, time: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S").unwrap()
}

#[test]
fn test_until_next_trigger() {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    assert_eq!(
        until_next_trigger(at("2026-03-01", "08:30:00"), nine),
        Duration::from_secs(30 * 60)
    );
    assert_eq!(
        until_next_trigger(at("2026-03-01", "09:00:00"), nine),
        Duration::from_secs(24 * 3600)
    );
    assert_eq!(
        until_next_trigger(at("2026-03-01", "21:00:00"), nine),
        Duration::from_secs(12 * 3600)
    );
    // Across a month boundary.
    assert_eq!(
        until_next_trigger(at("2026-02-28", "23:59:00"), nine),
        Duration::from_secs(9 * 3600 + 60)
    );
}

#[tokio::test]
async fn test_inbound_loop_advances_cursor() {
    let (gw, _table, messenger) = setup(vec![row("Ann", "", "", "", false, false)]);
    messenger.queue(UpdateBatch {
        messages: vec![inbound(10, "5", "/start"), inbound(11, "5", "Ann")],
        next_cursor: Some(12),
    });

    let handle = tokio::spawn(gw.clone().inbound_loop());
    tokio::time::timeout(Duration::from_secs(2), async {
        while messenger.sent().len() < 2 || messenger.cursors.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("inbound loop should process the batch");
    handle.abort();

    let cursors = messenger.cursors.lock().unwrap().clone();
    assert_eq!(cursors[0], None);
    assert_eq!(cursors[1], Some(12));
    assert_eq!(record(&gw, "ann").await.chat_identity.as_deref(), Some("5"));
}

#[tokio::test]
async fn test_inbound_loop_defers_on_store_outage() {
    let (gw, table, messenger) = setup(vec![row("Ann", "", "", "", false, false)]);
    table.set_unavailable(true);
    messenger.queue(UpdateBatch {
        messages: vec![inbound(20, "5", "/start"), inbound(21, "5", "Ann")],
        next_cursor: Some(22),
    });

    let handle = tokio::spawn(gw.clone().inbound_loop());
    tokio::time::timeout(Duration::from_secs(5), async {
        while messenger.cursors.lock().unwrap().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("inbound loop should poll again");
    handle.abort();

    // The greeting was handled; the registration is refetched next poll.
    let cursors = messenger.cursors.lock().unwrap().clone();
    assert_eq!(cursors[1], Some(21));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

async fn race(delays: Vec<u8>, scans: usize) -> (Arc<Gateway>, Arc<FakeMessenger>) {
    let (gw, _table, messenger) = setup(vec![
        row("Ann", "1", &in_days(7), "", false, false),
        row("Bob", "2", &in_days(2), "", true, false),
        row("Cara", "", &in_days(7), "", false, false),
        row("Dan", "", "", "", false, false),
    ]);

    let mut handles = Vec::new();
    let mut delays = delays.into_iter().cycle();
    let mut pause = move || delays.next().unwrap_or(0);

    for (id, chat, name) in [(1, "3", "Cara"), (2, "4", "Dan")] {
        let gw = gw.clone();
        let yields = pause();
        handles.push(tokio::spawn(async move {
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }
            gw.handle_inbound(&inbound(id, chat, name)).await.map(|_| ())
        }));
    }
    for _ in 0..scans {
        let gw = gw.clone();
        let yields = pause();
        handles.push(tokio::spawn(async move {
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }
            gw.scan_reminders(today()).await.map(|_| ())
        }));
    }

    for h in handles {
        h.await.unwrap().unwrap();
    }
    (gw, messenger)
}

fn reminders_to(messenger: &FakeMessenger, chat: &str) -> usize {
    messenger
        .sent_to(chat)
        .iter()
        .filter(|t| t.starts_with("Reminder:"))
        .count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_concurrent_registration_and_scan_lose_nothing(
        delays in prop::collection::vec(0u8..6, 1..6),
        scans in 1usize..4,
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let (gw, messenger) = rt.block_on(race(delays, scans));
        let roster = rt.block_on(gw.store.load()).unwrap();

        // Both registration writes survived every scan write.
        let cara = roster.find_by_name("cara").unwrap();
        let dan = roster.find_by_name("dan").unwrap();
        prop_assert_eq!(cara.chat_identity.as_deref(), Some("3"));
        prop_assert_eq!(dan.chat_identity.as_deref(), Some("4"));

        // Reminder flags survived every registration write, and each fired once.
        prop_assert!(roster.find_by_name("ann").unwrap().has_flag(Threshold(7)));
        prop_assert!(roster.find_by_name("bob").unwrap().has_flag(Threshold(2)));
        prop_assert_eq!(reminders_to(&messenger, "1"), 1);
        prop_assert_eq!(reminders_to(&messenger, "2"), 1);

        // Cara is reminded iff a scan ran after her binding; never twice.
        let cara_sent = reminders_to(&messenger, "3");
        prop_assert!(cara_sent <= 1);
        prop_assert_eq!(cara.has_flag(Threshold(7)), cara_sent == 1);
        prop_assert_eq!(reminders_to(&messenger, "4"), 0);
    }
}
