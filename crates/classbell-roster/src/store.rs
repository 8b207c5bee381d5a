//! The roster's single-writer critical section.
//!
//! The backing table has no transactions, so every read-modify-write
//! cycle runs while holding one mutex: [`RosterStore::begin`] hands out a
//! [`RosterTxn`] guard, and only a txn can write. Two cycles can never both
//! be between their load and their write.

use crate::roster::Roster;
use classbell_core::{error::ClassbellError, record::Threshold, traits::RecordTable};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Shared handle to the roster. Cheap to clone.
#[derive(Clone)]
pub struct RosterStore {
    table: Arc<dyn RecordTable>,
    thresholds: Arc<[Threshold]>,
    lock: Arc<Mutex<()>>,
}

impl RosterStore {
    pub fn new(table: Arc<dyn RecordTable>, thresholds: Vec<Threshold>) -> Self {
        Self {
            table,
            thresholds: thresholds.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Backend name, for logs.
    pub fn backend(&self) -> &str {
        self.table.name()
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Enter the critical section. Held until the txn is committed or dropped.
    pub async fn begin(&self) -> RosterTxn<'_> {
        let guard = self.lock.lock().await;
        debug!("roster: txn started");
        RosterTxn {
            store: self,
            _guard: guard,
        }
    }

    /// Read-only snapshot, taken inside the critical section.
    pub async fn load(&self) -> Result<Roster, ClassbellError> {
        self.begin().await.load().await
    }

    async fn read(&self) -> Result<Roster, ClassbellError> {
        let table = self.table.read().await?;
        Roster::from_table(&table, &self.thresholds)
    }
}

/// An open read-modify-write cycle. Dropping it without `replace_all`
/// leaves the table as it was.
pub struct RosterTxn<'a> {
    store: &'a RosterStore,
    _guard: MutexGuard<'a, ()>,
}

impl RosterTxn<'_> {
    /// Load every row of the table.
    pub async fn load(&self) -> Result<Roster, ClassbellError> {
        self.store.read().await
    }

    /// Overwrite the table with `roster` in one backend write and end the txn.
    ///
    /// Returns `false` without touching the table when nothing changed.
    pub async fn replace_all(self, roster: &Roster) -> Result<bool, ClassbellError> {
        if !roster.is_dirty() {
            debug!("roster: txn ended without changes");
            return Ok(false);
        }
        self.store.table.write(&roster.to_table()).await?;
        debug!("roster: txn committed");
        Ok(true)
    }
}
