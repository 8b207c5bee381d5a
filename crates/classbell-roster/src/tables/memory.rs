//! In-process table for tests. Counts writes and can simulate an outage.

use async_trait::async_trait;
use classbell_core::{
    error::ClassbellError,
    traits::{RecordTable, Table},
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryTable {
    table: Mutex<Table>,
    writes: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryTable {
    pub fn new(table: Table) -> Self {
        Self {
            table: Mutex::new(table),
            ..Default::default()
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> Table {
        self.table.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every read and write fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ClassbellError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClassbellError::StoreUnavailable(
                "memory table marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordTable for MemoryTable {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self) -> Result<Table, ClassbellError> {
        self.check()?;
        // Give other tasks a chance to run between read and write.
        tokio::task::yield_now().await;
        self.table
            .lock()
            .map(|t| t.clone())
            .map_err(|e| ClassbellError::StoreUnavailable(format!("memory table poisoned: {e}")))
    }

    async fn write(&self, table: &Table) -> Result<(), ClassbellError> {
        self.check()?;
        tokio::task::yield_now().await;
        let mut guard = self
            .table
            .lock()
            .map_err(|e| ClassbellError::StoreUnavailable(format!("memory table poisoned: {e}")))?;
        *guard = table.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
