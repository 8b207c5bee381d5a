//! `RecordTable` backends.

mod file;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod sheets;

pub use file::FileTable;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryTable;
pub use sheets::SheetsTable;

use classbell_core::{
    config::{StoreBackend, StoreConfig},
    shellexpand,
    traits::RecordTable,
};
use std::sync::Arc;
use std::time::Duration;

/// Build the backend selected in config.
pub fn from_config(config: &StoreConfig) -> Arc<dyn RecordTable> {
    match config.backend {
        StoreBackend::Sheets => Arc::new(SheetsTable::new(
            &config.sheet_id,
            &config.sheet_name,
            &config.access_token,
            Duration::from_secs(config.request_timeout_secs),
        )),
        StoreBackend::File => Arc::new(FileTable::new(shellexpand(&config.file_path))),
    }
}
