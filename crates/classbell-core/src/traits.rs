use crate::{error::ClassbellError, message::UpdateBatch};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A raw, schema-less table: a header row and string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Backing storage for the roster — the flat table.
///
/// Implementations offer no transactions: `write` replaces the whole table
/// and must do so in a single operation so no reader sees a half-written
/// state. Callers serialize read-modify-write cycles themselves.
#[async_trait]
pub trait RecordTable: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Read the entire table.
    async fn read(&self) -> Result<Table, ClassbellError>;

    /// Overwrite the entire table.
    async fn write(&self, table: &Table) -> Result<(), ClassbellError>;
}

/// Chat platform — sends replies and long-polls for inbound messages.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Human-readable platform name.
    fn name(&self) -> &str;

    /// Post a text message to a chat.
    async fn send(&self, target: &str, text: &str) -> Result<(), ClassbellError>;

    /// Long-poll for messages after `cursor`. An empty batch means the poll timed out.
    async fn receive_updates(&self, cursor: Option<i64>) -> Result<UpdateBatch, ClassbellError>;

    /// Advertise bot commands to users. Best-effort.
    async fn register_commands(&self) {}
}
