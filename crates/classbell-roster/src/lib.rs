//! # classbell-roster
//!
//! Typed access to the teacher roster kept in a flat, schema-less table.
//!
//! - `roster` — column mapping, row validation, and rendering back to cells
//! - `store` — the single critical section every read-modify-write goes through
//! - `tables` — `RecordTable` backends (Google Sheets, JSON file, in-memory)

pub mod roster;
pub mod store;
pub mod tables;

pub use roster::{MalformedRow, Roster};
pub use store::{RosterStore, RosterTxn};
