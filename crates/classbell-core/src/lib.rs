//! # classbell-core
//!
//! Core types, traits, configuration, and error handling for classbell.

pub mod config;
pub mod error;
pub mod message;
pub mod record;
pub mod traits;

pub use config::shellexpand;
