//! # classbell-channels
//!
//! Messaging platform integrations for classbell.

pub mod telegram;
pub mod utils;
