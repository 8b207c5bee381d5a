//! Gateway — wires the messenger and the roster store into the two loops.
//!
//! Includes: registration handling, the daily reminder scan, startup
//! diagnostics, and graceful shutdown.

mod diagnostics;
mod registration;
mod reminders;
mod scheduler;

#[cfg(test)]
mod tests;

use classbell_core::{
    config::{DiagnosticsConfig, ReminderConfig, TelegramConfig},
    traits::Messenger,
};
use classbell_roster::RosterStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Owns the messenger and store handles shared by both loops.
pub struct Gateway {
    pub(super) messenger: Arc<dyn Messenger>,
    pub(super) store: RosterStore,
    pub(super) telegram_config: TelegramConfig,
    pub(super) reminder_config: ReminderConfig,
    pub(super) diagnostics_config: DiagnosticsConfig,
}

impl Gateway {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        store: RosterStore,
        telegram_config: TelegramConfig,
        reminder_config: ReminderConfig,
        diagnostics_config: DiagnosticsConfig,
    ) -> Self {
        Self {
            messenger,
            store,
            telegram_config,
            reminder_config,
            diagnostics_config,
        }
    }

    /// Run both loops until Ctrl-C.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "classbell gateway running | messenger: {} | store: {} | reminders: {}",
            self.messenger.name(),
            self.store.backend(),
            if self.reminder_config.enabled {
                format!("daily at {}", self.reminder_config.daily_at)
            } else {
                "disabled".to_string()
            },
        );

        self.messenger.register_commands().await;

        let mut handles = Vec::new();

        let gw = self.clone();
        handles.push(tokio::spawn(async move { gw.inbound_loop().await }));

        if self.reminder_config.enabled {
            let gw = self.clone();
            handles.push(tokio::spawn(async move { gw.reminder_loop().await }));
        }

        handles.extend(self.spawn_startup_hooks());

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal");

        // Every roster write is one backend call made inside a txn, so
        // aborting here can drop a pending send but never half a write.
        for handle in &handles {
            handle.abort();
        }

        info!("Shutdown complete.");
        Ok(())
    }

    /// One-off work at startup. Only the diagnostic TEST sends run here;
    /// real reminders come from the daily trigger alone.
    pub(super) fn spawn_startup_hooks(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if !self.diagnostics_config.startup_names.is_empty() {
            let gw = self.clone();
            handles.push(tokio::spawn(async move {
                let delay = gw.diagnostics_config.startup_delay_secs;
                tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                let names = gw.diagnostics_config.startup_names.clone();
                if let Err(e) = gw.send_test_messages(&names).await {
                    warn!("startup diagnostics failed: {e}");
                }
            }));
        }
        handles
    }
}
