mod gateway;

use clap::{Parser, Subcommand};
use classbell_channels::telegram::TelegramChannel;
use classbell_core::{config, shellexpand};
use classbell_roster::{tables, RosterStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "classbell",
    version,
    about = "Telegram class reminders for a shared teacher roster"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the message listener and the daily reminder scan.
    Start,
    /// Show configuration and roster statistics.
    Status,
    /// Run one reminder scan now and exit.
    Scan,
    /// Send a TEST message to registered teachers by name. Flags are not touched.
    TestSend {
        /// Teacher names as they appear in the roster.
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
    },
}

/// Stdout plus a daily-rolling file under `{data_dir}/logs`.
fn init_logging(cfg: &config::Config) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.bot.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_dir = std::path::PathBuf::from(shellexpand(&cfg.bot.data_dir)).join("logs");
    let file_appender = tracing_appender::rolling::daily(log_dir, "classbell.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    guard
}

fn build_gateway(cfg: &config::Config) -> gateway::Gateway {
    let messenger = Arc::new(TelegramChannel::new(cfg.telegram.clone()));
    let store = RosterStore::new(
        tables::from_config(&cfg.store),
        cfg.reminders.threshold_set(),
    );
    gateway::Gateway::new(
        messenger,
        store,
        cfg.telegram.clone(),
        cfg.reminders.clone(),
        cfg.diagnostics.clone(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_logging(&cfg);

    match cli.command {
        Commands::Start => {
            // Missing credentials are the only fatal errors; they stop us here.
            cfg.validate()?;
            println!("classbell — starting...");
            let gw = Arc::new(build_gateway(&cfg));
            gw.run().await?;
        }
        Commands::Status => {
            println!("classbell — Status Check\n");
            println!("Config: {}", cli.config);
            match cfg.validate() {
                Ok(()) => println!("  config: valid"),
                Err(e) => println!("  config: {e}"),
            }
            println!(
                "  reminders: {} at {} | thresholds {:?} | policy {:?}",
                if cfg.reminders.enabled { "daily" } else { "disabled" },
                cfg.reminders.daily_at,
                cfg.reminders.thresholds,
                cfg.reminders.policy,
            );

            let store = RosterStore::new(
                tables::from_config(&cfg.store),
                cfg.reminders.threshold_set(),
            );
            match store.load().await {
                Ok(roster) => {
                    let today = cfg.reminders.today();
                    let total = roster.people().count();
                    let registered = roster.people().filter(|r| r.is_registered()).count();
                    let upcoming = roster
                        .people()
                        .filter(|r| r.days_until(today).is_some_and(|d| d >= 0))
                        .count();
                    println!("  store ({}): reachable", store.backend());
                    println!("  records: {total} ({registered} registered, {upcoming} upcoming)");
                    println!("  malformed rows: {}", roster.malformed().count());
                }
                Err(e) => println!("  store ({}): {e}", store.backend()),
            }
        }
        Commands::Scan => {
            cfg.validate()?;
            let gw = build_gateway(&cfg);
            let report = gw.scan_reminders(cfg.reminders.today()).await?;
            println!(
                "scanned {} | sent {} | failed {} | malformed {}",
                report.scanned, report.sent, report.failed, report.skipped_malformed
            );
        }
        Commands::TestSend { names } => {
            cfg.validate()?;
            let gw = build_gateway(&cfg);
            let sent = gw.send_test_messages(&names).await?;
            println!("sent {sent} of {} test message(s)", names.len());
        }
    }

    Ok(())
}
