//! SpendBar - Cursor spend tracker
//!
//! Polls the Cursor billing API with the user's session token and keeps a
//! compact status indicator up to date with spend, limit and percent used.

pub mod commands;
pub mod debug_settings;
pub mod login;
pub mod providers;
pub mod refresh;
pub mod storage;
pub mod terminal;
pub mod tray;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_DIRECTIVE: &str = "spendbar=info";

/// Initialize logging: stderr always, the debug file only while enabled
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(debug_settings::file_writer()),
        )
        .try_init();

    if let Err(err) = result {
        eprintln!("Logging already initialized: {}", err);
    }
}
