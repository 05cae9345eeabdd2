//! Logging setup.
//!
//! The server logs through `tracing`. Where the output goes is chosen by
//! [`LogTarget`]: systemd's journal on Linux, a daily rolling file, or stdout
//! for foreground runs and the admin CLI.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Journald when reachable, otherwise the log file.
    #[default]
    Auto,
    Journald,
    File,
    Stdout,
}

/// Initialize the global subscriber.
///
/// Log level is read from `TARGETMAP_LOG` using `EnvFilter` syntax, e.g.
/// `TARGETMAP_LOG=debug` or `TARGETMAP_LOG=targetmap=debug,tower_http=warn`.
/// Defaults to `info`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("TARGETMAP_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.target {
        LogTarget::Stdout => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer())
                .init();
            Ok(())
        }
        LogTarget::File => init_file(env_filter, &config.dir),
        LogTarget::Auto | LogTarget::Journald => {
            #[cfg(target_os = "linux")]
            {
                if let Ok(journald_layer) = tracing_journald::layer() {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(journald_layer)
                        .init();

                    tracing::info!("Logging initialized with journald backend");
                    return Ok(());
                }
            }

            let requested_journald = config.target == LogTarget::Journald;
            init_file(env_filter, &config.dir)?;
            if requested_journald {
                tracing::warn!("journald unavailable, logging to {:?} instead", config.dir);
            }
            Ok(())
        }
    }
}

fn init_file(env_filter: EnvFilter, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "targetmap.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread; keep it for the process lifetime.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}
