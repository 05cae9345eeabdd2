use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::{build_router, AppState};
use crate::backup::BackupManager;
use crate::config::Config;
use crate::db::Db;

/// Open the database, bind the listener and serve until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
    let db = Db::new(&config.db_path);
    db.initialize()
        .with_context(|| format!("Failed to initialize database {}", config.db_path.display()))?;
    info!("Database ready at {:?}", config.db_path);

    if let Some(dir) = &config.server.static_dir {
        if !dir.is_dir() {
            warn!("static_dir {:?} does not exist, views will 404", dir);
        }
    }

    let state = AppState::new(
        db,
        BackupManager::new(config.backups.clone()),
        config.console.clone(),
    );
    let app = build_router(state, config.server.static_dir.as_deref());

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(addr = %listener.local_addr()?, "targetmap listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("targetmap stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
