//! HTTP surface: JSON handlers over [`Db`] and [`BackupManager`].
//!
//! Every handler moves its SQLite or filesystem work into
//! [`error::blocking`] so the runtime threads never wait on disk.

mod backups;
mod console;
mod dashboard;
mod error;
mod notes;
mod targets;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};

use crate::backup::BackupManager;
use crate::config::ConsoleConfig;
use crate::db::Db;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub backups: Arc<BackupManager>,
    pub console: ConsoleConfig,
}

impl AppState {
    pub fn new(db: Db, backups: BackupManager, console: ConsoleConfig) -> Self {
        Self {
            db: Arc::new(db),
            backups: Arc::new(backups),
            console,
        }
    }
}

pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let upload_limit = state.backups.max_upload_bytes();

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/targets", get(targets::list_targets))
        .route("/api/kanban_data", get(targets::kanban_data))
        .route("/api/zips", get(targets::list_zips))
        .route("/api/clusters/{kind}", get(targets::clusters))
        .route("/api/update_status", post(targets::update_status))
        .route("/api/activity_log", get(targets::activity_log))
        .route("/api/notes", post(notes::create_note))
        // target ids may contain slashes; DELETE expects a numeric note id
        .route("/api/notes/{*key}", get(notes::list_notes).delete(notes::delete_note))
        .route("/api/dashboard/summary", get(dashboard::summary))
        .route("/api/dashboard/status/{status}", get(dashboard::status_detail))
        .route("/api/db/query", post(console::run_query))
        .route("/api/db/schema", get(console::schema))
        .route("/api/db/backups", get(backups::list_backups))
        .route("/api/db/backup", post(backups::create_backup).delete(backups::delete_backup))
        .route("/api/db/restore", post(backups::restore_backup))
        .route("/api/download_backup/{filename}", get(backups::download_backup))
        .route(
            "/api/upload_backup",
            post(backups::upload_backup).layer(DefaultBodyLimit::max(upload_limit)),
        );

    if let Some(dir) = static_dir {
        app = app
            .route_service("/", ServeFile::new(dir.join("index_db.html")))
            .route_service("/dashboard", ServeFile::new(dir.join("dashboard.html")))
            .fallback_service(ServeDir::new(dir));
    }

    app.with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
