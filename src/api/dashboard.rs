use axum::extract::{Path, State};
use axum::Json;

use super::error::{blocking, ApiError};
use super::AppState;
use crate::db::{DashboardSummary, StatusDetail};

pub async fn summary(State(state): State<AppState>) -> Result<Json<DashboardSummary>, ApiError> {
    let db = state.db.clone();
    blocking(move || Ok(db.dashboard_summary()?)).await.map(Json)
}

pub async fn status_detail(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<StatusDetail>>, ApiError> {
    let db = state.db.clone();
    blocking(move || Ok(db.targets_with_status(&status)?)).await.map(Json)
}
