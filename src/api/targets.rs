use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::error::{blocking, ApiError};
use super::AppState;
use crate::db::{ActivityEntry, ClusterKind, ClusterMember, KanbanCard, TargetPin, ZipArea};

const ACTIVITY_LOG_LIMIT: usize = 50;

pub async fn list_targets(State(state): State<AppState>) -> Result<Json<Vec<TargetPin>>, ApiError> {
    let db = state.db.clone();
    blocking(move || Ok(db.list_targets()?)).await.map(Json)
}

pub async fn kanban_data(State(state): State<AppState>) -> Result<Json<Vec<KanbanCard>>, ApiError> {
    let db = state.db.clone();
    blocking(move || Ok(db.kanban_cards()?)).await.map(Json)
}

pub async fn list_zips(State(state): State<AppState>) -> Result<Json<Vec<ZipArea>>, ApiError> {
    let db = state.db.clone();
    blocking(move || Ok(db.list_zips()?)).await.map(Json)
}

pub async fn clusters(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<BTreeMap<String, Vec<ClusterMember>>>, ApiError> {
    let kind = ClusterKind::from_key(&kind)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid cluster type: {kind}")))?;
    let db = state.db.clone();
    blocking(move || Ok(db.clusters(kind)?)).await.map(Json)
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    organization: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    success: bool,
    old_status: Option<String>,
    new_status: String,
}

pub async fn update_status(
    State(state): State<AppState>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<UpdateStatusResponse>, ApiError> {
    let Json(req) = body?;
    let (organization, status) = match (req.organization, req.status) {
        (Some(org), Some(status)) if !org.is_empty() && !status.is_empty() => (org, status),
        _ => return Err(ApiError::bad_request("Missing organization or status")),
    };

    let db = state.db.clone();
    let change = blocking(move || {
        db.update_status(&organization, &status)?
            .map(|change| (organization.clone(), change))
            .ok_or_else(|| ApiError::not_found("Organization not found"))
    })
    .await?;

    let (organization, change) = change;
    info!(
        %organization,
        old = change.old_status.as_deref().unwrap_or("-"),
        new = %change.new_status,
        "status updated"
    );
    Ok(Json(UpdateStatusResponse {
        success: true,
        old_status: change.old_status,
        new_status: change.new_status,
    }))
}

pub async fn activity_log(State(state): State<AppState>) -> Result<Json<Vec<ActivityEntry>>, ApiError> {
    let db = state.db.clone();
    blocking(move || Ok(db.recent_activity(ACTIVITY_LOG_LIMIT)?)).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::test_state;
    use crate::db::testing::insert_target;
    use axum::http::StatusCode;
    use tempfile::tempdir;

    fn update(org: &str, status: &str) -> Result<Json<UpdateStatusRequest>, JsonRejection> {
        Ok(Json(UpdateStatusRequest {
            organization: Some(org.to_string()),
            status: Some(status.to_string()),
        }))
    }

    #[tokio::test]
    async fn test_acme_status_change_is_logged() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        insert_target(&state.db, "Acme", Some("not-contacted"), None);

        let Json(resp) = update_status(State(state.clone()), update("Acme", "contacted"))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.old_status.as_deref(), Some("not-contacted"));
        assert_eq!(resp.new_status, "contacted");

        let Json(log) = activity_log(State(state)).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].organization, "Acme");
        assert_eq!(log[0].old_status.as_deref(), Some("not-contacted"));
        assert_eq!(log[0].new_status, "contacted");
    }

    #[tokio::test]
    async fn test_unknown_organization_is_not_found() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let err = update_status(State(state.clone()), update("Nobody", "contacted"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let Json(log) = activity_log(State(state)).await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_are_bad_request() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let err = update_status(State(state.clone()), update("Acme", ""))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let body = Ok(Json(UpdateStatusRequest {
            organization: Some("Acme".into()),
            status: None,
        }));
        let err = update_status(State(state), body).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clusters_rejects_unknown_kind() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let err = clusters(State(state.clone()), Path("cluster_a_5mi; --".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let Json(map) = clusters(State(state), Path("AB_10MI".into())).await.unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_kanban_defaults() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        insert_target(&state.db, "Acme", None, None);

        let Json(cards) = kanban_data(State(state)).await.unwrap();
        assert_eq!(cards[0].status, "not-contacted");
        assert_eq!(cards[0].phone, "N/A");
        assert_eq!(cards[0].zip_grade, "N/A");
    }
}
