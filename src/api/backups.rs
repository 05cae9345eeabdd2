use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::{blocking, ApiError};
use super::AppState;
use crate::backup::{RestoreOutcome, Snapshot};

#[derive(Debug, Serialize)]
pub struct BackupList {
    backups: Vec<Snapshot>,
}

pub async fn list_backups(State(state): State<AppState>) -> Result<Json<BackupList>, ApiError> {
    let backups = state.backups.clone();
    let list = blocking(move || Ok(backups.list()?)).await?;
    Ok(Json(BackupList { backups: list }))
}

#[derive(Debug, Serialize)]
pub struct BackupCreated {
    success: bool,
    message: String,
    filename: String,
}

pub async fn create_backup(State(state): State<AppState>) -> Result<Json<BackupCreated>, ApiError> {
    let (db, backups) = (state.db.clone(), state.backups.clone());
    let snapshot = blocking(move || Ok(backups.create(&db)?)).await?;
    Ok(Json(BackupCreated {
        success: true,
        message: format!("Backup created: {}", snapshot.filename),
        filename: snapshot.filename,
    }))
}

#[derive(Debug, Deserialize)]
pub struct FilenameRequest {
    #[serde(default)]
    filename: String,
}

#[derive(Debug, Serialize)]
pub struct Acknowledged {
    success: bool,
    message: String,
}

pub async fn delete_backup(
    State(state): State<AppState>,
    body: Result<Json<FilenameRequest>, JsonRejection>,
) -> Result<Json<Acknowledged>, ApiError> {
    let Json(req) = body?;
    let backups = state.backups.clone();
    blocking(move || {
        backups.delete(&req.filename)?;
        Ok(Json(Acknowledged {
            success: true,
            message: format!("Backup {} deleted", req.filename),
        }))
    })
    .await
}

pub async fn restore_backup(
    State(state): State<AppState>,
    body: Result<Json<FilenameRequest>, JsonRejection>,
) -> Result<Json<RestoreOutcome>, ApiError> {
    let Json(req) = body?;
    let (db, backups) = (state.db.clone(), state.backups.clone());
    blocking(move || Ok(backups.restore(&db, &req.filename)?)).await.map(Json)
}

pub async fn download_backup(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let backups = state.backups.clone();
    let name = filename.clone();
    let bytes = blocking(move || {
        let path = backups.resolve(&name)?;
        std::fs::read(&path).map_err(|e| ApiError::Internal(anyhow::Error::new(e)))
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn upload_backup(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RestoreOutcome>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        upload = Some((name, bytes));
        break;
    }
    let (name, bytes) = upload.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let (db, backups) = (state.db.clone(), state.backups.clone());
    blocking(move || Ok(backups.upload(&db, &name, &bytes)?)).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::test_state;
    use crate::db::testing::{insert_target, seed_targets};
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use tempfile::tempdir;

    fn filename(name: &str) -> Result<Json<FilenameRequest>, JsonRejection> {
        Ok(Json(FilenameRequest { filename: name.to_string() }))
    }

    #[tokio::test]
    async fn test_backup_restore_round() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        seed_targets(&state.db, 3);

        let Json(created) = create_backup(State(state.clone())).await.unwrap();
        insert_target(&state.db, "Late", None, None);

        let Json(list) = list_backups(State(state.clone())).await.unwrap();
        assert_eq!(list.backups.len(), 1);

        let Json(outcome) = restore_backup(State(state.clone()), filename(&created.filename))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.targets_count, 3);
        assert!(outcome.pre_restore_backup.is_some());

        let Json(list) = list_backups(State(state)).await.unwrap();
        assert_eq!(list.backups.len(), 2);
    }

    #[tokio::test]
    async fn test_download_and_delete() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let Json(created) = create_backup(State(state.clone())).await.unwrap();

        let resp = download_backup(State(state.clone()), Path(created.filename.clone()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..16], b"SQLite format 3\0");

        delete_backup(State(state.clone()), filename(&created.filename))
            .await
            .unwrap();
        let err = download_backup(State(state), Path(created.filename))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_rejected_everywhere() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        for name in ["../x.db", "a/b.db"] {
            let err = restore_backup(State(state.clone()), filename(name)).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            let err = delete_backup(State(state.clone()), filename(name)).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            let err = download_backup(State(state.clone()), Path(name.to_string()))
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_restore_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let err = restore_backup(State(state), filename("targets_20000101_000000.db"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
