use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::{blocking, ApiError};
use super::AppState;
use crate::db::Note;

pub async fn list_notes(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> Result<Json<Vec<Note>>, ApiError> {
    let db = state.db.clone();
    blocking(move || Ok(db.notes_for(&target_id)?)).await.map(Json)
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    target_id: Option<String>,
    content: Option<String>,
}

pub async fn create_note(
    State(state): State<AppState>,
    body: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Result<Json<Note>, ApiError> {
    let Json(req) = body?;
    // Both fields must be present. An empty string is a value.
    let (Some(target_id), Some(content)) = (req.target_id, req.content) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };

    let db = state.db.clone();
    blocking(move || Ok(db.add_note(&target_id, &content)?)).await.map(Json)
}

#[derive(Debug, Serialize)]
pub struct DeleteNoteResponse {
    success: bool,
}

pub async fn delete_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteNoteResponse>, ApiError> {
    let id: i64 = key
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid note id: {key}")))?;

    let db = state.db.clone();
    blocking(move || {
        if db.delete_note(id)? {
            Ok(Json(DeleteNoteResponse { success: true }))
        } else {
            Err(ApiError::not_found("Note not found"))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::test_state;
    use axum::http::StatusCode;
    use tempfile::tempdir;

    fn note(target_id: &str, content: &str) -> Result<Json<CreateNoteRequest>, JsonRejection> {
        Ok(Json(CreateNoteRequest {
            target_id: Some(target_id.to_string()),
            content: Some(content.to_string()),
        }))
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let Json(created) = create_note(State(state.clone()), note("Acme/East", "Met the director"))
            .await
            .unwrap();
        assert_eq!(created.target_id, "Acme/East");

        let Json(notes) = list_notes(State(state.clone()), Path("Acme/East".into()))
            .await
            .unwrap();
        assert_eq!(notes, vec![created.clone()]);

        let Json(resp) = delete_note(State(state.clone()), Path(created.id.to_string()))
            .await
            .unwrap();
        assert!(resp.success);

        let err = delete_note(State(state), Path(created.id.to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_content_is_accepted() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let Json(created) = create_note(State(state.clone()), note("Acme", "")).await.unwrap();
        assert_eq!(created.content, "");

        let Json(notes) = list_notes(State(state), Path("Acme".into())).await.unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn test_validation() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let missing = Ok(Json(CreateNoteRequest {
            target_id: Some("Acme".to_string()),
            content: None,
        }));
        let err = create_note(State(state.clone()), missing).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let missing = Ok(Json(CreateNoteRequest {
            target_id: None,
            content: Some("Called twice".to_string()),
        }));
        let err = create_note(State(state.clone()), missing).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = delete_note(State(state), Path("not-a-number".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
