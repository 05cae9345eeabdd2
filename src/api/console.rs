use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{blocking, ApiError};
use super::AppState;
use crate::db::{ConsoleOutcome, TableInfo};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    query: String,
}

pub async fn run_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<ConsoleOutcome>, ApiError> {
    let Json(req) = body?;
    let db = state.db.clone();
    let limits = state.console.clone();

    let outcome = blocking(move || Ok(db.run_console_query(&req.query, &limits)?)).await?;
    if let ConsoleOutcome::Rows(rows) = &outcome {
        info!(rows = rows.row_count, truncated = rows.truncated, "console query");
    }
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    tables: Vec<TableInfo>,
}

pub async fn schema(State(state): State<AppState>) -> Result<Json<SchemaResponse>, ApiError> {
    let db = state.db.clone();
    let tables = blocking(move || Ok(db.schema()?)).await?;
    Ok(Json(SchemaResponse { tables }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::test_state;
    use crate::db::testing::seed_targets;
    use axum::http::StatusCode;
    use tempfile::tempdir;

    fn query(sql: &str) -> Result<Json<QueryRequest>, JsonRejection> {
        Ok(Json(QueryRequest { query: sql.to_string() }))
    }

    #[tokio::test]
    async fn test_query_returns_rows() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        seed_targets(&state.db, 2);

        let Json(outcome) = run_query(State(state), query("SELECT COUNT(*) AS n FROM targets"))
            .await
            .unwrap();
        let ConsoleOutcome::Rows(rows) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(rows.rows[0]["n"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_rejections_are_bad_request() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        for sql in ["", "SELECT 'update now'", "PRAGMA user_version = 5", "SELECT 1; SELECT 2"] {
            let err = run_query(State(state.clone()), query(sql)).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{sql}");
        }
    }

    #[tokio::test]
    async fn test_runaway_query_is_bad_request() {
        let dir = tempdir().unwrap();
        let mut state = test_state(dir.path());
        state.console.max_execution_ms = 50;

        let sql = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT max(x) FROM c";
        let err = run_query(State(state), query(sql)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_schema() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let Json(resp) = schema(State(state)).await.unwrap();
        assert!(resp.tables.iter().any(|t| t.name == "targets"));
    }
}
