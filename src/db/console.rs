//! Ad-hoc query console.
//!
//! Statements are gated twice. The keyword denylist is a coarse textual
//! filter: it rejects `SELECT 'update now'` as readily as `UPDATE targets`.
//! The structural gate then refuses multi-statement input, prepares the
//! statement and requires SQLite to classify it as read-only, which catches
//! writes the denylist has no word for (`PRAGMA user_version = 5`,
//! `REPLACE INTO`, `VACUUM`). An authorizer additionally blocks `ATTACH`,
//! `DETACH` and transaction control, which SQLite counts as read-only.
//!
//! Execution is bounded by `console.max_execution_ms`: a progress handler
//! interrupts the statement once the deadline passes.

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::time::{Duration, Instant};
use tracing::warn;

use super::Db;
use crate::config::ConsoleConfig;

/// VM instructions between deadline checks.
const PROGRESS_HANDLER_OPS: i32 = 1000;

/// Substrings that reject a statement outright, matched case-insensitively.
pub const DENYLIST: &[&str] = &["drop", "truncate", "delete", "update", "insert", "alter", "create"];

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("empty query")]
    Empty,

    #[error("query contains blocked keyword '{0}'")]
    Blocked(&'static str),

    #[error("multiple statements are not allowed")]
    MultipleStatements,

    #[error("only read-only statements are allowed")]
    NotReadOnly,

    #[error("invalid query: {0}")]
    Invalid(String),

    #[error("query exceeded the {0} ms execution limit")]
    TimedOut(u64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, JsonValue>>,
    pub row_count: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ConsoleOutcome {
    Rows(QueryRows),
    Executed { success: bool, message: String },
}

/// First denylisted keyword appearing anywhere in `sql`.
pub fn blocked_keyword(sql: &str) -> Option<&'static str> {
    let lower = sql.to_lowercase();
    DENYLIST.iter().copied().find(|keyword| lower.contains(keyword))
}

/// True when a `;` is followed by anything other than whitespace or comments.
/// Quoted strings, quoted identifiers and comments are skipped.
fn has_trailing_statement(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut i = 0;
    let mut found_semicolon = false;

    while i < len {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                if found_semicolon {
                    return true;
                }
                i += 1;
                while i < len {
                    if bytes[i] == quote {
                        i += 1;
                        // doubled quote is an escaped quote
                        if i < len && bytes[i] == quote {
                            i += 1;
                        } else {
                            break;
                        }
                    } else {
                        i += 1;
                    }
                }
            }
            b'-' if i + 1 < len && bytes[i + 1] == b'-' => {
                i += 2;
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
                i += 2;
                while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
            }
            b';' => {
                found_semicolon = true;
                i += 1;
            }
            byte => {
                if found_semicolon && !byte.is_ascii_whitespace() {
                    return true;
                }
                i += 1;
            }
        }
    }
    false
}

fn console_authorizer(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Attach { .. } | AuthAction::Detach { .. } | AuthAction::Transaction { .. } => {
            Authorization::Deny
        }
        _ => Authorization::Allow,
    }
}

fn install_progress_handler(conn: &Connection, deadline: Instant) {
    conn.progress_handler(PROGRESS_HANDLER_OPS, Some(move || Instant::now() > deadline));
}

fn is_interrupt_error(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::OperationInterrupted,
                ..
            },
            _
        )
    )
}

pub(crate) fn value_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::String(format!("<blob {} bytes>", bytes.len())),
    }
}

impl Db {
    /// Run one operator-supplied statement. Rows beyond `limits.max_rows` are
    /// dropped and the result is marked truncated. A statement still running
    /// at `limits.max_execution_ms` is interrupted: rows collected so far are
    /// returned as truncated, and with none collected the query fails.
    pub fn run_console_query(&self, sql: &str, limits: &ConsoleConfig) -> Result<ConsoleOutcome, ConsoleError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(ConsoleError::Empty);
        }
        if let Some(keyword) = blocked_keyword(sql) {
            return Err(ConsoleError::Blocked(keyword));
        }
        if has_trailing_statement(sql) {
            return Err(ConsoleError::MultipleStatements);
        }

        let conn = self.open()?;
        conn.authorizer(Some(console_authorizer));
        install_progress_handler(
            &conn,
            Instant::now() + Duration::from_millis(limits.max_execution_ms),
        );

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ConsoleError::Invalid(e.to_string()))?;
        if !stmt.readonly() {
            return Err(ConsoleError::NotReadOnly);
        }

        let column_count = stmt.column_count();
        if column_count == 0 {
            stmt.raw_execute().map_err(|e| {
                if is_interrupt_error(&e) {
                    ConsoleError::TimedOut(limits.max_execution_ms)
                } else {
                    ConsoleError::Invalid(e.to_string())
                }
            })?;
            return Ok(ConsoleOutcome::Executed {
                success: true,
                message: "Query executed successfully".to_string(),
            });
        }

        let columns: Vec<String> = (0..column_count)
            .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
            .collect();

        let mut rows = Vec::new();
        let mut truncated = false;
        let mut raw_rows = stmt.raw_query();
        loop {
            let row = match raw_rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) if is_interrupt_error(&e) => {
                    if rows.is_empty() {
                        return Err(ConsoleError::TimedOut(limits.max_execution_ms));
                    }
                    warn!(rows = rows.len(), "console query interrupted at deadline");
                    truncated = true;
                    break;
                }
                Err(e) => return Err(ConsoleError::Invalid(e.to_string())),
            };
            if rows.len() >= limits.max_rows {
                truncated = true;
                break;
            }
            let mut record = Map::with_capacity(column_count);
            for (i, column) in columns.iter().enumerate() {
                let value = row
                    .get_ref(i)
                    .map_err(|e| ConsoleError::Invalid(e.to_string()))?;
                record.insert(column.clone(), value_to_json(value));
            }
            rows.push(record);
        }

        Ok(ConsoleOutcome::Rows(QueryRows {
            row_count: rows.len(),
            columns,
            rows,
            truncated,
        }))
    }
}
