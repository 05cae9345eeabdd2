//! Free-text notes attached to targets.

use anyhow::Result;
use chrono::Local;
use rusqlite::OptionalExtension;
use serde::Serialize;

use super::Db;

const NOTE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub id: i64,
    pub target_id: String,
    pub content: String,
    pub timestamp: String,
}

impl Db {
    pub fn notes_for(&self, target_id: &str) -> Result<Vec<Note>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, target_id, content, timestamp
            FROM notes
            WHERE target_id = ?1
            ORDER BY timestamp DESC, id DESC
            "#,
        )?;
        let notes = stmt
            .query_map([target_id], |row| {
                Ok(Note {
                    id: row.get(0)?,
                    target_id: row.get(1)?,
                    content: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    /// Insert a note stamped with the server's local time and return it as stored.
    pub fn add_note(&self, target_id: &str, content: &str) -> Result<Note> {
        let conn = self.open()?;
        let timestamp = Local::now().format(NOTE_TIMESTAMP_FORMAT).to_string();
        conn.execute(
            "INSERT INTO notes (target_id, content, timestamp) VALUES (?1, ?2, ?3)",
            rusqlite::params![target_id, content, timestamp],
        )?;
        let id = conn.last_insert_rowid();

        let note = conn.query_row(
            "SELECT id, target_id, content, timestamp FROM notes WHERE id = ?1",
            [id],
            |row| {
                Ok(Note {
                    id: row.get(0)?,
                    target_id: row.get(1)?,
                    content: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            },
        )?;
        Ok(note)
    }

    /// Returns `false` when no note has this id.
    pub fn delete_note(&self, id: i64) -> Result<bool> {
        let conn = self.open()?;
        let exists = conn
            .query_row("SELECT 1 FROM notes WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(false);
        }
        conn.execute("DELETE FROM notes WHERE id = ?1", [id])?;
        Ok(true)
    }
}
