//! Status change history.

use anyhow::Result;
use serde::Serialize;

use super::Db;

/// One row of `activity_log`. Written only by [`Db::update_status`].
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub organization: String,
    pub old_status: Option<String>,
    pub new_status: String,
    pub timestamp: String,
}

impl Db {
    /// Most recent transitions first.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, organization, old_status, new_status, timestamp
            FROM activity_log
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let entries = stmt
            .query_map([limit as i64], |row| {
                Ok(ActivityEntry {
                    id: row.get(0)?,
                    organization: row.get(1)?,
                    old_status: row.get(2)?,
                    new_status: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::testing::*;
    use tempfile::tempdir;

    #[test]
    fn test_recent_activity_respects_limit() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        insert_target(&db, "Acme", Some("not-contacted"), None);

        for i in 0..5 {
            db.update_status("Acme", &format!("stage-{i}")).unwrap();
        }

        let log = db.recent_activity(3).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].new_status, "stage-4");
        assert_eq!(log[2].new_status, "stage-2");
    }
}
