//! Targets, ZIP areas and status changes.

use anyhow::Result;
use rusqlite::{OptionalExtension, TransactionBehavior};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::{column_json, Db};

pub const DEFAULT_STATUS: &str = "not-contacted";

/// A target placed on the map: only rows with coordinates.
///
/// Everything except the key is passed through in its stored form.
#[derive(Debug, Clone, Serialize)]
pub struct TargetPin {
    pub organization: String,
    pub address: JsonValue,
    pub phone: JsonValue,
    pub website: JsonValue,
    pub population: JsonValue,
    pub median_income: JsonValue,
    pub status: JsonValue,
    pub latitude: JsonValue,
    pub longitude: JsonValue,
    pub grade: JsonValue,
}

/// A card on the kanban board. Missing values are filled for display.
#[derive(Debug, Clone, Serialize)]
pub struct KanbanCard {
    pub organization: String,
    pub address: JsonValue,
    pub phone: JsonValue,
    pub status: String,
    pub population: JsonValue,
    pub median_income: JsonValue,
    pub zip_grade: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub old_status: Option<String>,
    pub new_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZipArea {
    pub zip_code: JsonValue,
    pub geographic_area: JsonValue,
    pub households: JsonValue,
    pub total_pop: JsonValue,
    pub median_income: JsonValue,
    pub grade: JsonValue,
    pub latitude: JsonValue,
    pub longitude: JsonValue,
    pub cluster_a_5mi: JsonValue,
    pub cluster_a_10mi: JsonValue,
    pub cluster_ab_5mi: JsonValue,
    pub cluster_ab_10mi: JsonValue,
    pub cluster_abc_5mi: JsonValue,
    pub cluster_abc_10mi: JsonValue,
    pub cluster_bc_5mi: JsonValue,
    pub cluster_bc_10mi: JsonValue,
}

/// One ZIP inside a cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterMember {
    pub zip: JsonValue,
    pub lat: JsonValue,
    pub lng: JsonValue,
    pub total_pop: JsonValue,
    pub median_income: JsonValue,
    pub grade: JsonValue,
}

/// Null and empty strings read as absent.
fn or_na(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => JsonValue::from("N/A"),
        JsonValue::String(s) if s.is_empty() => JsonValue::from("N/A"),
        other => other,
    }
}

/// Cluster classification: a grade set combined with a radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKind {
    A5,
    A10,
    Ab5,
    Ab10,
    Abc5,
    Abc10,
    Bc5,
    Bc10,
}

impl ClusterKind {
    pub const ALL: [ClusterKind; 8] = [
        ClusterKind::A5,
        ClusterKind::A10,
        ClusterKind::Ab5,
        ClusterKind::Ab10,
        ClusterKind::Abc5,
        ClusterKind::Abc10,
        ClusterKind::Bc5,
        ClusterKind::Bc10,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ClusterKind::A5 => "a_5mi",
            ClusterKind::A10 => "a_10mi",
            ClusterKind::Ab5 => "ab_5mi",
            ClusterKind::Ab10 => "ab_10mi",
            ClusterKind::Abc5 => "abc_5mi",
            ClusterKind::Abc10 => "abc_10mi",
            ClusterKind::Bc5 => "bc_5mi",
            ClusterKind::Bc10 => "bc_10mi",
        }
    }

    /// Case-insensitive lookup by key, e.g. `"AB_10mi"`.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    /// The `zip_data` column holding this classification's labels.
    pub fn column(&self) -> &'static str {
        match self {
            ClusterKind::A5 => "cluster_a_5mi",
            ClusterKind::A10 => "cluster_a_10mi",
            ClusterKind::Ab5 => "cluster_ab_5mi",
            ClusterKind::Ab10 => "cluster_ab_10mi",
            ClusterKind::Abc5 => "cluster_abc_5mi",
            ClusterKind::Abc10 => "cluster_abc_10mi",
            ClusterKind::Bc5 => "cluster_bc_5mi",
            ClusterKind::Bc10 => "cluster_bc_10mi",
        }
    }
}

impl Db {
    pub fn list_targets(&self) -> Result<Vec<TargetPin>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT CAST(t.organization AS TEXT), t.address, t.phone, t.website,
                   t.population, t.median_income, t.status, t.latitude, t.longitude,
                   z.grade
            FROM targets t
            LEFT JOIN zip_data z ON t.region = z.zip_code
            WHERE t.latitude IS NOT NULL AND t.longitude IS NOT NULL
            ORDER BY t.organization
            "#,
        )?;
        let targets = stmt
            .query_map([], |row| {
                Ok(TargetPin {
                    organization: row.get(0)?,
                    address: column_json(row, 1)?,
                    phone: column_json(row, 2)?,
                    website: column_json(row, 3)?,
                    population: column_json(row, 4)?,
                    median_income: column_json(row, 5)?,
                    status: column_json(row, 6)?,
                    latitude: column_json(row, 7)?,
                    longitude: column_json(row, 8)?,
                    grade: column_json(row, 9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(targets)
    }

    pub fn kanban_cards(&self) -> Result<Vec<KanbanCard>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT CAST(t.organization AS TEXT),
                   t.address,
                   t.phone,
                   COALESCE(CAST(t.status AS TEXT), ?1) AS status,
                   t.population,
                   t.median_income,
                   z.grade
            FROM targets t
            LEFT JOIN zip_data z ON t.region = z.zip_code
            ORDER BY t.organization
            "#,
        )?;
        let cards = stmt
            .query_map([DEFAULT_STATUS], |row| {
                Ok(KanbanCard {
                    organization: row.get(0)?,
                    address: column_json(row, 1)?,
                    phone: or_na(column_json(row, 2)?),
                    status: row.get(3)?,
                    population: column_json(row, 4)?,
                    median_income: column_json(row, 5)?,
                    zip_grade: or_na(column_json(row, 6)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    /// Set a target's status and log the transition in one transaction.
    ///
    /// Returns `None` when the organization does not exist; nothing is
    /// written in that case.
    pub fn update_status(&self, organization: &str, new_status: &str) -> Result<Option<StatusChange>> {
        let mut conn = self.open()?;
        // Immediate: take the write lock before reading the old status.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<Option<String>> = tx
            .query_row(
                "SELECT CAST(status AS TEXT) FROM targets WHERE organization = ?1",
                [organization],
                |row| row.get(0),
            )
            .optional()?;
        let Some(old_status) = current else {
            return Ok(None);
        };

        tx.execute(
            r#"
            UPDATE targets
            SET status = ?1, last_updated = CURRENT_TIMESTAMP
            WHERE organization = ?2
            "#,
            rusqlite::params![new_status, organization],
        )?;
        tx.execute(
            "INSERT INTO activity_log (organization, old_status, new_status) VALUES (?1, ?2, ?3)",
            rusqlite::params![organization, old_status, new_status],
        )?;
        tx.commit()?;

        Ok(Some(StatusChange {
            old_status,
            new_status: new_status.to_string(),
        }))
    }

    pub fn list_zips(&self) -> Result<Vec<ZipArea>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT zip_code, geographic_area, households, total_pop,
                   median_income, grade, latitude, longitude,
                   cluster_a_5mi, cluster_a_10mi, cluster_ab_5mi,
                   cluster_ab_10mi, cluster_abc_5mi, cluster_abc_10mi,
                   cluster_bc_5mi, cluster_bc_10mi
            FROM zip_data
            WHERE latitude IS NOT NULL AND longitude IS NOT NULL
            ORDER BY zip_code
            "#,
        )?;
        let zips = stmt
            .query_map([], |row| {
                Ok(ZipArea {
                    zip_code: column_json(row, 0)?,
                    geographic_area: column_json(row, 1)?,
                    households: column_json(row, 2)?,
                    total_pop: column_json(row, 3)?,
                    median_income: column_json(row, 4)?,
                    grade: column_json(row, 5)?,
                    latitude: column_json(row, 6)?,
                    longitude: column_json(row, 7)?,
                    cluster_a_5mi: column_json(row, 8)?,
                    cluster_a_10mi: column_json(row, 9)?,
                    cluster_ab_5mi: column_json(row, 10)?,
                    cluster_ab_10mi: column_json(row, 11)?,
                    cluster_abc_5mi: column_json(row, 12)?,
                    cluster_abc_10mi: column_json(row, 13)?,
                    cluster_bc_5mi: column_json(row, 14)?,
                    cluster_bc_10mi: column_json(row, 15)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tracing::debug!("Retrieved {} ZIP codes", zips.len());
        Ok(zips)
    }

    /// ZIPs grouped by their label under one classification.
    pub fn clusters(&self, kind: ClusterKind) -> Result<BTreeMap<String, Vec<ClusterMember>>> {
        let conn = self.open()?;
        // The column name comes from a closed enum, never from request input.
        let column = kind.column();
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT CAST({column} AS TEXT), zip_code, latitude, longitude,
                   total_pop, median_income, grade
            FROM zip_data
            WHERE {column} IS NOT NULL
              AND latitude IS NOT NULL AND longitude IS NOT NULL
            ORDER BY zip_code
            "#
        ))?;
        let mut clusters: BTreeMap<String, Vec<ClusterMember>> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                ClusterMember {
                    zip: column_json(row, 1)?,
                    lat: column_json(row, 2)?,
                    lng: column_json(row, 3)?,
                    total_pop: column_json(row, 4)?,
                    median_income: column_json(row, 5)?,
                    grade: column_json(row, 6)?,
                },
            ))
        })?;
        for row in rows {
            let (label, member) = row?;
            clusters.entry(label).or_default().push(member);
        }
        tracing::debug!("Retrieved {} clusters for {}", clusters.len(), kind.key());
        Ok(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use tempfile::tempdir;

    fn insert_zip(db: &Db, zip: &str, grade: Option<&str>, cluster_ab_5mi: Option<&str>) {
        let conn = db.open().unwrap();
        conn.execute(
            r#"
            INSERT INTO zip_data (zip_code, geographic_area, households, total_pop,
                                  median_income, grade, latitude, longitude, cluster_ab_5mi)
            VALUES (?1, 'Area', 100, 250, 61000.0, ?2, 40.1, -75.1, ?3)
            "#,
            rusqlite::params![zip, grade, cluster_ab_5mi],
        )
        .unwrap();
    }

    #[test]
    fn test_update_status_logs_transition() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        insert_target(&db, "Acme", Some("not-contacted"), None);

        let change = db.update_status("Acme", "contacted").unwrap().unwrap();
        assert_eq!(change.old_status.as_deref(), Some("not-contacted"));
        assert_eq!(change.new_status, "contacted");

        let log = db.recent_activity(50).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].organization, "Acme");
        assert_eq!(log[0].old_status.as_deref(), Some("not-contacted"));
        assert_eq!(log[0].new_status, "contacted");
    }

    #[test]
    fn test_every_update_appends_one_entry() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        insert_target(&db, "Acme", Some("not-contacted"), None);

        db.update_status("Acme", "contacted").unwrap();
        db.update_status("Acme", "meeting").unwrap();
        let change = db.update_status("Acme", "meeting").unwrap().unwrap();
        assert_eq!(change.old_status.as_deref(), Some("meeting"));

        let log = db.recent_activity(50).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].old_status.as_deref(), Some("meeting"));
        assert_eq!(log[1].old_status.as_deref(), Some("contacted"));
        assert_eq!(log[2].old_status.as_deref(), Some("not-contacted"));
    }

    #[test]
    fn test_update_unknown_organization() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());

        assert!(db.update_status("Nobody", "contacted").unwrap().is_none());
        assert!(db.recent_activity(50).unwrap().is_empty());
    }

    #[test]
    fn test_list_targets_joins_grade_and_skips_unplaced() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        insert_zip(&db, "19104", Some("A"), None);
        insert_target(&db, "Placed", None, Some("19104"));
        insert_target(&db, "Unplaced", None, None);
        db.open()
            .unwrap()
            .execute("UPDATE targets SET latitude = NULL WHERE organization = 'Unplaced'", [])
            .unwrap();

        let targets = db.list_targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].organization, "Placed");
        assert_eq!(targets[0].grade, "A");
    }

    #[test]
    fn test_kanban_fills_defaults() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        insert_target(&db, "Acme", None, None);

        let cards = db.kanban_cards().unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].status, DEFAULT_STATUS);
        assert_eq!(cards[0].phone, "N/A");
        assert_eq!(cards[0].zip_grade, "N/A");
    }

    #[test]
    fn test_projections_pass_through_stored_types() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        insert_target(&db, "Acme", Some("contacted"), None);
        // REAL in an INTEGER column, TEXT in a REAL column
        db.open()
            .unwrap()
            .execute(
                "UPDATE targets SET population = 1234.5, median_income = 'unknown'",
                [],
            )
            .unwrap();

        let targets = db.list_targets().unwrap();
        assert_eq!(targets[0].population, serde_json::json!(1234.5));
        assert_eq!(targets[0].median_income, "unknown");

        let cards = db.kanban_cards().unwrap();
        assert_eq!(cards[0].population, serde_json::json!(1234.5));
        assert_eq!(cards[0].median_income, "unknown");
    }

    #[test]
    fn test_integer_zip_codes_from_foreign_database() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        {
            let conn = db.open().unwrap();
            conn.execute_batch(
                r#"
                DROP TABLE zip_data;
                CREATE TABLE zip_data (
                    zip_code INTEGER PRIMARY KEY, geographic_area TEXT, households INTEGER,
                    total_pop INTEGER, median_income REAL, grade TEXT,
                    latitude REAL, longitude REAL,
                    cluster_a_5mi INTEGER, cluster_a_10mi TEXT, cluster_ab_5mi TEXT,
                    cluster_ab_10mi TEXT, cluster_abc_5mi TEXT, cluster_abc_10mi TEXT,
                    cluster_bc_5mi TEXT, cluster_bc_10mi TEXT
                );
                INSERT INTO zip_data (zip_code, grade, latitude, longitude, cluster_a_5mi)
                VALUES (19104, 'A', 40.1, -75.1, 3), (19103, 'A', 40.2, -75.2, 3);
                "#,
            )
            .unwrap();
        }
        insert_target(&db, "Acme", None, Some("19104"));

        let zips = db.list_zips().unwrap();
        assert_eq!(zips.len(), 2);
        assert_eq!(zips[0].zip_code, 19103);

        let clusters = db.clusters(ClusterKind::A5).unwrap();
        assert_eq!(clusters["3"].len(), 2);
        assert_eq!(clusters["3"][1].zip, 19104);

        let targets = db.list_targets().unwrap();
        assert_eq!(targets[0].grade, "A");
    }

    #[test]
    fn test_clusters_group_by_label() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        insert_zip(&db, "19104", Some("A"), Some("North"));
        insert_zip(&db, "19103", Some("B"), Some("North"));
        insert_zip(&db, "19147", Some("A"), Some("South"));
        insert_zip(&db, "19148", Some("C"), None);

        let clusters = db.clusters(ClusterKind::Ab5).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters["North"].len(), 2);
        assert_eq!(clusters["South"][0].zip, "19147");
        assert_eq!(clusters["South"][0].lat, serde_json::json!(40.1));

        assert!(db.clusters(ClusterKind::Bc10).unwrap().is_empty());
    }

    #[test]
    fn test_cluster_kind_lookup() {
        assert_eq!(ClusterKind::from_key("AB_10mi"), Some(ClusterKind::Ab10));
        assert_eq!(ClusterKind::from_key("abc_5mi"), Some(ClusterKind::Abc5));
        assert_eq!(ClusterKind::from_key("a_5mi; DROP TABLE zip_data"), None);
        assert_eq!(ClusterKind::from_key(""), None);
    }
}
