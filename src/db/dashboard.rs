//! Read-only aggregations for the dashboard.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::targets::DEFAULT_STATUS;
use super::{column_json, Db};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub count: i64,
    /// Integer unless some population was stored as a real.
    pub total_population: JsonValue,
    pub avg_income: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub status_summary: BTreeMap<String, StatusSummary>,
    pub grade_summary: BTreeMap<String, i64>,
}

/// Reduced target row for the per-status drill-down.
#[derive(Debug, Clone, Serialize)]
pub struct StatusDetail {
    pub organization: String,
    pub address: JsonValue,
    pub population: JsonValue,
    pub median_income: JsonValue,
    pub latitude: JsonValue,
    pub longitude: JsonValue,
    pub grade: JsonValue,
}

impl Db {
    pub fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let conn = self.open()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT COALESCE(CAST(status AS TEXT), ?1) AS status,
                   COUNT(*) AS count,
                   SUM(population) AS total_population,
                   AVG(median_income) AS avg_income
            FROM targets
            GROUP BY COALESCE(CAST(status AS TEXT), ?1)
            "#,
        )?;
        let status_summary = stmt
            .query_map([DEFAULT_STATUS], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    StatusSummary {
                        count: row.get(1)?,
                        total_population: column_json(row, 2)?,
                        avg_income: row.get(3)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT CAST(z.grade AS TEXT) AS grade, COUNT(*) AS count
            FROM targets t
            LEFT JOIN zip_data z ON t.region = z.zip_code
            WHERE z.grade IS NOT NULL AND z.grade != ''
            GROUP BY CAST(z.grade AS TEXT)
            "#,
        )?;
        let grade_summary = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        Ok(DashboardSummary {
            status_summary,
            grade_summary,
        })
    }

    /// Targets whose status, defaulting to `not-contacted`, equals `status`.
    pub fn targets_with_status(&self, status: &str) -> Result<Vec<StatusDetail>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT CAST(t.organization AS TEXT), t.address, t.population, t.median_income,
                   t.latitude, t.longitude, z.grade
            FROM targets t
            LEFT JOIN zip_data z ON t.region = z.zip_code
            WHERE COALESCE(CAST(t.status AS TEXT), ?2) = ?1
            ORDER BY t.organization
            "#,
        )?;
        let details = stmt
            .query_map([status, DEFAULT_STATUS], |row| {
                Ok(StatusDetail {
                    organization: row.get(0)?,
                    address: column_json(row, 1)?,
                    population: column_json(row, 2)?,
                    median_income: column_json(row, 3)?,
                    latitude: column_json(row, 4)?,
                    longitude: column_json(row, 5)?,
                    grade: column_json(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(details)
    }
}
