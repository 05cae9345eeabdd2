//! Bulk replacement of `targets` from a CSV file.

use anyhow::{Context, Result};
use rusqlite::types::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::db::introspect::{quote_ident, table_columns};
use crate::db::Db;

#[derive(Debug, thiserror::Error)]
#[error("CSV columns do not match the targets table (missing: {missing:?}, extra: {extra:?})")]
pub struct HeaderMismatch {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

/// Replace every row of `targets` with the rows of `csv_path`.
///
/// The header must name exactly the table's columns, in any order. Empty
/// cells are stored as NULL. Everything happens in one transaction, so a
/// bad row leaves the table as it was. Returns the final row count.
pub fn import_targets(db: &Db, csv_path: &Path) -> Result<i64> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut conn = db.open()?;
    let columns: BTreeSet<String> = table_columns(&conn, "targets")?
        .into_iter()
        .map(|c| c.name)
        .collect();
    let header_set: BTreeSet<String> = headers.iter().cloned().collect();
    if header_set != columns || header_set.len() != headers.len() {
        return Err(HeaderMismatch {
            missing: columns.difference(&header_set).cloned().collect(),
            extra: header_set.difference(&columns).cloned().collect(),
        }
        .into());
    }

    let insert = format!(
        "INSERT INTO targets ({}) VALUES ({})",
        headers.iter().map(|h| quote_ident(h)).collect::<Vec<_>>().join(", "),
        (1..=headers.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
    );

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM targets", [])?;
    let mut inserted = 0usize;
    {
        let mut stmt = tx.prepare(&insert)?;
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let values: Vec<Value> = record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::Text(cell.to_string())
                    }
                })
                .collect();
            stmt.execute(rusqlite::params_from_iter(values))
                .with_context(|| format!("Failed to insert CSV record {}", line + 1))?;
            inserted += 1;
        }
    }
    let count: i64 = tx.query_row("SELECT COUNT(*) FROM targets", [], |row| row.get(0))?;
    tx.commit()?;

    info!(inserted, count, "imported targets from {}", csv_path.display());
    Ok(count)
}
