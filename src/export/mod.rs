use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::types::ValueRef;
use std::path::{Path, PathBuf};

use crate::db::introspect::{quote_ident, table_columns};
use crate::db::Db;

/// Default output name, `targets_export_<YYYYmmdd_HHMMSS>.csv`.
pub fn default_export_path() -> PathBuf {
    PathBuf::from(format!(
        "targets_export_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

fn cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Write every column of `targets` to a CSV file with a header row.
/// Returns the number of data rows written.
pub fn export_targets(db: &Db, output_path: &Path) -> Result<usize> {
    let conn = db.open()?;
    let columns: Vec<String> = table_columns(&conn, "targets")?
        .into_iter()
        .map(|c| c.name)
        .collect();

    let mut wtr = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    wtr.write_record(&columns)?;

    let select = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!("SELECT {select} FROM targets ORDER BY rowid"))?;
    let mut rows = stmt.query([])?;

    let mut count = 0;
    while let Some(row) = rows.next()? {
        let record = (0..columns.len())
            .map(|i| row.get_ref(i).map(cell))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        wtr.write_record(&record)?;
        count += 1;
    }

    wtr.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use tempfile::tempdir;

    #[test]
    fn test_export_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let db = fresh_db(dir.path());
        insert_target(&db, "Acme, Inc.", Some("contacted"), Some("19104"));
        insert_target(&db, "Beta", None, None);

        let out = dir.path().join("out.csv");
        assert_eq!(export_targets(&db, &out).unwrap(), 2);

        let mut rdr = csv::Reader::from_path(&out).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(&headers[0], "organization");
        let org_idx = 0;
        let phone_idx = headers.iter().position(|h| h == "phone").unwrap();
        let status_idx = headers.iter().position(|h| h == "status").unwrap();

        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(&records[0][org_idx], "Acme, Inc.");
        assert_eq!(&records[0][status_idx], "contacted");
        assert_eq!(&records[0][phone_idx], "");
        assert_eq!(&records[1][status_idx], "");
    }

    #[test]
    fn test_default_export_path() {
        let path = default_export_path();
        let name = path.to_string_lossy();
        assert!(name.starts_with("targets_export_"));
        assert!(name.ends_with(".csv"));
    }
}
