//! Schema introspection for the admin panel and the CSV tools.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::console::value_to_json;
use super::Db;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub sql: Option<String>,
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
}

/// Quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        r#"SELECT cid, name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
    )?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnInfo {
                cid: row.get(0)?,
                name: row.get(1)?,
                data_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if columns.is_empty() {
        anyhow::bail!("no such table: {table}");
    }
    Ok(columns)
}

impl Db {
    /// User tables with their columns, row counts and DDL, by name.
    pub fn schema(&self) -> Result<Vec<TableInfo>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT name, sql FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )?;
        let tables = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut result = Vec::with_capacity(tables.len());
        for (name, sql) in tables {
            let columns = table_columns(&conn, &name)?;
            let row_count = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(&name)),
                [],
                |row| row.get(0),
            )?;
            result.push(TableInfo {
                name,
                sql,
                row_count,
                columns,
            });
        }
        Ok(result)
    }

    pub fn columns_of(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.open()?;
        table_columns(&conn, table)
    }

    /// First `limit` rows of a table as JSON values, in column order.
    pub fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Vec<JsonValue>>> {
        let conn = self.open()?;
        let column_count = table_columns(&conn, table)?.len();
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT ?1", quote_ident(table)))?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                (0..column_count)
                    .map(|i| row.get_ref(i).map(value_to_json))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
