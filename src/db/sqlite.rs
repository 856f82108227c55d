use super::{
    quote_ident, ColumnDescriptor, Database, ForeignKeyEdge, IndexDescriptor, StatementOutcome,
};
use crate::error::DbError;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path).map_err(|e| DbError::Connect(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|e| DbError::Connect(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Runs a batch of statements, e.g. to seed a fixture database.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        let db = self.conn.lock().await;
        db.execute_batch(sql)?;
        Ok(())
    }
}

/// Splits a declared type such as `VARCHAR(50)` into `("VARCHAR", Some(50))`.
fn split_declared_type(declared: &str) -> (String, Option<i32>) {
    let declared = declared.trim();
    if let Some(open) = declared.find('(') {
        let base = declared[..open].trim().to_string();
        let args = declared[open + 1..].trim_end_matches(')');
        let first = args.split(',').next().unwrap_or("").trim();
        // Two-argument types like DECIMAL(10,2) carry precision, not a length.
        let length = if args.contains(',') {
            None
        } else {
            first.parse::<i32>().ok()
        };
        (base, length)
    } else {
        (declared.to_string(), None)
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> serde_json::Value {
    use serde_json::Value;

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> &str {
        "SQLite"
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let db = self.conn.lock().await;
        let mut stmt = db.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        let db = self.conn.lock().await;
        let mut stmt = db.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        // cid, name, type, notnull, dflt_value, pk
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let pk_count = raw.iter().filter(|(_, _, _, pk)| *pk > 0).count();

        Ok(raw
            .into_iter()
            .map(|(name, declared, not_null, pk)| {
                let (data_type, max_length) = split_declared_type(&declared);
                let is_primary_key = pk > 0;
                // A lone INTEGER PRIMARY KEY aliases the rowid.
                let is_identity =
                    is_primary_key && pk_count == 1 && data_type.eq_ignore_ascii_case("INTEGER");
                ColumnDescriptor {
                    name,
                    data_type,
                    max_length,
                    is_nullable: !not_null && !is_identity,
                    is_primary_key,
                    is_identity,
                }
            })
            .collect())
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>, DbError> {
        let db = self.conn.lock().await;
        let mut stmt = db.prepare(&format!("PRAGMA index_list({})", quote_ident(table)))?;
        // seq, name, unique, origin, partial
        let listed = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut indexes = Vec::new();
        // index_list is newest first; report in creation order.
        for (name, is_unique, origin) in listed.into_iter().rev() {
            // "c" = CREATE INDEX; "pk" and "u" back constraints.
            if origin != "c" {
                continue;
            }
            let mut info = db.prepare(&format!("PRAGMA index_info({})", quote_ident(&name)))?;
            // seqno, cid, name
            let mut keyed = info
                .query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            keyed.sort_by_key(|(seqno, _)| *seqno);

            indexes.push(IndexDescriptor {
                name,
                table: table.to_string(),
                columns: keyed
                    .into_iter()
                    .map(|(_, col)| col.unwrap_or_else(|| "<expr>".to_string()))
                    .collect(),
                is_unique,
                is_primary_key: false,
            });
        }
        Ok(indexes)
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>, DbError> {
        let tables = self.list_tables().await?;
        let db = self.conn.lock().await;

        let mut edges = Vec::new();
        for table in &tables {
            let mut stmt = db.prepare(&format!(
                "PRAGMA foreign_key_list({})",
                quote_ident(table)
            ))?;
            // id, seq, table, from, to, on_update, on_delete, match
            let mut rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.sort_by_key(|(id, seq, ..)| (*id, *seq));
            for (id, _, referenced_table, from, to) in rows {
                edges.push(ForeignKeyEdge {
                    constraint_name: format!("fk_{table}_{id}"),
                    parent_table: table.clone(),
                    parent_column: from,
                    referenced_table,
                    referenced_column: to.unwrap_or_else(|| "?".to_string()),
                });
            }
        }
        Ok(edges)
    }

    async fn execute(&self, sql: &str) -> Result<StatementOutcome, DbError> {
        debug!(sql = %sql, "Executing SQLite statement");
        let db = self.conn.lock().await;
        let mut stmt = db.prepare(sql)?;

        if stmt.column_count() == 0 {
            let affected = stmt.execute([])?;
            return Ok(StatementOutcome::Affected(affected as u64));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = stmt.query([])?;
        let mut result_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(value_ref_to_json(row.get_ref(i)?));
            }
            result_rows.push(values);
        }

        Ok(StatementOutcome::Rows {
            columns,
            rows: result_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_length_from_declared_type() {
        assert_eq!(
            split_declared_type("VARCHAR(50)"),
            ("VARCHAR".to_string(), Some(50))
        );
        assert_eq!(split_declared_type("TEXT"), ("TEXT".to_string(), None));
        assert_eq!(
            split_declared_type("DECIMAL(10, 2)"),
            ("DECIMAL".to_string(), None)
        );
    }
}
