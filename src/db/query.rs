use super::{Database, StatementOutcome};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
    RowSet {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    MutationAcknowledged {
        rows_affected: u64,
    },
    Error {
        message: String,
    },
}

impl QueryResult {
    pub fn error_message(&self) -> Option<&str> {
        match self {
            QueryResult::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error { .. })
    }

    /// Tab-separated rendering for terminals.
    pub fn to_text(&self) -> String {
        match self {
            QueryResult::RowSet { columns, rows } => {
                let mut lines = vec![columns.join("\t")];
                lines.extend(
                    rows.iter()
                        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>().join("\t")),
                );
                lines.join("\n")
            }
            QueryResult::MutationAcknowledged { rows_affected } => {
                format!("Query executed successfully ({rows_affected} rows affected).")
            }
            QueryResult::Error { message } => format!("Error executing SQL: {message}"),
        }
    }

    /// Writes a row set as CSV with a header row. Other variants write nothing.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let QueryResult::RowSet { columns, rows } = self else {
            return Ok(());
        };
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(columns)?;
        for row in rows {
            wtr.write_record(row.iter().map(cell_text))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Runs model-generated SQL. Every failure becomes `QueryResult::Error`.
pub async fn execute_query(db: &dyn Database, sql: &str) -> QueryResult {
    let start = Instant::now();
    let outcome = db.execute(sql).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(StatementOutcome::Rows { columns, rows }) => {
            info!(rows = rows.len(), elapsed_ms, "Query returned rows");
            QueryResult::RowSet { columns, rows }
        }
        Ok(StatementOutcome::Affected(rows_affected)) => {
            info!(rows_affected, elapsed_ms, "Statement committed");
            QueryResult::MutationAcknowledged { rows_affected }
        }
        Err(e) => {
            debug!(error = %e, "Query failed");
            QueryResult::Error {
                message: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_csv_with_header() {
        let result = QueryResult::RowSet {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![vec![json!(1), json!("Ada, Countess")], vec![json!(2), json!(null)]],
        };
        let mut buf = Vec::new();
        result.write_csv(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "id,name\n1,\"Ada, Countess\"\n2,NULL\n"
        );
    }

    #[test]
    fn renders_each_variant_as_text() {
        let ack = QueryResult::MutationAcknowledged { rows_affected: 3 };
        assert!(ack.to_text().contains("3 rows affected"));

        let err = QueryResult::Error {
            message: "no such table: Foo".to_string(),
        };
        assert_eq!(err.error_message(), Some("no such table: Foo"));
        assert!(err.to_text().contains("no such table: Foo"));
    }
}
