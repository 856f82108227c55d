use super::{ColumnDescriptor, Database, ForeignKeyEdge, IndexDescriptor, StatementOutcome};
use crate::error::IntrospectionError;
use serde::Serialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Sentinel written in place of SQL NULL in sample rows.
pub const NULL_SENTINEL: &str = "NULL";

/// File name of the aggregate schema artifact inside the context directory.
pub const SCHEMA_FILE: &str = "schema.txt";

/// Subdirectory of the context directory holding one sample file per table.
pub const SAMPLES_DIR: &str = "samples";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Samples {
    Rows {
        header: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },
    /// The sample query failed; holds the diagnostic shown instead.
    Unavailable(String),
}

/// One sample row viewed as a column-name to value mapping.
pub struct SampleRow<'a> {
    header: &'a [String],
    values: &'a [Option<String>],
}

impl<'a> SampleRow<'a> {
    /// `None` when the column is absent; `Some(None)` for SQL NULL.
    pub fn get(&self, column: &str) -> Option<Option<&'a str>> {
        self.header
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.values.get(i))
            .map(|v| v.as_deref())
    }
}

impl Samples {
    pub fn rows(&self) -> Vec<SampleRow<'_>> {
        match self {
            Samples::Rows { header, rows } => rows
                .iter()
                .map(|values| SampleRow { header, values })
                .collect(),
            Samples::Unavailable(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Set when column metadata could not be read; `columns` is then empty.
    pub metadata_error: Option<String>,
    pub indexes: Vec<IndexDescriptor>,
    /// Set when the index listing failed; `indexes` is then empty.
    pub index_error: Option<String>,
    pub samples: Samples,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaDocument {
    pub tables: Vec<TableDescriptor>,
    pub foreign_keys: Vec<ForeignKeyEdge>,
    /// Set when the foreign-key listing failed.
    pub foreign_key_error: Option<String>,
    text: String,
}

pub fn render_column(col: &ColumnDescriptor) -> String {
    let mut out = format!(" - {} ({}", col.name, col.data_type);
    if let Some(len) = col.max_length.filter(|len| *len > 0) {
        let _ = write!(out, "({len})");
    }
    out.push(')');

    let mut tags = Vec::new();
    if col.is_primary_key {
        tags.push("PK");
    }
    if col.is_identity {
        tags.push("Identity");
    }
    if !col.is_nullable {
        tags.push("NOT NULL");
    }
    if !tags.is_empty() {
        let _ = write!(out, " [{}]", tags.join(" "));
    }
    out
}

pub fn render_foreign_key(fk: &ForeignKeyEdge) -> String {
    format!(
        " - {}({}) -> {}({})",
        fk.parent_table, fk.parent_column, fk.referenced_table, fk.referenced_column
    )
}

pub fn render_index(index: &IndexDescriptor) -> String {
    let mut out = format!(
        " - {} ON {} ({})",
        index.name,
        index.table,
        index.columns.join(", ")
    );
    if index.is_unique {
        out.push_str(" UNIQUE");
    }
    if index.is_primary_key {
        out.push_str(" PRIMARY KEY");
    }
    out
}

impl TableDescriptor {
    pub fn render(&self) -> String {
        let mut out = format!("\nTable: {}\nColumns:\n", self.name);
        match &self.metadata_error {
            Some(err) => {
                let _ = writeln!(out, " (Could not retrieve columns: {err})");
            }
            None => {
                for col in &self.columns {
                    out.push_str(&render_column(col));
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Contents of this table's sample file.
    pub fn render_samples(&self) -> String {
        let mut out = format!("Sample rows from table: {}\n\n", self.name);
        let lines: Vec<String> = match &self.samples {
            Samples::Rows { rows, .. } if rows.is_empty() => Vec::new(),
            Samples::Rows { header, rows } => std::iter::once(header.join("\t"))
                .chain(rows.iter().map(|row| {
                    row.iter()
                        .map(|v| v.as_deref().unwrap_or(NULL_SENTINEL))
                        .collect::<Vec<_>>()
                        .join("\t")
                }))
                .collect(),
            Samples::Unavailable(msg) => vec![msg.clone()],
        };
        out.push_str(&lines.join("\n"));
        out
    }
}

impl SchemaDocument {
    pub fn new(
        tables: Vec<TableDescriptor>,
        foreign_keys: Vec<ForeignKeyEdge>,
        foreign_key_error: Option<String>,
    ) -> Self {
        let mut doc = Self {
            tables,
            foreign_keys,
            foreign_key_error,
            text: String::new(),
        };
        doc.text = doc.render();
        doc
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&table.render());
        }

        out.push_str("\nForeign Key Relationships:\n");
        if let Some(err) = &self.foreign_key_error {
            let _ = writeln!(out, " (Could not retrieve foreign keys: {err})");
        }
        for fk in &self.foreign_keys {
            out.push_str(&render_foreign_key(fk));
            out.push('\n');
        }

        out.push_str("\nIndexes:\n");
        for table in &self.tables {
            if let Some(err) = &table.index_error {
                let _ = writeln!(out, " (Could not retrieve indexes for {}: {err})", table.name);
            }
            for index in &table.indexes {
                out.push_str(&render_index(index));
                out.push('\n');
            }
        }
        out
    }

    /// The aggregate schema text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Schema text handed to the model, optionally followed by every table's samples.
    pub fn prompt_context(&self, include_samples: bool) -> String {
        if !include_samples {
            return self.text.clone();
        }
        let mut out = self.text.clone();
        for table in &self.tables {
            out.push('\n');
            out.push_str(&table.render_samples());
            out.push('\n');
        }
        out
    }

    /// Writes `schema.txt` and `samples/<table>.txt` for every table into
    /// `dir`. A failed sample file is logged and the rest are still written;
    /// the first such error is returned once `schema.txt` is in place.
    pub fn persist(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir.join(SAMPLES_DIR))?;

        let mut first_error = None;
        for table in &self.tables {
            let path = sample_file_path(dir, &table.name);
            if let Err(e) = std::fs::write(&path, table.render_samples()) {
                warn!(path = %path.display(), error = %e, "Could not write sample file");
                first_error.get_or_insert(e);
            }
        }

        std::fs::write(dir.join(SCHEMA_FILE), &self.text)?;
        first_error.map_or(Ok(()), Err)
    }
}

/// Where the sample file of `table` lives inside a context directory.
pub fn sample_file_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(SAMPLES_DIR)
        .join(format!("{}.txt", sanitize_file_name(table)))
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

fn stringify(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

async fn fetch_samples(db: &dyn Database, table: &str, limit: usize) -> Samples {
    let sql = db.sample_query(table, limit);
    match db.execute(&sql).await {
        Ok(StatementOutcome::Rows { columns, rows }) => Samples::Rows {
            header: columns,
            rows: rows
                .iter()
                .map(|row| row.iter().map(stringify).collect())
                .collect(),
        },
        Ok(StatementOutcome::Affected(_)) => {
            Samples::Unavailable("(Could not retrieve sample rows: no result set)".to_string())
        }
        Err(e) => {
            warn!(table = %table, error = %e, "Sample rows unavailable");
            Samples::Unavailable(format!("(Could not retrieve sample rows: {e})"))
        }
    }
}

/// Reads the catalog and a bounded sample of every base table.
///
/// Only a failure to list tables is fatal. Per-table failures are recorded in
/// that table's descriptor and the build carries on. When `context_dir` is set,
/// the document is also written there; a write failure is logged and ignored.
pub async fn build_schema(
    db: &dyn Database,
    sample_limit: usize,
    context_dir: Option<&Path>,
) -> Result<SchemaDocument, IntrospectionError> {
    let table_names = db.list_tables().await?;
    info!(tables = table_names.len(), "Introspecting database");

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        let (columns, metadata_error) = match db.list_columns(&name).await {
            Ok(cols) => (cols, None),
            Err(e) => {
                warn!(table = %name, error = %e, "Column metadata unavailable");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let (indexes, index_error) = match db.list_indexes(&name).await {
            Ok(indexes) => (indexes, None),
            Err(e) => {
                warn!(table = %name, error = %e, "Index metadata unavailable");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let samples = fetch_samples(db, &name, sample_limit).await;

        tables.push(TableDescriptor {
            name,
            columns,
            metadata_error,
            indexes,
            index_error,
            samples,
        });
    }

    let (foreign_keys, foreign_key_error) = match db.list_foreign_keys().await {
        Ok(fks) => (fks, None),
        Err(e) => {
            warn!(error = %e, "Foreign keys unavailable");
            (Vec::new(), Some(e.to_string()))
        }
    };

    let doc = SchemaDocument::new(tables, foreign_keys, foreign_key_error);

    if let Some(dir) = context_dir {
        if let Err(e) = doc.persist(dir) {
            warn!(dir = %dir.display(), error = %e, "Could not write schema context files");
        }
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: "varchar".to_string(),
            max_length: None,
            is_nullable: true,
            is_primary_key: false,
            is_identity: false,
        }
    }

    #[test]
    fn renders_length_and_tags_in_order() {
        let col = ColumnDescriptor {
            max_length: Some(50),
            is_nullable: false,
            is_primary_key: true,
            ..column("code")
        };
        assert_eq!(render_column(&col), " - code (varchar(50)) [PK NOT NULL]");

        let id = ColumnDescriptor {
            data_type: "int".to_string(),
            is_nullable: false,
            is_primary_key: true,
            is_identity: true,
            ..column("id")
        };
        assert_eq!(render_column(&id), " - id (int) [PK Identity NOT NULL]");
    }

    #[test]
    fn omits_tags_and_non_positive_lengths() {
        let col = ColumnDescriptor {
            max_length: Some(-1),
            ..column("notes")
        };
        assert_eq!(render_column(&col), " - notes (varchar)");
    }

    #[test]
    fn renders_foreign_keys_and_indexes() {
        let fk = ForeignKeyEdge {
            constraint_name: "fk_orders_customer".to_string(),
            parent_table: "Orders".to_string(),
            parent_column: "customer_id".to_string(),
            referenced_table: "Customers".to_string(),
            referenced_column: "id".to_string(),
        };
        assert_eq!(render_foreign_key(&fk), " - Orders(customer_id) -> Customers(id)");

        let index = IndexDescriptor {
            name: "ix_orders_date".to_string(),
            table: "Orders".to_string(),
            columns: vec!["placed_on".to_string(), "id".to_string()],
            is_unique: true,
            is_primary_key: false,
        };
        assert_eq!(
            render_index(&index),
            " - ix_orders_date ON Orders (placed_on, id) UNIQUE"
        );
    }

    #[test]
    fn sample_file_uses_tabs_and_null_sentinel() {
        let table = TableDescriptor {
            name: "People".to_string(),
            columns: vec![column("name"), column("nick")],
            metadata_error: None,
            indexes: Vec::new(),
            index_error: None,
            samples: Samples::Rows {
                header: vec!["name".to_string(), "nick".to_string()],
                rows: vec![vec![Some("Ada".to_string()), None]],
            },
        };
        assert_eq!(
            table.render_samples(),
            "Sample rows from table: People\n\nname\tnick\nAda\tNULL"
        );
        let rows = table.samples.rows();
        assert_eq!(rows[0].get("name"), Some(Some("Ada")));
        assert_eq!(rows[0].get("nick"), Some(None));
        assert_eq!(rows[0].get("missing"), None);
    }

    #[test]
    fn sanitizes_path_separators() {
        assert_eq!(sanitize_file_name("dbo/Orders"), "dbo_Orders");
    }

    #[test]
    fn sample_files_cannot_shadow_the_schema_file() {
        let dir = Path::new("ctx");
        assert_eq!(
            sample_file_path(dir, "schema"),
            Path::new("ctx").join("samples").join("schema.txt")
        );
        assert_ne!(sample_file_path(dir, "schema"), dir.join(SCHEMA_FILE));
    }

    #[test]
    fn index_failures_leave_a_diagnostic_line() {
        let table = |name: &str, index_error: Option<&str>| TableDescriptor {
            name: name.to_string(),
            columns: vec![column("id")],
            metadata_error: None,
            indexes: Vec::new(),
            index_error: index_error.map(str::to_string),
            samples: Samples::Unavailable(String::new()),
        };
        let doc = SchemaDocument::new(
            vec![table("Orders", Some("permission denied")), table("Items", None)],
            Vec::new(),
            None,
        );
        assert!(doc
            .text()
            .ends_with("\nIndexes:\n (Could not retrieve indexes for Orders: permission denied)\n"));
    }
}
