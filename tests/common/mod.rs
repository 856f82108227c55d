#![allow(dead_code)]
//! Shared fixtures: tracing setup, a seeded SQLite database and a scripted
//! `Database` double for failure paths.

use async_trait::async_trait;
use sqlscribe::db::{
    ColumnDescriptor, Database, ForeignKeyEdge, IndexDescriptor, SqliteDatabase,
    StatementOutcome,
};
use sqlscribe::DbError;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub const SHOP_SQL: &str = "
    CREATE TABLE Customers (
        id INTEGER PRIMARY KEY,
        name VARCHAR(50) NOT NULL,
        email TEXT UNIQUE
    );
    CREATE TABLE Orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES Customers(id),
        placed_on TEXT,
        total REAL
    );
    CREATE TABLE Products (
        code VARCHAR(50) NOT NULL PRIMARY KEY,
        label TEXT
    );
    CREATE INDEX ix_orders_placed ON Orders (placed_on, customer_id);
    CREATE UNIQUE INDEX ux_products_label ON Products (label);
    INSERT INTO Customers (id, name, email) VALUES (1, 'Ada', 'ada@example.com');
    INSERT INTO Customers (id, name, email) VALUES (2, 'Grace', NULL);
    INSERT INTO Orders (id, customer_id, placed_on, total) VALUES (10, 1, '2025-01-05', 12.5);
    INSERT INTO Orders (id, customer_id, placed_on, total) VALUES (11, 2, '2025-01-06', 7.0);
    INSERT INTO Orders (id, customer_id, placed_on, total) VALUES (12, 1, '2025-01-07', 3.25);
";

pub async fn shop_db() -> SqliteDatabase {
    let db = SqliteDatabase::open_in_memory().expect("open in-memory database");
    db.execute_batch(SHOP_SQL).await.expect("seed shop database");
    db
}

/// A database whose catalog is scripted and whose failures are chosen per table.
#[derive(Default)]
pub struct ScriptedDatabase {
    pub tables: Vec<String>,
    pub fail_list_tables: bool,
    pub fail_columns_for: Option<String>,
    pub fail_indexes_for: Option<String>,
    pub fail_samples_for: Option<String>,
}

impl ScriptedDatabase {
    pub fn with_tables(names: &[&str]) -> Self {
        Self {
            tables: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }
}

fn scripted_error(msg: &str) -> DbError {
    DbError::Connect(msg.to_string())
}

#[async_trait]
impl Database for ScriptedDatabase {
    fn dialect(&self) -> &str {
        "Scripted"
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        if self.fail_list_tables {
            return Err(scripted_error("permission denied for catalog"));
        }
        Ok(self.tables.clone())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        if self.fail_columns_for.as_deref() == Some(table) {
            return Err(scripted_error("column metadata unavailable"));
        }
        Ok(vec![ColumnDescriptor {
            name: "id".to_string(),
            data_type: "int".to_string(),
            max_length: None,
            is_nullable: false,
            is_primary_key: true,
            is_identity: true,
        }])
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>, DbError> {
        if self.fail_indexes_for.as_deref() == Some(table) {
            return Err(scripted_error("index metadata unavailable"));
        }
        Ok(Vec::new())
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>, DbError> {
        Ok(Vec::new())
    }

    fn sample_query(&self, table: &str, _limit: usize) -> String {
        format!("SAMPLE {table}")
    }

    async fn execute(&self, sql: &str) -> Result<StatementOutcome, DbError> {
        let table = sql.trim_start_matches("SAMPLE ");
        if self.fail_samples_for.as_deref() == Some(table) {
            return Err(scripted_error("permission denied for table"));
        }
        Ok(StatementOutcome::Rows {
            columns: vec!["id".to_string()],
            rows: vec![vec![serde_json::json!(1)]],
        })
    }
}
