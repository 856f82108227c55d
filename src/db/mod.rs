mod connection;
mod introspection;
mod pg_value;
mod postgres;
mod query;
mod sqlite;

pub use connection::*;
pub use introspection::*;
pub use postgres::PostgresDatabase;
pub use query::*;
pub use sqlite::SqliteDatabase;

use crate::error::DbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_identity: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: String,
    /// Key columns in key-ordinal order.
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub constraint_name: String,
    pub parent_table: String,
    pub parent_column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Raw outcome of running one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    Affected(u64),
}

/// The catalog and execution capability the core needs from a database.
///
/// Implementations run in autocommit mode, so a mutation is committed once
/// `execute` returns.
#[async_trait]
pub trait Database: Send + Sync {
    /// Dialect name used in the prompt (e.g. "PostgreSQL").
    fn dialect(&self) -> &str;

    /// Base tables only, in the catalog's own order.
    async fn list_tables(&self) -> Result<Vec<String>, DbError>;

    /// Columns of `table` in declared order.
    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError>;

    /// Secondary indexes of `table`. Indexes that only back a primary key or
    /// unique constraint are not returned.
    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>, DbError>;

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>, DbError>;

    /// SQL selecting at most `limit` rows of `table`.
    fn sample_query(&self, table: &str, limit: usize) -> String {
        format!("SELECT * FROM {} LIMIT {}", quote_ident(table), limit)
    }

    async fn execute(&self, sql: &str) -> Result<StatementOutcome, DbError>;
}

pub(crate) fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
