use super::pg_value::pg_value_to_json;
use super::{
    quote_ident, ColumnDescriptor, Database, ForeignKeyEdge, IndexDescriptor, PostgresConfig,
    StatementOutcome,
};
use crate::error::DbError;
use async_trait::async_trait;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

pub struct PostgresDatabase {
    client: Client,
    schema: String,
}

impl PostgresDatabase {
    pub async fn connect_plain(config: &PostgresConfig) -> Result<Self, DbError> {
        let (client, connection) = config
            .pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| DbError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Postgres connection error");
            }
        });

        Ok(Self {
            client,
            schema: config.schema.clone(),
        })
    }

    pub async fn connect_tls(config: &PostgresConfig) -> Result<Self, DbError> {
        let connector = MakeTlsConnector::new(native_tls::TlsConnector::new()?);
        let mut pg_config = config.pg_config();
        pg_config.ssl_mode(tokio_postgres::config::SslMode::Require);
        let (client, connection) = pg_config
            .connect(connector)
            .await
            .map_err(|e| DbError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Postgres connection error");
            }
        });

        Ok(Self {
            client,
            schema: config.schema.clone(),
        })
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn dialect(&self) -> &str {
        "PostgreSQL"
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text
                 FROM information_schema.tables
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&self.schema],
            )
            .await?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        let rows = self
            .client
            .query(
                "SELECT
                    c.column_name::text,
                    c.data_type::text,
                    c.character_maximum_length::int,
                    c.is_nullable = 'YES' as is_nullable,
                    COALESCE(pk.is_pk, false) as is_primary_key,
                    (c.is_identity = 'YES' OR COALESCE(c.column_default, '') LIKE 'nextval(%') as is_identity
                 FROM information_schema.columns c
                 LEFT JOIN (
                    SELECT kcu.column_name, true as is_pk
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage kcu
                        ON tc.constraint_name = kcu.constraint_name
                        AND tc.table_schema = kcu.table_schema
                    WHERE tc.constraint_type = 'PRIMARY KEY'
                        AND tc.table_schema = $1
                        AND tc.table_name = $2
                 ) pk ON pk.column_name = c.column_name
                 WHERE c.table_schema = $1 AND c.table_name = $2
                 ORDER BY c.ordinal_position",
                &[&self.schema, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor {
                name: row.get(0),
                data_type: row.get(1),
                max_length: row.get(2),
                is_nullable: row.get(3),
                is_primary_key: row.get(4),
                is_identity: row.get(5),
            })
            .collect())
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>, DbError> {
        let rows = self
            .client
            .query(
                "SELECT
                    i.relname::text,
                    a.attname::text,
                    ix.indisunique,
                    ix.indisprimary
                 FROM pg_index ix
                 JOIN pg_class t ON t.oid = ix.indrelid
                 JOIN pg_class i ON i.oid = ix.indexrelid
                 JOIN pg_namespace n ON n.oid = t.relnamespace
                 CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                 JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
                 WHERE n.nspname = $1
                    AND t.relname = $2
                    AND NOT EXISTS (
                        SELECT 1 FROM pg_constraint con
                        WHERE con.conindid = ix.indexrelid AND con.contype IN ('p', 'u')
                    )
                 ORDER BY i.relname, k.ord",
                &[&self.schema, &table],
            )
            .await?;

        let mut indexes: Vec<IndexDescriptor> = Vec::new();
        for row in &rows {
            let name: String = row.get(0);
            let column: String = row.get(1);
            match indexes.last_mut() {
                Some(last) if last.name == name => last.columns.push(column),
                _ => indexes.push(IndexDescriptor {
                    name,
                    table: table.to_string(),
                    columns: vec![column],
                    is_unique: row.get(2),
                    is_primary_key: row.get(3),
                }),
            }
        }
        Ok(indexes)
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>, DbError> {
        let rows = self
            .client
            .query(
                "SELECT
                    con.conname::text,
                    tp.relname::text,
                    ap.attname::text,
                    tr.relname::text,
                    ar.attname::text
                 FROM pg_constraint con
                 JOIN pg_class tp ON tp.oid = con.conrelid
                 JOIN pg_class tr ON tr.oid = con.confrelid
                 JOIN pg_namespace n ON n.oid = tp.relnamespace
                 CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(parent_att, ref_att)
                 JOIN pg_attribute ap ON ap.attrelid = con.conrelid AND ap.attnum = k.parent_att
                 JOIN pg_attribute ar ON ar.attrelid = con.confrelid AND ar.attnum = k.ref_att
                 WHERE con.contype = 'f' AND n.nspname = $1",
                &[&self.schema],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ForeignKeyEdge {
                constraint_name: row.get(0),
                parent_table: row.get(1),
                parent_column: row.get(2),
                referenced_table: row.get(3),
                referenced_column: row.get(4),
            })
            .collect())
    }

    fn sample_query(&self, table: &str, limit: usize) -> String {
        format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_ident(&self.schema),
            quote_ident(table),
            limit
        )
    }

    async fn execute(&self, sql: &str) -> Result<StatementOutcome, DbError> {
        debug!(sql = %sql, "Executing Postgres statement");
        let stmt = self.client.prepare(sql).await?;

        if stmt.columns().is_empty() {
            let affected = self.client.execute(&stmt, &[]).await?;
            return Ok(StatementOutcome::Affected(affected));
        }

        let rows = self.client.query(&stmt, &[]).await?;
        let columns = stmt
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();

        let mut result_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = stmt
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| pg_value_to_json(row, i, col.type_()))
                .collect();
            result_rows.push(values);
        }

        Ok(StatementOutcome::Rows {
            columns,
            rows: result_rows,
        })
    }
}
