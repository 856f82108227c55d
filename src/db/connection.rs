use super::{Database, PostgresDatabase, SqliteDatabase};
use crate::error::DbError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Postgres(PostgresConfig),
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    /// Never serialized
    #[serde(skip)]
    pub password: String,
    pub ssl_mode: SslMode,
    /// Schema whose base tables are introspected.
    pub schema: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    #[default]
    Prefer,
    Require,
    Disable,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "disable" => Ok(SslMode::Disable),
            other => Err(format!("unknown ssl mode '{other}'")),
        }
    }
}

impl PostgresConfig {
    /// Driver settings. The password is only set when one was given, so
    /// trust, peer and `.pgpass` authentication keep working.
    pub(crate) fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user);
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        config
    }
}

/// Opens the single connection a session works over.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn Database>, DbError> {
    match config {
        ConnectionConfig::Postgres(pg) => {
            let db = match pg.ssl_mode {
                SslMode::Disable => PostgresDatabase::connect_plain(pg).await?,
                SslMode::Require => PostgresDatabase::connect_tls(pg).await?,
                SslMode::Prefer => match PostgresDatabase::connect_tls(pg).await {
                    Ok(db) => db,
                    Err(e) => {
                        warn!(error = %e, "TLS connection failed, retrying without TLS");
                        PostgresDatabase::connect_plain(pg).await?
                    }
                },
            };
            info!(host = %pg.host, database = %pg.database, "Connected to PostgreSQL");
            Ok(Box::new(db))
        }
        ConnectionConfig::Sqlite { path } => {
            let db = SqliteDatabase::open(path)?;
            info!(path = %path.display(), "Opened SQLite database");
            Ok(Box::new(db))
        }
    }
}
