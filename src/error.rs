use thiserror::Error;

/// Errors raised by a database backend.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to connect to database: {0}")]
    Connect(String),
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),
}

/// The table list could not be read, so no schema document can be produced.
#[derive(Error, Debug)]
#[error("Could not enumerate tables: {0}")]
pub struct IntrospectionError(#[from] pub DbError);

/// Failures talking to the model service.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("Request to model service failed: {0}")]
    Request(reqwest::Error),
    #[error("Model service returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Could not decode model service response: {0}")]
    Decode(reqwest::Error),
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("History file is not a valid log: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Could not encode history log: {0}")]
    Encode(serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set for the {1} backend")]
    Missing(&'static str, &'static str),
}

/// Failures that prevent a session from starting or producing a schema.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] DbError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Introspection(#[from] IntrospectionError),
}
