pub mod ai;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod storage;

pub use ai::{build_prompt, render_reply, ModelClient};
pub use config::{AppConfig, ConfigArgs};
pub use db::{build_schema, execute_query, Database, QueryResult, SchemaDocument};
pub use error::{DbError, HistoryError, IntrospectionError, ModelError, SessionError};
pub use session::{Interaction, Session, SessionOptions};
pub use storage::{summarize, AnalyticsReport, HistoryStore, QueryAttempt};
