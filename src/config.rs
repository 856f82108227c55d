use crate::db::{ConnectionConfig, PostgresConfig, SslMode};
use crate::error::ConfigError;
use clap::{ArgAction, Args, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Postgres,
    Sqlite,
}

/// Settings shared by every subcommand. Each flag falls back to its
/// environment variable (a `.env` file is honoured) and then to a default.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(long, env = "DB_BACKEND", value_enum, default_value = "postgres")]
    pub db_backend: Backend,
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,
    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,
    #[arg(long, env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    pub db_password: String,
    #[arg(long, env = "DB_SSL_MODE", default_value = "prefer")]
    pub db_ssl_mode: SslMode,
    #[arg(long, env = "DB_SCHEMA", default_value = "public")]
    pub db_schema: String,
    #[arg(long, env = "SQLITE_PATH")]
    pub sqlite_path: Option<PathBuf>,

    /// Base URL of the completion API (`/generate` and `/tags` are appended).
    #[arg(long, env = "MODEL_API_URL", default_value = "http://localhost:11434/api")]
    pub model_api_url: String,
    #[arg(long, env = "DEFAULT_MODEL", default_value = "llama3")]
    pub default_model: String,
    /// Offered when model discovery fails.
    #[arg(
        long,
        env = "AVAILABLE_MODELS",
        value_delimiter = ',',
        default_value = "llama3,codellama,mistral"
    )]
    pub available_models: Vec<String>,

    /// Rows sampled per table.
    #[arg(long, env = "SAMPLE_LIMIT", default_value_t = 10)]
    pub sample_limit: usize,
    #[arg(long, env = "CONTEXT_DIR", default_value = "db_context")]
    pub context_dir: PathBuf,
    #[arg(long, env = "HISTORY_DIR", default_value = "query_history")]
    pub history_dir: PathBuf,
    #[arg(long, env = "HISTORY_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub history_enabled: bool,
    /// Append each table's sample rows to the schema in the prompt.
    #[arg(long, env = "PROMPT_INCLUDE_SAMPLES", default_value_t = false, action = ArgAction::Set)]
    pub prompt_include_samples: bool,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_url: String,
    pub default_model: String,
    pub available_models: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub model: ModelConfig,
    pub sample_limit: usize,
    pub context_dir: PathBuf,
    /// `None` when history recording is disabled.
    pub history_dir: Option<PathBuf>,
    pub prompt_include_samples: bool,
}

impl ConfigArgs {
    /// Model service settings alone; needs no database configuration.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            api_url: self.model_api_url.clone(),
            default_model: self.default_model.clone(),
            available_models: self
                .available_models
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn resolve(self) -> Result<AppConfig, ConfigError> {
        let model = self.model_config();
        let connection = match self.db_backend {
            Backend::Postgres => ConnectionConfig::Postgres(PostgresConfig {
                host: self.db_host,
                port: self.db_port,
                database: self
                    .db_name
                    .ok_or(ConfigError::Missing("DB_NAME", "postgres"))?,
                user: self
                    .db_user
                    .ok_or(ConfigError::Missing("DB_USER", "postgres"))?,
                password: self.db_password,
                ssl_mode: self.db_ssl_mode,
                schema: self.db_schema,
            }),
            Backend::Sqlite => ConnectionConfig::Sqlite {
                path: self
                    .sqlite_path
                    .ok_or(ConfigError::Missing("SQLITE_PATH", "sqlite"))?,
            },
        };

        Ok(AppConfig {
            connection,
            model,
            sample_limit: self.sample_limit,
            context_dir: self.context_dir,
            history_dir: self.history_enabled.then_some(self.history_dir),
            prompt_include_samples: self.prompt_include_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ConfigArgs,
    }

    fn parse(args: &[&str]) -> ConfigArgs {
        TestCli::try_parse_from(std::iter::once("sqlscribe").chain(args.iter().copied()))
            .unwrap()
            .config
    }

    #[test]
    fn sqlite_backend_with_history_disabled() {
        let config = parse(&[
            "--db-backend",
            "sqlite",
            "--sqlite-path",
            "shop.db",
            "--history-enabled",
            "false",
            "--available-models",
            "llama3, phi3,",
        ])
        .resolve()
        .unwrap();

        assert!(matches!(config.connection, ConnectionConfig::Sqlite { ref path } if path == &PathBuf::from("shop.db")));
        assert!(config.history_dir.is_none());
        assert_eq!(config.model.available_models, vec!["llama3", "phi3"]);
    }

    #[test]
    fn postgres_requires_database_name() {
        let mut args = parse(&["--db-backend", "postgres", "--db-user", "sa"]);
        // DB_NAME may be exported in the environment running the tests.
        args.db_name = None;
        let err = args.resolve().unwrap_err();
        assert!(err.to_string().contains("DB_NAME"));
    }

    #[test]
    fn model_settings_resolve_without_database_settings() {
        let mut args = parse(&[
            "--db-backend",
            "postgres",
            "--model-api-url",
            "http://models:11434/api",
            "--available-models",
            "sqlcoder",
        ]);
        args.db_name = None;
        args.db_user = None;

        let model = args.model_config();
        assert_eq!(model.api_url, "http://models:11434/api");
        assert_eq!(model.available_models, vec!["sqlcoder"]);
        assert!(args.resolve().is_err());
    }
}
