use crate::ai::{build_prompt, render_reply, ModelClient};
use crate::config::AppConfig;
use crate::db::{self, build_schema, Database, QueryResult, SchemaDocument};
use crate::error::{IntrospectionError, ModelError, SessionError};
use crate::storage::{HistoryStore, QueryAttempt};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub sample_limit: usize,
    /// Where schema artifacts are written; `None` keeps them in memory only.
    pub context_dir: Option<PathBuf>,
    pub prompt_include_samples: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sample_limit: 10,
            context_dir: None,
            prompt_include_samples: false,
        }
    }
}

/// Everything produced by one question.
#[derive(Debug)]
pub struct Interaction {
    pub user_request: String,
    pub model: String,
    pub prompt: String,
    pub generated: Result<String, ModelError>,
    /// The generated SQL, or the rendered model error.
    pub sql_text: String,
    pub result: QueryResult,
    /// `None` when history is disabled or the log could not be written.
    pub recorded: Option<QueryAttempt>,
}

/// One connected database plus the state derived from it.
///
/// Created on connect, its schema is rebuilt by [`Session::refresh_schema`],
/// and it is torn down by [`Session::disconnect`]. Questions run one at a time.
pub struct Session {
    db: Box<dyn Database>,
    model: ModelClient,
    history: Option<HistoryStore>,
    options: SessionOptions,
    schema: Option<SchemaDocument>,
}

impl Session {
    pub fn new(
        db: Box<dyn Database>,
        model: ModelClient,
        history: Option<HistoryStore>,
        options: SessionOptions,
    ) -> Self {
        Self {
            db,
            model,
            history,
            options,
            schema: None,
        }
    }

    /// Opens the database connection described by `config`.
    pub async fn connect(config: &AppConfig) -> Result<Self, SessionError> {
        let db = db::connect(&config.connection).await?;
        let model = ModelClient::new(&config.model.api_url)?
            .with_fallback_models(config.model.available_models.clone());
        let history = config.history_dir.as_ref().map(HistoryStore::new);

        Ok(Self::new(
            db,
            model,
            history,
            SessionOptions {
                sample_limit: config.sample_limit,
                context_dir: Some(config.context_dir.clone()),
                prompt_include_samples: config.prompt_include_samples,
            },
        ))
    }

    pub fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn model_client(&self) -> &ModelClient {
        &self.model
    }

    pub fn history(&self) -> Option<&HistoryStore> {
        self.history.as_ref()
    }

    /// The cached schema document, if one has been built.
    pub fn schema(&self) -> Option<&SchemaDocument> {
        self.schema.as_ref()
    }

    /// Drops the cached document and introspects the database again.
    pub async fn refresh_schema(&mut self) -> Result<&SchemaDocument, IntrospectionError> {
        self.schema = None;
        let doc = build_schema(
            self.db.as_ref(),
            self.options.sample_limit,
            self.options.context_dir.as_deref(),
        )
        .await?;
        info!(tables = doc.tables.len(), "Schema document ready");
        Ok(self.schema.insert(doc))
    }

    async fn ensure_schema(&mut self) -> Result<(), IntrospectionError> {
        if self.schema.is_none() {
            self.refresh_schema().await?;
        }
        Ok(())
    }

    /// Runs question → prompt → model → execute → record.
    ///
    /// Only a failed schema build is returned as an error; model and query
    /// failures are carried in the returned [`Interaction`].
    pub async fn ask(
        &mut self,
        user_request: &str,
        model: &str,
    ) -> Result<Interaction, IntrospectionError> {
        self.ensure_schema().await?;
        let context = match &self.schema {
            Some(doc) => doc.prompt_context(self.options.prompt_include_samples),
            None => String::new(),
        };
        let prompt = build_prompt(self.db.dialect(), user_request, &context);

        let generated = self.model.generate_sql(&prompt, model).await;
        let sql_text = render_reply(&generated);

        let result = match &generated {
            Ok(sql) if sql.trim().is_empty() => QueryResult::Error {
                message: "The model returned no SQL".to_string(),
            },
            Ok(sql) => db::execute_query(self.db.as_ref(), sql).await,
            Err(e) => {
                warn!(error = %e, "Model service call failed");
                QueryResult::Error {
                    message: e.to_string(),
                }
            }
        };

        let recorded = self.record(user_request, &sql_text, result.error_message());

        Ok(Interaction {
            user_request: user_request.to_string(),
            model: model.to_string(),
            prompt,
            generated,
            sql_text,
            result,
            recorded,
        })
    }

    fn record(&self, user_request: &str, sql: &str, error: Option<&str>) -> Option<QueryAttempt> {
        let history = self.history.as_ref()?;
        match history.append(user_request, sql, error) {
            Ok(attempt) => Some(attempt),
            Err(e) => {
                warn!(error = %e, path = %history.path().display(), "Could not record query history");
                None
            }
        }
    }

    pub fn disconnect(self) {
        info!(dialect = %self.db.dialect(), "Closing session");
    }
}
