use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Prefix of every failure rendered in place of generated SQL.
pub const ERROR_MARKER: &str = "❌";

/// Models offered when the service cannot list its own.
pub const FALLBACK_MODELS: &[&str] = &["llama3", "codellama", "mistral"];

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for an Ollama-style completion service.
#[derive(Debug, Clone)]
pub struct ModelClient {
    http_client: reqwest::Client,
    base_url: String,
    fallback_models: Vec<String>,
}

impl ModelClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(ModelError::ClientBuild)?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
        })
    }

    pub fn with_fallback_models(mut self, models: Vec<String>) -> Self {
        self.fallback_models = models;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Asks `model` to complete `prompt` and returns the SQL it produced.
    pub async fn generate_sql(&self, prompt: &str, model: &str) -> Result<String, ModelError> {
        let url = format!("{}/generate", self.base_url);
        debug!(url = %url, model = %model, "Requesting completion");

        let resp = self
            .http_client
            .post(&url)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(ModelError::Request)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let body: GenerateResponse = resp.json().await.map_err(ModelError::Decode)?;
        Ok(strip_code_fences(&body.response))
    }

    /// Names of the models the service has installed, or the fallback list.
    pub async fn list_available_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => {
                warn!("Model service listed no models, using fallback list");
                self.fallback_models.clone()
            }
            Err(e) => {
                warn!(error = %e, "Model discovery failed, using fallback list");
                self.fallback_models.clone()
            }
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/tags", self.base_url);
        let resp = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(ModelError::Request)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let tags: TagsResponse = resp.json().await.map_err(ModelError::Decode)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Text for the generated-SQL slot: the SQL itself, or a marked error.
pub fn render_reply(reply: &Result<String, ModelError>) -> String {
    match reply {
        Ok(sql) => sql.clone(),
        Err(e) => format!("{ERROR_MARKER} Error contacting model service: {e}"),
    }
}

const FENCE: &str = "```";

/// The body of the first fenced block in a reply, or the whole reply when it
/// has no fence. The info string after the opening fence (`sql`, `postgresql`)
/// is dropped, and an unterminated block runs to the end of the reply.
fn strip_code_fences(reply: &str) -> String {
    let Some(open) = reply.find(FENCE) else {
        return reply.trim().to_string();
    };
    let after_open = &reply[open + FENCE.len()..];
    let body = match after_open.find('\n') {
        Some(eol) => &after_open[eol + 1..],
        None => after_open,
    };
    let body = body.find(FENCE).map_or(body, |close| &body[..close]);
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_language_tag() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT 1;\n```"),
            "SELECT 1;"
        );
        assert_eq!(strip_code_fences("  SELECT 2  \n"), "SELECT 2");
    }

    #[test]
    fn keeps_only_the_fenced_block_from_chatty_replies() {
        let reply = "Here is the query:\n```postgresql\nSELECT *\nFROM orders;\n```\nIt lists every order.";
        assert_eq!(strip_code_fences(reply), "SELECT *\nFROM orders;");
        assert_eq!(strip_code_fences("```\nSELECT 3"), "SELECT 3");
    }

    #[test]
    fn renders_errors_with_marker() {
        let reply = Err(ModelError::Api {
            status: reqwest::StatusCode::NOT_FOUND,
            body: "model 'nope' not found".to_string(),
        });
        let text = render_reply(&reply);
        assert!(text.starts_with(ERROR_MARKER));
        assert!(text.contains("model 'nope' not found"));
    }
}
