use crate::ai::ModelClient;
use crate::error::HistoryError;
use crate::session::{Interaction, Session};
use crate::storage::{summarize, HistoryStore, HISTORY_FILE};
use anyhow::{Context, Result};
use std::fmt::Write;
use std::path::Path;
use tracing::info;

/// Rebuilds the schema document and returns its text.
pub async fn schema(session: &mut Session) -> Result<String> {
    let doc = session
        .refresh_schema()
        .await
        .context("Failed to introspect database")?;
    Ok(doc.text().to_string())
}

/// Generates and runs SQL for `question`, optionally exporting rows as CSV.
pub async fn ask(
    session: &mut Session,
    question: &str,
    model: &str,
    csv_path: Option<&Path>,
) -> Result<String> {
    let interaction = session
        .ask(question, model)
        .await
        .context("Failed to introspect database")?;

    if let Some(path) = csv_path {
        export_csv(&interaction, path)?;
    }

    Ok(render_interaction(&interaction))
}

fn export_csv(interaction: &Interaction, path: &Path) -> Result<()> {
    if interaction.result.is_error() {
        return Ok(());
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    interaction
        .result
        .write_csv(file)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Exported results");
    Ok(())
}

pub fn render_interaction(interaction: &Interaction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Generated SQL ({}):\n{}\n", interaction.model, interaction.sql_text);
    let _ = writeln!(out, "{}", interaction.result.to_text());
    out
}

pub async fn models(client: &ModelClient) -> String {
    client.list_available_models().await.join("\n")
}

/// Reads the history log offline and renders the analytics report.
pub fn history(history_dir: Option<&Path>, recent: usize) -> Result<String> {
    let Some(dir) = history_dir else {
        return Ok("History recording is disabled.".to_string());
    };
    let store = HistoryStore::new(dir);
    let attempts = match store.read_all() {
        Ok(attempts) => attempts,
        Err(e @ HistoryError::Corrupt(_)) => {
            anyhow::bail!("{HISTORY_FILE} in {} is not a valid history log: {e}", dir.display())
        }
        Err(e) => return Err(e.into()),
    };
    Ok(summarize(&attempts, recent).render())
}
