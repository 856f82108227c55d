use crate::error::HistoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Error,
}

/// One recorded request → SQL → outcome cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAttempt {
    pub timestamp: DateTime<Utc>,
    pub user_request: String,
    pub sql_query: String,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only JSON log of query attempts.
///
/// There is no locking: two processes appending at once can lose an entry.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(HISTORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every recorded attempt, oldest first. A missing log reads as empty.
    pub fn read_all(&self) -> Result<Vec<QueryAttempt>, HistoryError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        // Bytes, not a string, so invalid UTF-8 surfaces as a corrupt log.
        Ok(serde_json::from_slice(&data)?)
    }

    /// Records one attempt. Status is `error` exactly when `error` is given.
    pub fn append(
        &self,
        user_request: &str,
        sql_query: &str,
        error: Option<&str>,
    ) -> Result<QueryAttempt, HistoryError> {
        let mut log = self.load_for_append()?;

        let mut timestamp = Utc::now();
        if let Some(last) = log.last() {
            // Keep the log ordered even if the clock stepped back.
            timestamp = timestamp.max(last.timestamp);
        }

        let attempt = QueryAttempt {
            timestamp,
            user_request: user_request.to_string(),
            sql_query: sql_query.to_string(),
            status: if error.is_some() {
                AttemptStatus::Error
            } else {
                AttemptStatus::Success
            },
            error: error.map(str::to_string),
        };
        log.push(attempt.clone());
        self.write_all(&log)?;

        debug!(entries = log.len(), "Appended query attempt");
        Ok(attempt)
    }

    /// Loads the log for rewriting. A corrupt file is moved aside to
    /// `history.json.corrupt` first; any other read failure is returned so
    /// the existing log is never overwritten.
    fn load_for_append(&self) -> Result<Vec<QueryAttempt>, HistoryError> {
        match self.read_all() {
            Err(HistoryError::Corrupt(e)) => {
                let backup = self.path.with_extension("json.corrupt");
                warn!(error = %e, backup = %backup.display(), "History log is corrupt, starting a new one");
                std::fs::rename(&self.path, &backup)?;
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn write_all(&self, log: &[QueryAttempt]) -> Result<(), HistoryError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(log).map_err(HistoryError::Encode)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
