use super::{AttemptStatus, QueryAttempt};
use chrono::{NaiveDate, Timelike};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::OnceLock;

/// Number of tables listed in the rendered report.
const REPORT_TOP_TABLES: usize = 10;
/// Requests longer than this are cut short in the rendered report.
const REQUEST_PREVIEW_CHARS: usize = 50;

fn table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)FROM\s+\[?(\w+)\]?|JOIN\s+\[?(\w+)\]?").expect("table pattern is valid")
    })
}

/// Table names following `FROM` / `JOIN`, in order of appearance.
///
/// Textual heuristic only: subqueries, CTEs, schema-qualified names and
/// aliases glued to the identifier are missed or misread.
pub fn extract_tables(sql: &str) -> Vec<String> {
    table_pattern()
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub total: usize,
    pub per_day: BTreeMap<NaiveDate, usize>,
    pub per_hour: BTreeMap<u32, usize>,
    pub successes: usize,
    pub errors: usize,
    /// Occurrence count per table name; a table named twice in one query counts twice.
    pub table_frequency: HashMap<String, usize>,
    /// Newest first.
    pub recent: Vec<QueryAttempt>,
}

impl AnalyticsReport {
    /// Share of successful attempts, or `None` for an empty history.
    pub fn success_ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.successes as f64 / self.total as f64)
    }

    /// Tables by descending count, ties by name.
    pub fn top_tables(&self, n: usize) -> Vec<(&str, usize)> {
        let mut tables: Vec<(&str, usize)> = self
            .table_frequency
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        tables.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        tables.truncate(n);
        tables
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.total == 0 {
            out.push_str("No query history found.\n");
            return out;
        }

        let _ = writeln!(out, "Queries per day:");
        for (date, count) in &self.per_day {
            let _ = writeln!(out, "  {date}  {count}");
        }

        let _ = writeln!(out, "\nQueries per hour of day:");
        for (hour, count) in &self.per_hour {
            let _ = writeln!(out, "  {hour:02}:00  {count}");
        }

        let ratio = self.success_ratio().unwrap_or(0.0) * 100.0;
        let _ = writeln!(
            out,
            "\nSuccess: {}  Error: {}  ({ratio:.1}% success)",
            self.successes, self.errors
        );

        let _ = writeln!(out, "\nMost queried tables:");
        let top = self.top_tables(REPORT_TOP_TABLES);
        if top.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for (table, count) in top {
            let _ = writeln!(out, "  {table}: {count}");
        }

        let _ = writeln!(out, "\nRecent queries:");
        for (i, attempt) in self.recent.iter().enumerate() {
            let status = match attempt.status {
                AttemptStatus::Success => "success",
                AttemptStatus::Error => "error",
            };
            let _ = writeln!(
                out,
                "{}. {} - {} [{status}]",
                i + 1,
                attempt.timestamp.format("%Y-%m-%d %H:%M:%S"),
                preview(&attempt.user_request)
            );
            let _ = writeln!(out, "   {}", attempt.sql_query.replace('\n', "\n   "));
            if let Some(err) = &attempt.error {
                let _ = writeln!(out, "   error: {err}");
            }
        }
        out
    }
}

fn preview(request: &str) -> String {
    if request.chars().count() > REQUEST_PREVIEW_CHARS {
        let cut: String = request.chars().take(REQUEST_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        request.to_string()
    }
}

/// Aggregates a history log. Dates and hours are taken in UTC.
pub fn summarize(attempts: &[QueryAttempt], recent_limit: usize) -> AnalyticsReport {
    let mut per_day = BTreeMap::new();
    let mut per_hour = BTreeMap::new();
    let mut table_frequency = HashMap::new();
    let mut successes = 0;
    let mut errors = 0;

    for attempt in attempts {
        *per_day.entry(attempt.timestamp.date_naive()).or_insert(0) += 1;
        *per_hour.entry(attempt.timestamp.hour()).or_insert(0) += 1;
        match attempt.status {
            AttemptStatus::Success => successes += 1,
            AttemptStatus::Error => errors += 1,
        }
        for table in extract_tables(&attempt.sql_query) {
            *table_frequency.entry(table).or_insert(0) += 1;
        }
    }

    let mut recent: Vec<QueryAttempt> = attempts.to_vec();
    // Stable sort keeps insertion order for equal timestamps.
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.truncate(recent_limit);

    AnalyticsReport {
        total: attempts.len(),
        per_day,
        per_hour,
        successes,
        errors,
        table_frequency,
        recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bracketed_and_plain_names() {
        assert_eq!(
            extract_tables("select * from [Orders] o join Customers c on o.cid = c.id"),
            vec!["Orders", "Customers"]
        );
        assert_eq!(
            extract_tables("SELECT 1 FROM A JOIN A ON 1=1"),
            vec!["A", "A"]
        );
        assert!(extract_tables("UPDATE Orders SET x = 1").is_empty());
    }

    #[test]
    fn truncates_long_requests() {
        let long = "x".repeat(60);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(50)));
        assert_eq!(preview("short"), "short");
    }
}
