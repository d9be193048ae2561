//! # Model Generator
//!
//! Wraps the single model handle. Every call is serialized behind an async mutex,
//! bounded by a timeout (which includes the wait for the mutex), and capped at the
//! configured number of new tokens. The raw completion is reduced to one candidate
//! statement by [`extract_sql`].

use crate::{
    errors::GenerationFailure,
    providers::ai::{AiProvider, GenerationOptions},
    types::DEFAULT_GENERATION_TIMEOUT,
};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Extracted text shorter than this is treated as no output at all.
const MIN_SQL_LEN: usize = 5;

static RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)###\s*Response:\s*(.*)").expect("valid response regex"));
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:sql)?\s*(.*?)```").expect("valid fence regex"));
static LEADING_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(SELECT|INSERT|UPDATE|DELETE|WITH)\b").expect("valid keyword regex")
});
static SELECT_SPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)(SELECT\s+.*?\s+FROM\s+\w+(?:\s+(?:WHERE|JOIN|GROUP BY|ORDER BY|LIMIT|HAVING)[^;]*)?)",
    )
    .expect("valid select regex")
});
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

pub struct SqlGenerator {
    provider: Box<dyn AiProvider>,
    options: GenerationOptions,
    timeout: Duration,
    inference_lock: Mutex<()>,
}

impl fmt::Debug for SqlGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlGenerator")
            .field("provider", &self.provider)
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SqlGenerator {
    pub fn new(provider: Box<dyn AiProvider>) -> Self {
        Self {
            provider,
            options: GenerationOptions::default(),
            timeout: DEFAULT_GENERATION_TIMEOUT,
            inference_lock: Mutex::new(()),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Sends `prompt` to the model and returns the extracted candidate statement.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationFailure> {
        let inference = async {
            let _guard = self.inference_lock.lock().await;
            self.provider.generate(prompt, &self.options).await
        };

        let raw = tokio::time::timeout(self.timeout, inference)
            .await
            .map_err(|_| {
                warn!(timeout = ?self.timeout, "Model call timed out.");
                GenerationFailure::Timeout(self.timeout)
            })??;

        debug!(raw_response = %raw, "<-- Raw model completion");

        let sql = extract_sql(&raw);
        if sql.chars().count() < MIN_SQL_LEN {
            return Err(GenerationFailure::EmptyOutput);
        }
        Ok(sql)
    }
}

/// Reduces a raw completion to the first SQL statement it contains.
///
/// Looks after the response marker if one was echoed, prefers a fenced block,
/// then a first line opening with a statement keyword, then the first
/// `SELECT ... FROM ...` span. Anything from ` UNION ` on is cut and trailing
/// terminators are stripped.
pub fn extract_sql(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    if let Some(caps) = RESPONSE_RE.captures(&text) {
        text = caps[1].trim().to_string();
    }

    if let Some(caps) = FENCE_RE.captures(&text) {
        // A fenced statement may span lines; keep it whole.
        text = WHITESPACE_RE.replace_all(caps[1].trim(), " ").into_owned();
    }

    let first_line = text.lines().next().unwrap_or_default().trim();

    if LEADING_KEYWORD_RE.is_match(first_line) {
        return finish(first_line);
    }

    if let Some(caps) = SELECT_SPAN_RE.captures(&text) {
        return finish(caps[1].trim());
    }

    strip_terminators(first_line)
}

fn finish(sql: &str) -> String {
    strip_terminators(cut_at_union(sql))
}

fn cut_at_union(sql: &str) -> &str {
    // ASCII uppercasing keeps byte offsets aligned with the original.
    match sql.to_ascii_uppercase().find(" UNION ") {
        Some(pos) if pos > 0 => sql[..pos].trim(),
        _ => sql,
    }
}

fn strip_terminators(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim().to_string()
}
