//! # Prompt Builder
//!
//! Renders the schema DDL and the question into the prompt text. Rendering is a
//! single pass over the template, so a question that itself contains `{schema}`
//! is passed through literally.

use super::tasks::SQL_GENERATION_PROMPT;
use crate::schema::SchemaDescriptor;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(question|schema)\}").expect("valid placeholder regex"));

/// Builds the prompt from the default template.
pub fn build_prompt(question: &str, schema: &SchemaDescriptor) -> String {
    render_prompt(SQL_GENERATION_PROMPT, question, schema)
}

/// Builds the prompt from `template`, substituting `{question}` and `{schema}`.
///
/// The output is byte-identical for identical inputs.
pub fn render_prompt(template: &str, question: &str, schema: &SchemaDescriptor) -> String {
    let ddl = schema.render_ddl();
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "question" => question.to_string(),
            _ => ddl.clone(),
        })
        .into_owned()
}
