//! # Natural Language to SQL
//!
//! This crate answers natural-language questions about a fixed relational schema.
//! A question is first offered to an ordered set of deterministic rules; only
//! when none matches is a fine-tuned model asked to write the SQL. Every
//! statement, whatever its origin, passes the validator before it reaches the
//! store, and the store only accepts validated statements.

pub mod errors;
pub mod generator;
pub mod prompts;
pub mod providers;
pub mod rules;
pub mod schema;
pub mod types;
pub mod validator;

pub use errors::{GenerationFailure, ProviderError, ResolveError, SetupError};
pub use providers::ai::{local::LocalAiProvider, AiProvider, GenerationOptions};
pub use providers::db::{
    sqlite::SqliteProvider,
    storage::{QueryOutput, Storage},
};
pub use rules::{Question, Rule, RuleSet};
pub use schema::SchemaDescriptor;
pub use types::{Method, ResolutionResult, Resolver, ResolverBuilder, Row, Scalar};
pub use validator::{validate, RejectReason, ValidatedSql, ValidationVerdict};

use prompts::core::{build_prompt, render_prompt};
use tracing::{debug, error, info, warn};

impl Resolver {
    /// Answers a question.
    ///
    /// The rule path never touches the model. On the model path a rejected
    /// statement is reported, never retried, and never executed.
    pub async fn resolve(&self, question: &str) -> Result<ResolutionResult, ResolveError> {
        if question.trim().is_empty() {
            return Err(ResolveError::NoInput);
        }

        let parsed = Question::new(question);

        if let Some(matched) = self.rules.match_question(&parsed, &self.schema) {
            info!(rule = matched.rule.name, "[resolve] Answering with a rule.");
            let sql = validate(&matched.sql, &self.schema)
                .into_result()
                .map_err(|rejection| {
                    error!(
                        rule = matched.rule.name,
                        reason = %rejection.reason,
                        detail = %rejection.detail,
                        "[resolve] A built-in rule produced an invalid statement."
                    );
                    ResolveError::Internal(format!(
                        "rule '{}' produced a statement the validator rejected ({}): {}",
                        matched.rule.name, rejection.reason, rejection.detail
                    ))
                })?;
            return self
                .execute(
                    question,
                    sql,
                    Method::RuleBased,
                    Some(matched.rule.name.to_string()),
                )
                .await;
        }

        info!("[resolve] No rule matched; asking the model.");
        let prompt = match &self.prompt_template {
            Some(template) => render_prompt(template, question, &self.schema),
            None => build_prompt(question, &self.schema),
        };
        debug!(prompt = %prompt, "--> Prompt for the model");

        let candidate = self.generator.generate(&prompt).await?;
        debug!(candidate = %candidate, "[resolve] Candidate statement from the model.");

        let sql = validate(&candidate, &self.schema)
            .into_result()
            .map_err(|rejection| {
                warn!(
                    reason = %rejection.reason,
                    detail = %rejection.detail,
                    "[resolve] Rejected the model's statement."
                );
                ResolveError::Validation {
                    reason: rejection.reason,
                    detail: rejection.detail,
                    rejected_sql: candidate.clone(),
                }
            })?;

        self.execute(question, sql, Method::ModelGenerated, None)
            .await
    }

    async fn execute(
        &self,
        question: &str,
        sql: ValidatedSql,
        method: Method,
        matched_rule: Option<String>,
    ) -> Result<ResolutionResult, ResolveError> {
        let output = self
            .storage_provider
            .execute_query(&sql, self.max_rows)
            .await
            .map_err(|e| {
                error!(query = %sql, error = %e, "[resolve] Query execution failed.");
                ResolveError::Execution {
                    message: e.detail(),
                    sql: sql.to_string(),
                }
            })?;

        info!(
            %method,
            rows = output.rows.len(),
            truncated = output.truncated,
            "[resolve] Question answered."
        );

        Ok(ResolutionResult {
            question: question.to_string(),
            generated_sql: sql.into_inner(),
            results: output.rows,
            method,
            matched_rule,
            truncated: output.truncated,
        })
    }

    /// The schema every statement is validated against.
    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Checks that every table and column the registry declares exists in the store.
    pub async fn verify_schema(&self) -> Result<(), SetupError> {
        let actual = self.storage_provider.describe_schema().await?;
        let missing = self.schema.missing_from(&actual);
        if missing.is_empty() {
            info!(
                storage = self.storage_provider.name(),
                "Schema registry matches the store."
            );
            Ok(())
        } else {
            Err(SetupError::SchemaMismatch(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }
}
