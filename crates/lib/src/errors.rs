use crate::validator::RejectReason;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the AI and storage providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to AI provider: {0}")]
    AiRequest(reqwest::Error),
    #[error("Failed to deserialize AI provider response: {0}")]
    AiDeserialization(reqwest::Error),
    #[error("AI provider returned an error: {0}")]
    AiApi(String),
    #[error("Storage connection error: {0}")]
    StorageConnection(String),
    #[error("Storage operation failed: {0}")]
    StorageOperationFailed(String),
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// The underlying message without the variant prefix, used when the
    /// store's own wording should reach the caller.
    pub fn detail(&self) -> String {
        match self {
            ProviderError::StorageConnection(msg)
            | ProviderError::StorageOperationFailed(msg)
            | ProviderError::AiApi(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Failures on the model path before a candidate statement exists.
#[derive(Error, Debug)]
pub enum GenerationFailure {
    #[error("the model did not answer within {0:?}")]
    Timeout(Duration),
    #[error("the model returned no usable SQL")]
    EmptyOutput,
    #[error("the model provider failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Errors that make the engine unusable. These surface at startup, never per request.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Invalid rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },
    #[error("Invalid prompt template: {0}")]
    InvalidPromptTemplate(String),
    #[error("The resolver requires a {0}")]
    MissingComponent(&'static str),
    #[error("Schema registry does not match the store: {0}")]
    SchemaMismatch(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The error surface of `Resolver::resolve`. Every variant is terminal for the request.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("The question is empty.")]
    NoInput,
    #[error("SQL generation failed: {0}")]
    Generation(#[from] GenerationFailure),
    /// `rejected_sql` was never executed and may reference hallucinated identifiers.
    #[error("Generated SQL was rejected by the validator ({reason}): {detail}")]
    Validation {
        reason: RejectReason,
        detail: String,
        rejected_sql: String,
    },
    #[error("SQL execution failed: {message}")]
    Execution { message: String, sql: String },
    #[error("Internal error: {0}")]
    Internal(String),
}
