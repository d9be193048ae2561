use serde::{Deserialize, Serialize};

/// The request body for the `/ask` endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct AskRequest {
    /// A missing field is treated like an empty question.
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub schema: String,
}
