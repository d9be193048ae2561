use anyhow::Result;
use async_trait::async_trait;
use sqlask::{
    providers::ai::{AiProvider, GenerationOptions},
    ProviderError, SqliteProvider,
};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// The sales catalog fixture: 20 products and 50 sales rows.
pub const SALES_FIXTURE: &str = include_str!("../fixtures/sales.sql");

// --- Test Setup ---

/// A helper struct to manage database creation for each test.
pub struct TestSetup {
    pub provider: SqliteProvider,
}

impl TestSetup {
    /// Creates a new, isolated in-memory database seeded with the sales catalog.
    pub async fn new() -> Result<Self> {
        let provider = SqliteProvider::new(":memory:").await?;
        provider.initialize_with_data(SALES_FIXTURE).await?;
        Ok(Self { provider })
    }

    /// Creates an isolated in-memory database with no tables.
    pub async fn empty() -> Result<Self> {
        let provider = SqliteProvider::new(":memory:").await?;
        Ok(Self { provider })
    }
}

// --- Mock AI Providers ---

/// Returns scripted completions in order and records every call.
#[derive(Clone, Debug)]
pub struct MockAiProvider {
    pub call_history: Arc<RwLock<Vec<(String, GenerationOptions)>>>,
    pub responses: Arc<RwLock<Vec<String>>>,
}

impl MockAiProvider {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            call_history: Arc::new(RwLock::new(Vec::new())),
            responses: Arc::new(RwLock::new(
                responses.into_iter().rev().map(String::from).collect(),
            )),
        }
    }

    pub fn calls(&self) -> Vec<(String, GenerationOptions)> {
        self.call_history.read().unwrap().clone()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        self.call_history
            .write()
            .unwrap()
            .push((prompt.to_string(), *options));

        Ok(self.responses.write().unwrap().pop().unwrap_or_default())
    }
}

/// Answers after a fixed delay, for timeout and serialization tests.
#[derive(Clone, Debug)]
pub struct SlowAiProvider {
    pub delay: Duration,
    pub response: String,
    pub in_flight: Arc<RwLock<usize>>,
    pub max_in_flight: Arc<RwLock<usize>>,
}

impl SlowAiProvider {
    pub fn new(delay: Duration, response: &str) -> Self {
        Self {
            delay,
            response: response.to_string(),
            in_flight: Arc::new(RwLock::new(0)),
            max_in_flight: Arc::new(RwLock::new(0)),
        }
    }

    /// The highest number of calls that were ever inside the model at once.
    pub fn max_concurrency(&self) -> usize {
        *self.max_in_flight.read().unwrap()
    }
}

#[async_trait]
impl AiProvider for SlowAiProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        {
            let mut in_flight = self.in_flight.write().unwrap();
            *in_flight += 1;
            let mut max = self.max_in_flight.write().unwrap();
            *max = (*max).max(*in_flight);
        }
        tokio::time::sleep(self.delay).await;
        *self.in_flight.write().unwrap() -= 1;
        Ok(self.response.clone())
    }
}

/// Always fails, as an unreachable model server would.
#[derive(Clone, Debug)]
pub struct FailingAiProvider;

#[async_trait]
impl AiProvider for FailingAiProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::AiApi("model server unavailable".to_string()))
    }
}
