#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Helpers over `sqlask-test-utils` so every test runs against an isolated,
//! seeded in-memory store and a scripted model.

use dotenvy::dotenv;
use sqlask::{
    providers::ai::AiProvider, validate, ResolverBuilder, SchemaDescriptor, SqliteProvider,
    ValidatedSql,
};
use sqlask_test_utils::TestSetup;
use std::sync::Once;

pub use sqlask_test_utils::{FailingAiProvider, MockAiProvider, SlowAiProvider};

#[cfg(test)]
static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
#[cfg(test)]
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        tracing_subscriber::fmt::init();
    });
}

/// Opens an isolated in-memory store seeded with the sales catalog.
pub async fn seeded_provider() -> SqliteProvider {
    TestSetup::new()
        .await
        .expect("Failed to seed the sales fixture")
        .provider
}

/// Runs `sql` through the validator, panicking if it is rejected.
pub fn validated(sql: &str, schema: &SchemaDescriptor) -> ValidatedSql {
    validate(sql, schema)
        .into_result()
        .unwrap_or_else(|r| panic!("'{sql}' was rejected: {} ({})", r.reason, r.detail))
}

/// A resolver over the seeded store and the given model.
pub async fn resolver_with(ai: impl AiProvider + 'static) -> ResolverBuilder {
    ResolverBuilder::new()
        .ai_provider(Box::new(ai))
        .storage_provider(Box::new(seeded_provider().await))
}
