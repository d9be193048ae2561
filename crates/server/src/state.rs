//! # Application State
//!
//! This module defines the shared application state (`AppState`) and the logic
//! for building it at startup. The `AppState` holds the configuration and the
//! resolver, which owns the model handle and the store.

use crate::config::AppConfig;
use sqlask::{LocalAiProvider, Resolver, ResolverBuilder, SqliteProvider, Storage};
use std::sync::Arc;
use tracing::info;

/// The shared application state, accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration, loaded from `config.yml`.
    pub config: Arc<AppConfig>,
    /// The question resolver shared by every request.
    pub resolver: Arc<Resolver>,
}

/// Builds the shared application state from the configuration.
///
/// Opens the SQLite database at `db_url` and fails if its layout does not match
/// the schema registry.
pub async fn build_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let sqlite_provider = SqliteProvider::new(&config.db_url).await?;
    info!(db_path = %config.db_url, "Initialized storage provider (SQLite).");
    build_app_state_with_storage(config, Box::new(sqlite_provider)).await
}

/// Builds the state around an already opened store.
pub async fn build_app_state_with_storage(
    config: AppConfig,
    storage_provider: Box<dyn Storage>,
) -> anyhow::Result<AppState> {
    let model = &config.model;
    let ai_provider = LocalAiProvider::new(
        model.api_url.clone(),
        model.api_key.clone(),
        Some(model.model_name.clone()),
    )?;
    info!(api_url = %model.api_url, model = %model.model_name, "Configured model provider.");

    let resolver = ResolverBuilder::new()
        .ai_provider(Box::new(ai_provider))
        .storage_provider(storage_provider)
        .generation_options(model.generation_options())
        .generation_timeout(model.timeout())
        .max_rows(config.max_rows)
        .prompt_template(config.prompt_template.clone())
        .build()?;

    // A store that does not match the registry would make the validator lie.
    resolver.verify_schema().await?;

    Ok(AppState {
        config: Arc::new(config),
        resolver: Arc::new(resolver),
    })
}
