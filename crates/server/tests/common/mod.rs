//! # Common Test Utilities
//!
//! `TestApp` spawns the real router on a random port over a seeded in-memory
//! store, with the model server replaced by an `httpmock::MockServer`.

// Not every helper is used by every test file that includes this module.
#![allow(unused)]

use anyhow::Result;
use axum::serve;
use httpmock::prelude::*;
use reqwest::Client;
use serde_json::json;
use sqlask_server::{
    config::{self, AppConfig},
    router,
    state::{build_app_state_with_storage, AppState},
};
use sqlask_test_utils::TestSetup;
use std::{fs::File, io::Write, net::SocketAddr, time::Duration};
use tempfile::{tempdir, TempDir};
use tokio::{net::TcpListener, task::JoinHandle};

/// Writes a minimal config file pointing the model at `model_url` and loads it
/// through `get_config`, as the binary does.
pub fn write_config(model_url: &str) -> Result<(AppConfig, TempDir)> {
    let config_dir = tempdir()?;
    let config_path = config_dir.path().join("config.yml");
    let config_content = format!(
        r#"
port: 0
db_url: ":memory:"
model:
  api_url: "{model_url}"
  api_key: null
  model_name: "mock-sql-model"
  timeout_secs: 5
"#
    );
    let mut file = File::create(&config_path)?;
    file.write_all(config_content.as_bytes())?;

    let config = config::get_config(Some(config_path.to_str().unwrap()))?;
    Ok((config, config_dir))
}

/// A harness for end-to-end testing of the Axum server.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub mock_server: MockServer,
    pub app_state: AppState,
    _config_dir: TempDir,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestApp {
    /// Spawns the application server with the default test configuration.
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(|_| {}).await
    }

    /// Spawns the application server after letting the caller adjust the config.
    pub async fn spawn_with(configure: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        dotenvy::dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();

        let mock_server = MockServer::start_async().await;
        let (mut config, config_dir) = write_config(&mock_server.url("/v1/completions"))?;
        configure(&mut config);

        let setup = TestSetup::new().await?;
        let app_state = build_app_state_with_storage(config, Box::new(setup.provider)).await?;
        let app_state_for_harness = app_state.clone();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server_handle = tokio::spawn(async move {
            let app = router::create_router(app_state);
            let server = serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;

        Ok(Self {
            address,
            client: Client::new(),
            mock_server,
            app_state: app_state_for_harness,
            _config_dir: config_dir,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Programs the mock model server to answer every completion with `text`.
    pub async fn mock_completion(&self, text: &str) -> httpmock::Mock<'_> {
        let body = json!({ "choices": [{ "index": 0, "text": text }] });
        self.mock_server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/completions");
                then.status(200).json_body(body);
            })
            .await
    }

    /// Posts a question to `/ask`.
    pub async fn ask(&self, question: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/ask", self.address))
            .json(&json!({ "question": question }))
            .send()
            .await
            .expect("Failed to execute request to /ask")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
