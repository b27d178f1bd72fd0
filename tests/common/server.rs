//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases and fake providers.

use super::constants::*;
use super::fakes::{RecordingNotificationProvider, ScriptedSigningProvider};
use signflow_server::config::{AppConfig, CliConfig};
use signflow_server::server::{make_app, RequestsLoggingLevel};
use signflow_server::signing::SigningProvider;
use signflow_server::{Providers, ServiceRuntime};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated databases
///
/// When dropped, the server and its scheduler shut down and temp resources
/// are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The signing provider the workflow talks to
    #[allow(dead_code)]
    pub signing: Arc<ScriptedSigningProvider>,

    /// Every notification the server sent
    #[allow(dead_code)]
    pub notifications: Arc<RecordingNotificationProvider>,

    // Private fields - keep resources alive until drop
    runtime: Option<ServiceRuntime>,
    shutdown: CancellationToken,
    _temp_db_dir: TempDir,
}

impl TestServer {
    /// Spawns a new test server with the signing workflow enabled
    pub async fn spawn() -> Self {
        Self::spawn_with(true).await
    }

    /// Spawns a new test server without a signing provider
    #[allow(dead_code)]
    pub async fn spawn_without_signing() -> Self {
        Self::spawn_with(false).await
    }

    /// # Panics
    ///
    /// Panics if the databases cannot be created, the port cannot be bound
    /// or the server doesn't become ready within timeout.
    async fn spawn_with(signing_enabled: bool) -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let cli = CliConfig {
            db_dir: Some(temp_db_dir.path().to_path_buf()),
            port,
            logging_level: RequestsLoggingLevel::None,
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            admin_token: Some(ADMIN_TOKEN.to_string()),
        };
        let config = AppConfig::resolve(&cli, None).expect("Failed to resolve config");

        let signing = Arc::new(ScriptedSigningProvider::default());
        let notifications = Arc::new(RecordingNotificationProvider::default());
        let providers = Providers {
            signing: signing_enabled.then(|| signing.clone() as Arc<dyn SigningProvider>),
            notifications: notifications.clone(),
        };
        let runtime = ServiceRuntime::start_with(&config, providers)
            .await
            .expect("Failed to start runtime");

        let app = make_app(runtime.server_state());
        let shutdown = runtime.shutdown_token();
        let server_shutdown = shutdown.clone();

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            signing,
            notifications,
            runtime: Some(runtime),
            shutdown,
            _temp_db_dir: temp_db_dir,
        };

        server.wait_for_ready().await;

        server
    }

    /// Wait until every notification spawned so far has been delivered.
    #[allow(dead_code)]
    pub async fn notifications_idle(&self) {
        if let Some(runtime) = &self.runtime {
            runtime.dispatcher().wait_idle().await;
        }
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Stops both the HTTP server and the scheduler loop
        self.shutdown.cancel();
        self.runtime.take();
    }
}
