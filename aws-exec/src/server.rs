//! HTTP server exposing command execution
//!
//! The server owns one listener at a time. `start` binds and hands the serve
//! loop to a background task; `stop` signals graceful shutdown and waits for
//! that task, bounded by the configured grace period.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::post, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::executor::{AwsCommandExecutor, CommandExecutor};
use crate::handlers::{self, AppState};
use crate::types::{Config, LifecycleState, ServerError};

/// The only route the server exposes
pub const EXECUTE_ROUTE: &str = "/execute-aws-command";

/// The AWS command server
pub struct AwsCommandServer {
    router: Router,
    shutdown_grace: Duration,
    state: LifecycleState,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<watch::Sender<bool>>,
    serve_task: Option<JoinHandle<()>>,
}

impl AwsCommandServer {
    /// Create a server with the default profile (`default` / `ap-northeast-1`)
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        let executor = AwsCommandExecutor::from_config(config);
        tracing::info!(
            "Using profile '{}' in region '{}'",
            executor.profile().profile_name(),
            executor.profile().region()
        );
        Self::with_executor(Arc::new(executor), config.server.shutdown_grace())
    }

    /// Create a server backed by any executor
    pub fn with_executor(executor: Arc<dyn CommandExecutor>, shutdown_grace: Duration) -> Self {
        Self {
            router: create_router(executor),
            shutdown_grace,
            state: LifecycleState::Stopped,
            local_addr: None,
            shutdown_tx: None,
            serve_task: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Address the listener is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind `addr` and serve in a background task.
    ///
    /// Returns as soon as the listener is bound. A serve error after that
    /// point is logged and terminates the process.
    pub async fn start(&mut self, addr: &str) -> Result<SocketAddr, ServerError> {
        if self.state != LifecycleState::Stopped {
            return Err(ServerError::AlreadyStarted(self.state));
        }
        self.state = LifecycleState::Starting;

        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                self.state = LifecycleState::Stopped;
                return Err(ServerError::Bind {
                    addr: addr.to_string(),
                    source,
                });
            }
        };

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let app = self.router.clone();

        let serve_task = tokio::spawn(async move {
            tracing::info!("Server starting on {}", local_addr);
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    // A dropped sender also ends the wait
                    let _ = shutdown_rx.changed().await;
                    tracing::info!("shutting down gracefully");
                })
                .await;

            if let Err(e) = result {
                tracing::error!("{}", ServerError::Serve(e));
                std::process::exit(1);
            }
        });

        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.serve_task = Some(serve_task);
        self.state = LifecycleState::Running;

        Ok(local_addr)
    }

    /// Stop accepting connections and drain in-flight requests.
    ///
    /// Waits at most the grace period for the drain. Past that the serve task
    /// is aborted and `ShutdownTimeout` is returned once it has exited.
    /// Subprocesses already running are not killed. Calling this while not
    /// running does nothing.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        if self.state != LifecycleState::Running {
            tracing::debug!("Stop requested while {:?}, nothing to do", self.state);
            return Ok(());
        }
        self.state = LifecycleState::Stopping;

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }

        let mut result = Ok(());
        if let Some(mut serve_task) = self.serve_task.take() {
            match tokio::time::timeout(self.shutdown_grace, &mut serve_task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Serve task ended abnormally: {}", e),
                Err(_elapsed) => {
                    serve_task.abort();
                    let _ = serve_task.await;
                    let err = ServerError::ShutdownTimeout(self.shutdown_grace);
                    tracing::warn!("Server shutdown error: {}", err);
                    result = Err(err);
                }
            }
        }

        self.local_addr = None;
        self.state = LifecycleState::Stopped;

        if result.is_ok() {
            tracing::info!("Server stopped gracefully");
        }
        result
    }
}

impl Default for AwsCommandServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the router with its single route
fn create_router(executor: Arc<dyn CommandExecutor>) -> Router {
    Router::new()
        .route(EXECUTE_ROUTE, post(handlers::execute_aws_command))
        .with_state(AppState { executor })
        .layer(TraceLayer::new_for_http())
}
