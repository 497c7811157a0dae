//! `HyphaServer`: Axum HTTP + WebSocket server.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use hypha_chain::{
    AgentChainExecutor, ChainExecutor, PluginChainExecutor, PluginRegistry, StepLimits,
    TaskRegistry,
};
use hypha_ratelimit::RateLimiter;
use hypha_safety::SafetyCoordinator;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::track_http;
use crate::ratelimit::rate_limit;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::ConnectionManager;

/// Failure starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Other socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide safe mode and task registry.
    pub safety: Arc<SafetyCoordinator>,
    /// Live WebSocket sessions.
    pub connections: Arc<ConnectionManager>,
    /// Task handlers, for single-task requests.
    pub tasks: Arc<dyn TaskRegistry>,
    /// Runs agent chains.
    pub agents: Arc<dyn ChainExecutor>,
    /// Runs plugin chains.
    pub plugins: Arc<dyn ChainExecutor>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Broadcast `event` to every live session without waiting for delivery.
    pub fn notify_all(&self, event: Value) {
        let connections = Arc::clone(&self.connections);
        drop(tokio::spawn(async move {
            connections.broadcast(&event, &HashSet::new()).await;
        }));
    }
}

/// The hypha server.
pub struct HyphaServer {
    config: Arc<ServerConfig>,
    safety: Arc<SafetyCoordinator>,
    connections: Arc<ConnectionManager>,
    tasks: Arc<dyn TaskRegistry>,
    agents: Arc<dyn ChainExecutor>,
    plugins: Arc<dyn ChainExecutor>,
    limiter: Arc<RateLimiter>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl HyphaServer {
    /// Create a server. Chain executors are built from `tasks` and `plugins`
    /// and bounded by the config's step limits.
    pub fn new(
        config: ServerConfig,
        safety: Arc<SafetyCoordinator>,
        tasks: Arc<dyn TaskRegistry>,
        plugins: Arc<PluginRegistry>,
        limiter: RateLimiter,
    ) -> Self {
        let limits = StepLimits {
            max_steps: Some(config.max_chain_steps),
            max_payload_chars: config.max_payload_chars,
            allow_empty_payload: false,
        };
        let agents = AgentChainExecutor::new(Arc::clone(&safety), Arc::clone(&tasks))
            .with_limits(limits);
        let plugins = PluginChainExecutor::new(Arc::clone(&safety), plugins).with_limits(
            StepLimits {
                allow_empty_payload: true,
                ..limits
            },
        );

        Self {
            connections: Arc::new(
                ConnectionManager::new(config.heartbeat_interval())
                    .with_send_timeout(config.send_timeout()),
            ),
            config: Arc::new(config),
            safety,
            tasks,
            agents: Arc::new(agents),
            plugins: Arc::new(plugins),
            limiter: Arc::new(limiter),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn state(&self) -> AppState {
        AppState {
            safety: Arc::clone(&self.safety),
            connections: Arc::clone(&self.connections),
            tasks: Arc::clone(&self.tasks),
            agents: Arc::clone(&self.agents),
            plugins: Arc::clone(&self.plugins),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            config: Arc::clone(&self.config),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Request metrics wrap the limiter so 429s are counted too.
        let api = routes::api_routes()
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.limiter),
                rate_limit,
            ))
            .route_layer(middleware::from_fn(track_http));

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/agents/{client_id}", get(routes::ws::ws_handler))
            .route_layer(middleware::from_fn(track_http))
            .nest("/api", api)
            .with_state(self.state())
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address and the serve task. Cancelling the shutdown
    /// token stops accepting, closes every session and lets the task finish.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "hypha server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let connections = Arc::clone(&self.connections);
        let handle = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                token.cancelled().await;
                connections.shutdown().await;
            })
            .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
            info!("hypha server stopped");
        });

        Ok((local_addr, handle))
    }

    /// Get the safety coordinator.
    pub fn safety(&self) -> &Arc<SafetyCoordinator> {
        &self.safety
    }

    /// Get the connection manager.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connections.connection_count(),
        state.safety.is_operational(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
