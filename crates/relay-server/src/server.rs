//! `RelayServer`: axum router, listener, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::{IdGenerator, UuidGenerator};
use relay_hub::metrics as names;
use relay_hub::{ConnectionRegistry, Hub, Inbound, PeerPolicy};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::{ShutdownCoordinator, ShutdownHook, run_shutdown_hooks};
use crate::websocket::run_session;

/// Shared state for axum handlers and sessions.
#[derive(Clone)]
pub struct AppState {
    /// Hub and peer policy for inbound frames.
    pub inbound: Inbound,
    /// Live connections by id.
    pub registry: Arc<ConnectionRegistry>,
    /// Mints ids for callers that did not supply one.
    pub ids: Arc<dyn IdGenerator>,
    /// Resolved configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown token and session tracker.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server was created.
    pub start_time: Instant,
    /// Renders `/metrics`; the route answers 404 without it.
    pub metrics: Option<PrometheusHandle>,
}

/// Query string of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Caller-chosen connection id.
    pub id: Option<String>,
}

/// The accepting side of the relay hub.
pub struct RelayServer {
    state: AppState,
    hooks: Vec<Arc<dyn ShutdownHook>>,
}

impl RelayServer {
    /// Create a server that dispatches into `hub`, admitting the kinds in
    /// `policy`.
    pub fn new(config: ServerConfig, hub: Hub, policy: PeerPolicy) -> Self {
        Self {
            state: AppState {
                inbound: Inbound::new(Arc::new(hub), Arc::new(policy)),
                registry: Arc::new(ConnectionRegistry::new()),
                ids: Arc::new(UuidGenerator),
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics: None,
            },
            hooks: Vec::new(),
        }
    }

    /// Replace the id generator.
    #[must_use]
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.state.ids = Arc::new(ids);
        self
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Run `hook` at the end of [`Self::shutdown`].
    #[must_use]
    pub fn with_shutdown_hook(mut self, hook: Arc<dyn ShutdownHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// The axum router: the upgrade route, `/health`, and `/metrics`.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.state.config.path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Bind and serve in the background until shutdown is signalled.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.state.config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        info!(%addr, path = %self.state.config.path, "relay server listening");
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                error!(error = %e, "server stopped with error");
            }
        });
        Ok((addr, handle))
    }

    /// Stop accepting, let every connection flush and close, drain the hub,
    /// then run shutdown hooks.
    ///
    /// Connections still open after `timeout` are closed outright. Returns
    /// `true` when everything finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let coordinator = &self.state.shutdown;
        coordinator.shutdown();

        let connections = self.state.registry.snapshot();
        info!(connections = connections.len(), "finishing connections");
        for conn in &connections {
            conn.finish();
        }

        let mut clean = coordinator.wait_for_tasks(timeout).await;
        if !clean {
            for conn in self.state.registry.snapshot() {
                conn.close();
            }
        }

        if !self.state.inbound.hub.shutdown(self.state.config.drain_timeout).await {
            clean = false;
        }

        if let Err(e) = run_shutdown_hooks(&self.hooks).await {
            warn!(error = %e, "shutdown hooks failed");
            clean = false;
        }

        info!(clean, "relay server stopped");
        clean
    }

    /// Live connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// The handler hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.state.inbound.hub
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Shutdown coordinator.
    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }
}

/// `GET <path>[?id=..]`: upgrade and hand the socket to a session.
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.shutdown.is_shutting_down() {
        counter!(names::UPGRADES_REFUSED_TOTAL, "reason" => "shutting_down").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let id = params
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| state.ids.next_id());
    let tracker = state.shutdown.tracker().clone();

    ws.max_message_size(state.config.connection.read_limit)
        .on_upgrade(move |socket| tracker.track_future(run_session(socket, id, state)))
}

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
        state.shutdown.is_shutting_down(),
    ))
}

/// `GET /metrics`
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
