//! `GatewayServer` — axum HTTP front door for the realtime gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::dispatch::{ApplicationSink, DiscardSink};
use crate::websocket::registry::SessionRegistry;
use crate::websocket::session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry and delivery API.
    pub registry: Arc<SessionRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Collaborator sink for authenticated application frames.
    pub sink: Arc<dyn ApplicationSink>,
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
    /// When the gateway started.
    pub start_time: Instant,
}

/// The gateway server.
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    registry: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    sink: Arc<dyn ApplicationSink>,
    start_time: Instant,
}

impl GatewayServer {
    /// Create a server with the default (discarding) application sink.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            sink: Arc::new(DiscardSink),
            start_time: Instant::now(),
        }
    }

    /// Replace the application sink (collaborator seam).
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ApplicationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            shutdown: Arc::clone(&self.shutdown),
            sink: Arc::clone(&self.sink),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listen socket and serve until shutdown is triggered.
    ///
    /// Returns the bound address and the serve task handle.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), GatewayError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GatewayError::Bind { addr, source })?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "gateway server exited with error");
            }
        });

        info!(addr = %local_addr, "gateway listening");
        Ok((local_addr, handle))
    }

    /// The session registry (delivery API for collaborators).
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// GET /ws — WebSocket upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let conn_id = format!("conn_{}", Uuid::now_v7());
    // Request metadata is diagnostic only, never an authorization input
    debug!(
        conn_id,
        %remote,
        user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-"),
        "websocket upgrade request"
    );

    let registry = Arc::clone(&state.registry);
    let sink = Arc::clone(&state.sink);
    let heartbeat_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let send_queue = state.config.send_queue;

    ws.max_message_size(state.config.max_frame_bytes)
        .on_upgrade(move |socket| {
            session::run_session(
                socket,
                conn_id,
                Some(remote),
                registry,
                sink,
                heartbeat_interval,
                send_queue,
            )
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let clients = state.registry.count().await;
    Json(health::health_snapshot(state.start_time, clients))
}
