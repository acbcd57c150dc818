use crate::app::MonitorHandle;
use crate::config::ApiConfig;
use crate::error::{ApiError, Result};
use crate::events::EventBus;
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handlers::{
    current_handler, frame_handler, health_handler, mjpeg_stream_handler, start_handler,
    statistics_handler, stop_handler,
};

/// Pacing of the MJPEG stream; frames only change once per sampling cycle
const STREAM_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) handle: MonitorHandle,
    pub(crate) event_bus: EventBus,
    pub(crate) stream_interval: Duration,
    /// Ends open MJPEG streams so graceful shutdown can finish
    pub(crate) shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(handle: MonitorHandle, event_bus: EventBus) -> Self {
        Self {
            handle,
            event_bus,
            stream_interval: STREAM_FRAME_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }
}

/// HTTP server exposing live readings, statistics and sampling control
pub struct ApiServer {
    pub(crate) config: ApiConfig,
    state: ServerState,
}

impl ApiServer {
    pub fn new(config: ApiConfig, handle: MonitorHandle, event_bus: EventBus) -> Self {
        Self {
            config,
            state: ServerState::new(handle, event_bus),
        }
    }

    pub fn router(state: ServerState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/current", get(current_handler))
            .route("/api/statistics", get(statistics_handler))
            .route("/api/frame.jpg", get(frame_handler))
            .route("/api/sampling/start", post(start_handler))
            .route("/api/sampling/stop", post(stop_handler))
            .route("/stream.mjpg", get(mjpeg_stream_handler))
            .with_state(state)
    }

    /// Serve until `cancel` fires
    pub async fn serve(&self, cancel: CancellationToken) -> Result<()> {
        let mut state = self.state.clone();
        state.shutdown = cancel.clone();
        let app = Self::router(state);
        let addr = format!("{}:{}", self.config.ip, self.config.port);

        info!("Starting API server on {}", addr);

        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| ApiError::BindFailed {
                    address: addr.clone(),
                    source: e,
                })?;

        info!("API server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| ApiError::ServerFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("API server stopped");
        Ok(())
    }
}
