use crate::emotion::Emotion;
use crate::events::MoodcamEvent;
use crate::statistics::Window;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::server::ServerState;

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    /// Trailing rows to include; 0 means all
    pub window: Option<usize>,
}

/// Window from a query parameter, falling back to the configured default
pub fn resolve_window(requested: Option<usize>, default: Window) -> Window {
    requested.map(Window::from_rows).unwrap_or(default)
}

fn emotion_map(values: impl Iterator<Item = (Emotion, f64)>) -> BTreeMap<&'static str, f64> {
    values.map(|(emotion, value)| (emotion.as_str(), value)).collect()
}

pub async fn health_handler(State(state): State<ServerState>) -> Response {
    let handle = &state.handle;
    let health_info = json!({
        "status": "healthy",
        "sampling": handle.is_sampling(),
        "frames_available": handle.current_frame().is_some(),
        "persisted_samples": handle.persisted_count(),
        "pending_samples": handle.pending_count(),
        "sampler": handle.sampler_stats(),
        "buffer": handle.buffer_stats(),
        "store": handle.store_stats(),
        "server_info": {
            "subscribers": state.event_bus.subscriber_count(),
        }
    });

    (StatusCode::OK, Json(health_info)).into_response()
}

/// Latest reading; `emotions` is null when the newest frame showed no face
pub async fn current_handler(State(state): State<ServerState>) -> Response {
    let snapshot = state.handle.live_snapshot();
    let reading = snapshot.as_ref().and_then(|s| s.emotions);

    let body = json!({
        "sampling": state.handle.is_sampling(),
        "captured_at": snapshot.as_ref().map(|s| s.captured_at.to_rfc3339()),
        "frame_id": snapshot.as_ref().map(|s| s.frame.id),
        "face": snapshot.as_ref().and_then(|s| s.detection),
        "emotions": reading.map(|v| emotion_map(v.iter())),
        "dominant_emotion": reading.map(|v| v.dominant().0),
        "confidence": reading.map(|v| v.dominant().1),
    });

    (StatusCode::OK, Json(body)).into_response()
}

pub async fn statistics_handler(
    State(state): State<ServerState>,
    Query(query): Query<StatisticsQuery>,
) -> Response {
    let window = resolve_window(query.window, state.handle.default_window());
    let statistics = state.handle.statistics(window);

    let body = json!({
        "window": window,
        "statistics": statistics.map(|stats| json!({
            "total_count": stats.total_count,
            "session_duration": stats.session_duration,
            "session_minutes": stats.session_minutes(),
            "most_frequent": stats.most_frequent(),
            "avg_emotions": emotion_map(stats.avg_emotions.iter()),
            "emotion_distribution": stats.emotion_distribution,
            "transitions": stats.transitions,
        })),
    });

    (StatusCode::OK, Json(body)).into_response()
}

pub async fn frame_handler(State(state): State<ServerState>) -> Response {
    let Some(frame) = state.handle.current_frame() else {
        return (StatusCode::NOT_FOUND, "No frame captured yet").into_response();
    };

    let frame_id = frame.id;
    match tokio::task::spawn_blocking(move || frame.encode_jpeg(JPEG_QUALITY)).await {
        Ok(Ok(jpeg)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache, private"),
            ],
            jpeg,
        )
            .into_response(),
        Ok(Err(e)) => {
            error!("Failed to encode frame {}: {}", frame_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!("Frame encoder task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn start_handler(State(state): State<ServerState>) -> Response {
    match state.handle.start().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "sampling": true }))).into_response(),
        Err(e) => {
            warn!("Start requested over HTTP failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "sampling": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn stop_handler(State(state): State<ServerState>) -> Response {
    state.handle.stop().await;
    (StatusCode::OK, Json(json!({ "sampling": false }))).into_response()
}

/// Annotated live frames as multipart JPEG
pub async fn mjpeg_stream_handler(State(state): State<ServerState>) -> Response {
    info!("New MJPEG stream client connected");

    let stream = async_stream::stream! {
        let mut last_frame_id = None;
        let mut frame_interval = interval(state.stream_interval);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frames_streamed = 0u64;

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = frame_interval.tick() => {}
            }

            let Some(frame) = state.handle.current_frame() else {
                continue;
            };
            if last_frame_id == Some(frame.id) {
                continue;
            }
            last_frame_id = Some(frame.id);

            let frame_id = frame.id;
            let timestamp_ms = frame
                .timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();

            match tokio::task::spawn_blocking(move || frame.encode_jpeg(JPEG_QUALITY)).await {
                Ok(Ok(jpeg)) => {
                    frames_streamed += 1;
                    debug!("Streaming frame {} ({} bytes)", frame_id, jpeg.len());

                    let boundary = format!(
                        "--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nX-Frame-ID: {}\r\nX-Timestamp: {}\r\n\r\n",
                        jpeg.len(),
                        frame_id,
                        timestamp_ms
                    );

                    yield Ok::<_, axum::Error>(Bytes::from(boundary));
                    yield Ok(Bytes::from(jpeg));
                    yield Ok(Bytes::from("\r\n"));
                }
                Ok(Err(e)) => {
                    error!("Failed to encode frame {} for streaming: {}", frame_id, e);
                    let _ = state.event_bus.publish(MoodcamEvent::SystemError {
                        component: "api".to_string(),
                        error: format!("Frame encoding failed: {}", e),
                    });
                }
                Err(e) => error!("Frame encoder task failed: {}", e),
            }
        }

        info!("MJPEG stream closed after {} frames", frames_streamed);
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=FRAME"),
            (header::CACHE_CONTROL, "no-cache, private"),
            (header::PRAGMA, "no-cache"),
        ],
        axum::body::Body::from_stream(stream),
    )
        .into_response()
}
