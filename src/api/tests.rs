use super::handlers::{
    current_handler, frame_handler, health_handler, start_handler, statistics_handler,
    stop_handler, StatisticsQuery,
};
use super::*;
use crate::app::MonitorHandle;
use crate::camera::CameraOpenerBuilder;
use crate::config::{CameraSource, MoodcamConfig};
use crate::detector::{build_classifier, build_locator};
use crate::driver::AnalyticsDriver;
use crate::emotion::{Emotion, EmotionSample, EmotionVector};
use crate::events::EventBus;
use crate::sample_buffer::SampleBuffer;
use crate::sampler::SamplingLoop;
use crate::statistics::Window;
use crate::storage::RecordStore;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

struct Fixture {
    state: ServerState,
    buffer: Arc<SampleBuffer>,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut config = MoodcamConfig::default();
    config.camera.source = CameraSource::Synthetic;
    config.camera.resolution = (160, 120);
    config.camera.fps = 30;
    config.detector.min_face_area = 200;

    let bus = EventBus::new(32);
    let buffer = Arc::new(SampleBuffer::new());
    let opener = CameraOpenerBuilder::new()
        .config(config.camera.clone())
        .build()
        .unwrap();
    let sampler = Arc::new(SamplingLoop::new(
        opener,
        build_locator(&config.detector),
        build_classifier(&config.detector),
        Arc::clone(&buffer),
        bus.clone(),
        &config.sampler,
    ));
    let driver = Arc::new(AnalyticsDriver::new(
        Arc::clone(&buffer),
        Arc::new(RecordStore::new(dir.path().join("log.csv"))),
        bus.clone(),
        &config.storage,
        &config.dashboard,
    ));

    Fixture {
        state: ServerState::new(
            MonitorHandle::new(sampler, driver, Arc::clone(&buffer)),
            bus,
        ),
        buffer,
        _dir: dir,
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_resolve_window() {
    assert_eq!(resolve_window(None, Window::Last(500)), Window::Last(500));
    assert_eq!(resolve_window(Some(0), Window::Last(500)), Window::All);
    assert_eq!(resolve_window(Some(20), Window::All), Window::Last(20));
}

#[tokio::test]
async fn test_health_reports_idle_monitor() {
    let f = fixture();
    let response = health_handler(State(f.state.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sampling"], false);
    assert_eq!(body["frames_available"], false);
    assert_eq!(body["persisted_samples"], 0);
}

#[tokio::test]
async fn test_frame_missing_before_sampling() {
    let f = fixture();
    let response = frame_handler(State(f.state.clone())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(current_handler(State(f.state.clone())).await).await;
    assert!(body["emotions"].is_null());
    assert!(body["captured_at"].is_null());
}

#[tokio::test]
async fn test_statistics_follow_window_parameter() {
    let f = fixture();

    let body = json_body(
        statistics_handler(State(f.state.clone()), Query(StatisticsQuery::default())).await,
    )
    .await;
    assert!(body["statistics"].is_null());

    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    for (i, emotion) in [Emotion::Happy, Emotion::Happy, Emotion::Sad]
        .into_iter()
        .enumerate()
    {
        f.buffer.push(EmotionSample::new(
            t0 + ChronoDuration::seconds(i as i64),
            EmotionVector::from_pairs([(emotion, 0.8)]),
        ));
    }
    assert_eq!(f.state.handle.save().await.unwrap(), 3);

    let all = json_body(
        statistics_handler(
            State(f.state.clone()),
            Query(StatisticsQuery { window: Some(0) }),
        )
        .await,
    )
    .await;
    let stats = &all["statistics"];
    assert_eq!(stats["total_count"], 3);
    assert_eq!(stats["most_frequent"], "happy");
    assert_eq!(stats["emotion_distribution"]["happy"], 2);
    assert_eq!(stats["transitions"]["happy"]["sad"], 0.5);

    let tail = json_body(
        statistics_handler(
            State(f.state.clone()),
            Query(StatisticsQuery { window: Some(1) }),
        )
        .await,
    )
    .await;
    assert_eq!(tail["statistics"]["total_count"], 1);
    assert_eq!(tail["statistics"]["most_frequent"], "sad");
}

#[tokio::test]
async fn test_start_and_stop_over_http() {
    let f = fixture();

    let response = start_handler(State(f.state.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(f.state.handle.is_sampling());

    sleep(Duration::from_millis(300)).await;
    let response = frame_handler(State(f.state.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let jpeg = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    let body = json_body(stop_handler(State(f.state.clone())).await).await;
    assert_eq!(body["sampling"], false);
    assert!(!f.state.handle.is_sampling());
}

#[tokio::test]
async fn test_server_stops_on_cancel() {
    let f = fixture();
    let mut config = MoodcamConfig::default().api;
    config.port = 0;
    let server = ApiServer::new(config, f.state.handle.clone(), f.state.event_bus.clone());

    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { server.serve(cancel).await }
    });

    sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
