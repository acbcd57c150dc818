use super::*;
use crate::config::{CameraConfig, CameraSource};
use crate::error::MoodcamError;

fn create_test_camera_config() -> CameraConfig {
    CameraConfig {
        source: CameraSource::Synthetic,
        index: 0,
        resolution: (64, 48),
        fps: 200,
        synthetic_frames: Some(3),
    }
}

#[tokio::test]
async fn test_synthetic_stream_ends_after_limit() {
    let opener = CameraOpenerBuilder::new()
        .config(create_test_camera_config())
        .build()
        .unwrap();
    assert_eq!(opener.device_name(), "synthetic");

    let mut source = opener.open().await.unwrap();
    let mut ids = Vec::new();
    while let Some(frame) = source.next_frame().await.unwrap() {
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(frame.validate_size());
        ids.push(frame.id);
    }
    assert_eq!(ids, vec![0, 1, 2]);

    // End of stream is sticky
    assert!(source.next_frame().await.unwrap().is_none());
    source.release().await;
}

#[tokio::test]
async fn test_released_source_refuses_reads() {
    let mut config = create_test_camera_config();
    config.synthetic_frames = None;
    let mut source = SyntheticOpener::new(config).open().await.unwrap();

    assert!(source.next_frame().await.unwrap().is_some());
    source.release().await;
    assert!(matches!(
        source.next_frame().await,
        Err(MoodcamError::Camera(crate::error::CameraError::Stream { .. }))
    ));
}

#[tokio::test]
async fn test_each_open_starts_a_fresh_stream() {
    let opener = SyntheticOpener::new(create_test_camera_config());

    let mut first = opener.open().await.unwrap();
    first.next_frame().await.unwrap();
    first.release().await;

    let mut second = opener.open().await.unwrap();
    assert_eq!(second.next_frame().await.unwrap().unwrap().id, 0);
}

#[tokio::test]
async fn test_zero_resolution_is_rejected() {
    let mut config = create_test_camera_config();
    config.resolution = (0, 0);
    assert!(SyntheticOpener::new(config).open().await.is_err());
}

#[test]
fn test_synthetic_frame_contains_skin_region() {
    let image = render_synthetic_frame(64, 48, 0);
    let center = image.get_pixel(32, 24 + 2);
    assert_eq!(center.0, [224, 172, 140]);
    assert_eq!(image.get_pixel(0, 0).0, [40, 60, 90]);

    // The face drifts between frames
    assert_ne!(render_synthetic_frame(64, 48, 0), render_synthetic_frame(64, 48, 5));
}

#[test]
fn test_camera_builder_validation() {
    let result = CameraOpenerBuilder::new().build();
    match result {
        Err(MoodcamError::System { message }) => {
            assert!(message.contains("Camera configuration must be specified"));
        }
        _ => panic!("Expected system error for missing configuration"),
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
#[tokio::test]
async fn test_missing_device_is_unavailable() {
    let mut config = create_test_camera_config();
    config.source = CameraSource::Device;
    config.index = 97;

    let opener = CameraOpenerBuilder::new().config(config).build().unwrap();
    assert_eq!(opener.device_name(), "/dev/video97");

    match opener.open().await {
        Err(crate::error::CameraError::Unavailable { device, .. }) => {
            assert_eq!(device, "/dev/video97");
        }
        Err(crate::error::CameraError::Configuration { .. }) => {
            // GStreamer plugins not installed on this host
        }
        Err(e) => panic!("Unexpected camera error: {}", e),
        Ok(_) => panic!("Opened a camera that should not exist"),
    }
}
