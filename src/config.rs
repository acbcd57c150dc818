use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Lower bound on the sampling interval
pub const MIN_SAMPLE_INTERVAL_MS: u64 = 100;
/// Accepted range for the dashboard refresh cadence, in seconds
pub const REFRESH_RANGE_SECONDS: (f64, f64) = (0.5, 3.0);

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MoodcamConfig {
    pub camera: CameraConfig,
    pub sampler: SamplerConfig,
    pub detector: DetectorConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
    pub api: ApiConfig,
    pub system: SystemConfig,
}

/// Where frames come from
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraSource {
    /// V4L2 device at `/dev/video{index}`
    Device,
    /// Generated frames, for demos and tests
    Synthetic,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_camera_source")]
    pub source: CameraSource,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// End the synthetic stream after this many frames
    #[serde(default)]
    pub synthetic_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SamplerConfig {
    /// Minimum time between sampling cycles
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Start sampling as soon as the application is up
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    /// Draw the face box onto published frames
    #[serde(default = "default_annotate")]
    pub annotate: bool,

    /// TrueType font for the emotion caption; no caption when unset
    #[serde(default)]
    pub font_path: Option<String>,

    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Smallest skin region, in pixels, accepted as a face
    #[serde(default = "default_min_face_area")]
    pub min_face_area: u32,

    /// Program and arguments of the external classifier; empty disables it
    #[serde(default)]
    pub classifier_command: Vec<String>,

    #[serde(default = "default_classifier_timeout_ms")]
    pub classifier_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Location of the CSV emotion log
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Persist buffered samples automatically
    #[serde(default = "default_auto_save")]
    pub auto_save: bool,

    /// Persist once at least this many samples are pending
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DashboardConfig {
    /// Seconds between driver cycles
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: f64,

    /// Trailing samples statistics cover by default; 0 for the whole log
    #[serde(default = "default_window_rows")]
    pub window_rows: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,

    /// IP address to bind to
    #[serde(default = "default_api_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl SamplerConfig {
    /// Effective interval, never below the minimum
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_SAMPLE_INTERVAL_MS))
    }
}

impl StorageConfig {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl DashboardConfig {
    /// Effective refresh cadence, clamped into the accepted range
    pub fn refresh_interval(&self) -> Duration {
        let (low, high) = REFRESH_RANGE_SECONDS;
        let seconds = if self.refresh_seconds.is_finite() {
            self.refresh_seconds.clamp(low, high)
        } else {
            default_refresh_seconds()
        };
        Duration::from_secs_f64(seconds)
    }
}

impl MoodcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("moodcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.source", "device")?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("sampler.interval_ms", default_interval_ms())?
            .set_default("sampler.autostart", default_autostart())?
            .set_default("sampler.annotate", default_annotate())?
            .set_default("sampler.font_size", default_font_size() as f64)?
            .set_default("detector.min_face_area", default_min_face_area())?
            .set_default("detector.classifier_command", Vec::<String>::new())?
            .set_default(
                "detector.classifier_timeout_ms",
                default_classifier_timeout_ms(),
            )?
            .set_default("storage.path", default_storage_path())?
            .set_default("storage.auto_save", default_auto_save())?
            .set_default("storage.batch_size", default_batch_size() as i64)?
            .set_default("dashboard.refresh_seconds", default_refresh_seconds())?
            .set_default("dashboard.window_rows", default_window_rows() as i64)?
            .set_default("api.enabled", default_api_enabled())?
            .set_default("api.ip", default_api_ip())?
            .set_default("api.port", default_api_port())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables like MOODCAM_SAMPLER__INTERVAL_MS
            .add_source(
                Environment::with_prefix("MOODCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: MoodcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.sampler.interval_ms < MIN_SAMPLE_INTERVAL_MS {
            return Err(ConfigError::Message(format!(
                "Sampler interval_ms must be at least {}",
                MIN_SAMPLE_INTERVAL_MS
            )));
        }

        if self.sampler.font_size <= 0.0 {
            return Err(ConfigError::Message(
                "Sampler font_size must be greater than 0".to_string(),
            ));
        }

        if self.detector.min_face_area == 0 {
            return Err(ConfigError::Message(
                "Detector min_face_area must be greater than 0".to_string(),
            ));
        }

        if !self.detector.classifier_command.is_empty()
            && self.detector.classifier_timeout_ms == 0
        {
            return Err(ConfigError::Message(
                "Detector classifier_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Storage path must not be empty".to_string(),
            ));
        }

        if self.storage.batch_size == 0 {
            return Err(ConfigError::Message(
                "Storage batch_size must be greater than 0".to_string(),
            ));
        }

        let (low, high) = REFRESH_RANGE_SECONDS;
        if !(low..=high).contains(&self.dashboard.refresh_seconds) {
            return Err(ConfigError::Message(format!(
                "Dashboard refresh_seconds must be between {} and {}",
                low, high
            )));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for MoodcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                source: default_camera_source(),
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                synthetic_frames: None,
            },
            sampler: SamplerConfig {
                interval_ms: default_interval_ms(),
                autostart: default_autostart(),
                annotate: default_annotate(),
                font_path: None,
                font_size: default_font_size(),
            },
            detector: DetectorConfig {
                min_face_area: default_min_face_area(),
                classifier_command: Vec::new(),
                classifier_timeout_ms: default_classifier_timeout_ms(),
            },
            storage: StorageConfig {
                path: default_storage_path(),
                auto_save: default_auto_save(),
                batch_size: default_batch_size(),
            },
            dashboard: DashboardConfig {
                refresh_seconds: default_refresh_seconds(),
                window_rows: default_window_rows(),
            },
            api: ApiConfig {
                enabled: default_api_enabled(),
                ip: default_api_ip(),
                port: default_api_port(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_camera_source() -> CameraSource {
    CameraSource::Device
}
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}

fn default_interval_ms() -> u64 {
    MIN_SAMPLE_INTERVAL_MS
}
fn default_autostart() -> bool {
    false
}
fn default_annotate() -> bool {
    true
}
fn default_font_size() -> f32 {
    20.0
}

fn default_min_face_area() -> u32 {
    2500
}
fn default_classifier_timeout_ms() -> u64 {
    5000
}

fn default_storage_path() -> String {
    "data/emotions.csv".to_string()
}
fn default_auto_save() -> bool {
    true
}
fn default_batch_size() -> usize {
    10
}

fn default_refresh_seconds() -> f64 {
    1.0
}
fn default_window_rows() -> usize {
    500
}

fn default_api_enabled() -> bool {
    true
}
fn default_api_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    8080
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_default_config() {
        let config = MoodcamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.batch_size, 10);
        assert_eq!(config.dashboard.window_rows, 500);
        assert_eq!(config.sampler.interval(), Duration::from_millis(100));
        assert_eq!(config.dashboard.refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
source = "synthetic"
synthetic_frames = 12

[sampler]
interval_ms = 250
font_path = "/tmp/font.ttf"

[detector]
classifier_command = ["python3", "classify.py"]

[storage]
path = "/tmp/moods.csv"
batch_size = 3

[dashboard]
refresh_seconds = 2.5
"#
        )
        .unwrap();

        let config = MoodcamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.source, CameraSource::Synthetic);
        assert_eq!(config.camera.synthetic_frames, Some(12));
        assert_eq!(config.camera.resolution, (640, 480));
        assert_eq!(config.sampler.interval_ms, 250);
        assert_eq!(config.sampler.font_path.as_deref(), Some("/tmp/font.ttf"));
        assert_eq!(
            config.detector.classifier_command,
            vec!["python3".to_string(), "classify.py".to_string()]
        );
        assert_eq!(config.storage.path, "/tmp/moods.csv");
        assert_eq!(config.storage.batch_size, 3);
        assert!(config.storage.auto_save);
        assert_eq!(config.dashboard.refresh_seconds, 2.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = MoodcamConfig::load_from_file("/nonexistent/moodcam.toml").unwrap();
        assert_eq!(config.storage.path, "data/emotions.csv");
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_config_validation() {
        let mut config = MoodcamConfig::default();

        config.sampler.interval_ms = 50;
        assert!(config.validate().is_err());
        assert_eq!(config.sampler.interval(), Duration::from_millis(100));
        config.sampler.interval_ms = 100;

        config.dashboard.refresh_seconds = 5.0;
        assert!(config.validate().is_err());
        assert_eq!(config.dashboard.refresh_interval(), Duration::from_secs(3));
        config.dashboard.refresh_seconds = 0.5;

        config.storage.batch_size = 0;
        assert!(config.validate().is_err());
        config.storage.batch_size = 1;

        config.camera.resolution = (0, 0);
        assert!(config.validate().is_err());
        config.camera.resolution = (320, 240);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serializes_to_toml() {
        let text = toml::to_string_pretty(&MoodcamConfig::default()).unwrap();
        assert!(text.contains("[sampler]"));
        assert!(text.contains("batch_size = 10"));
    }
}
