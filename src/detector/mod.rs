//! Face location and emotion classification

mod classifier;
mod command;
mod locator;

use crate::config::DetectorConfig;
use crate::emotion::EmotionVector;
use crate::error::ClassificationError;
use crate::frame::{BoundingBox, FrameData};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use classifier::{normalize_scores, UnconfiguredClassifier};
pub use command::CommandClassifier;
pub use locator::SkinRegionLocator;

/// Finds the most prominent face in a frame
pub trait FaceLocator: Send + Sync {
    /// Region of the most prominent face, or `None` when no face is visible
    fn locate(&self, frame: &FrameData) -> Option<BoundingBox>;
}

/// Maps a face image to per-emotion confidences.
///
/// Implementations may block; callers run them off the async runtime.
/// Errors are transient and never end a sampling run.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, face: &FrameData) -> Result<EmotionVector, ClassificationError>;
}

/// Face locator for the configured detector settings
pub fn build_locator(config: &DetectorConfig) -> Arc<dyn FaceLocator> {
    Arc::new(SkinRegionLocator::new(config.min_face_area))
}

/// Classifier for the configured detector settings
pub fn build_classifier(config: &DetectorConfig) -> Arc<dyn EmotionClassifier> {
    match config.classifier_command.split_first() {
        Some((program, args)) => {
            info!("Using external emotion classifier: {}", program);
            Arc::new(CommandClassifier::new(
                program.clone(),
                args.to_vec(),
                Duration::from_millis(config.classifier_timeout_ms),
            ))
        }
        None => {
            warn!("No emotion classifier configured; every face will be recorded as neutral");
            Arc::new(UnconfiguredClassifier)
        }
    }
}
