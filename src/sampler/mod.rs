//! Continuous emotion sampling from the camera

mod core;
mod live;
mod overlay;

pub use self::core::{SamplerStats, SamplingLoop};
pub use self::live::{LiveSnapshot, LiveView};
pub use self::overlay::Annotator;
