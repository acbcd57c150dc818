mod handle;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use handle::MonitorHandle;
pub use orchestrator::MoodcamOrchestrator;
pub use types::{ComponentState, ShutdownReason};
