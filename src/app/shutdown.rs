use super::{ComponentState, MoodcamOrchestrator};
use crate::error::{MoodcamError, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Upper bound for a background task to wind down after cancellation
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl MoodcamOrchestrator {
    /// Stop sampling, flush pending samples and wind down background tasks
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Stopping)
                    .await;
                if let Err(e) = keyboard_handler.stop().await {
                    error!("Error stopping keyboard: {}", e);
                    exit_code = 1;
                }
                self.set_component_state("keyboard", ComponentState::Stopped)
                    .await;
            }
        }

        // Sampling first, so the driver's final flush sees every sample
        self.set_component_state("sampler", ComponentState::Stopping)
            .await;
        self.sampler.stop().await;
        self.set_component_state("sampler", ComponentState::Stopped)
            .await;

        self.cancellation_token.cancel();

        let tasks = std::mem::take(&mut self.background_tasks);
        for (component, task) in tasks {
            if let Err(e) = self.stop_component(component, task).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        let unsaved = self.handle.pending_count();
        if unsaved > 0 {
            warn!("{} samples were not persisted", unsaved);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&self, component: &str, mut task: JoinHandle<()>) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(TASK_STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(MoodcamError::component(
                    component.to_string(),
                    format!("task failed: {}", e),
                ))
            }
            Err(_) => {
                task.abort();
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(MoodcamError::component(
                    component.to_string(),
                    "stop timeout".to_string(),
                ))
            }
        }
    }
}
