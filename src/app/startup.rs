use super::{ComponentState, MoodcamOrchestrator};
use crate::error::Result;
use crate::events::{EventFilter, MoodcamEvent};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl MoodcamOrchestrator {
    /// Register components and load the persisted history
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing moodcam components");

        {
            let mut states = self.component_states.lock().await;
            states.insert("driver".to_string(), ComponentState::Stopped);
            states.insert("sampler".to_string(), ComponentState::Stopped);
            states.insert("control".to_string(), ComponentState::Stopped);

            #[cfg(feature = "http_api")]
            {
                if self.config.api.enabled {
                    states.insert("api".to_string(), ComponentState::Stopped);
                }
            }

            // Only register keyboard component if enabled
            if self.keyboard_enabled {
                states.insert("keyboard".to_string(), ComponentState::Stopped);
            }
        }

        let loaded = self.driver.load_history().await;
        info!("History holds {} samples", loaded);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start the background tasks and, when configured, sampling
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting moodcam system");

        self.set_component_state("driver", ComponentState::Starting)
            .await;
        let driver = Arc::clone(&self.driver);
        let token = self.cancellation_token.child_token();
        self.background_tasks
            .push(("driver", tokio::spawn(driver.run(token))));
        self.set_component_state("driver", ComponentState::Running)
            .await;

        self.start_control_listener().await;

        #[cfg(feature = "http_api")]
        {
            if self.config.api.enabled {
                self.start_api_server().await;
            }
        }

        if self.config.sampler.autostart {
            self.set_component_state("sampler", ComponentState::Starting)
                .await;
            match self.sampler.start().await {
                Ok(()) => {
                    self.set_component_state("sampler", ComponentState::Running)
                        .await;
                    info!("Sampling started");
                }
                Err(e) => {
                    // Not fatal: sampling can be started again later
                    warn!("Sampling not started: {}", e);
                    self.set_component_state("sampler", ComponentState::Stopped)
                        .await;
                }
            }
        } else {
            info!("Sampling idle until requested");
        }

        // Start keyboard input handler (only if enabled)
        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
                info!("Keyboard input active - s: toggle sampling, p: statistics, q: quit");
            }
        }

        info!("Moodcam system started successfully");
        Ok(())
    }

    /// Turn toggle requests from the event bus into start/stop calls
    async fn start_control_listener(&mut self) {
        let mut receiver = self.event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["sampling_toggle_requested"]),
            "control",
        );
        let handle = self.handle.clone();
        let token = self.cancellation_token.child_token();
        let states = Arc::clone(&self.component_states);

        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(MoodcamEvent::SamplingToggleRequested) => {
                        let state = match handle.toggle().await {
                            Ok(true) => ComponentState::Running,
                            Ok(false) => ComponentState::Stopped,
                            Err(e) => {
                                warn!("Could not start sampling: {}", e);
                                ComponentState::Stopped
                            }
                        };
                        states.lock().await.insert("sampler".to_string(), state);
                    }
                    Ok(other) => debug!("Control ignoring {}", other.event_type()),
                    Err(_) => break,
                }
            }
            debug!("Control listener exited");
        });

        self.background_tasks.push(("control", task));
        self.set_component_state("control", ComponentState::Running)
            .await;
    }

    #[cfg(feature = "http_api")]
    async fn start_api_server(&mut self) {
        use crate::api::ApiServer;

        self.set_component_state("api", ComponentState::Starting)
            .await;

        let server = ApiServer::new(
            self.config.api.clone(),
            self.handle.clone(),
            self.event_bus.clone(),
        );
        let token = self.cancellation_token.child_token();
        let bus = self.event_bus.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = server.serve(token).await {
                error!("API server error: {}", e);
                let _ = bus.publish(MoodcamEvent::SystemError {
                    component: "api".to_string(),
                    error: e.to_string(),
                });
            }
        });

        self.background_tasks.push(("api", task));
        self.set_component_state("api", ComponentState::Running)
            .await;
        info!(
            "API server started on {}:{}",
            self.config.api.ip, self.config.api.port
        );
    }
}
