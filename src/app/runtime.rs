use super::{MoodcamOrchestrator, ShutdownReason};
use crate::error::{MoodcamError, Result};
use crate::events::{EventFilter, MoodcamEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

type SharedSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl MoodcamOrchestrator {
    /// Run until a signal or a shutdown request arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Moodcam system is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| MoodcamError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| MoodcamError::system("Shutdown receiver already taken"))?;

        let shutdown_sender: SharedSender = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(Arc::clone(&shutdown_sender));
        self.setup_shutdown_listener(shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| MoodcamError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Moodcam system shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: SharedSender) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if let Some(()) = sigterm.recv().await {
                    info!("Received SIGTERM signal");
                    send_reason(&shutdown_sender_sigterm, ShutdownReason::Signal("SIGTERM".to_string()))
                        .await;
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_reason(&shutdown_sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
    }

    /// Shut down once any component publishes `ShutdownRequested`
    fn setup_shutdown_listener(&self, shutdown_sender: SharedSender) {
        let mut receiver = self.event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "shutdown",
        );

        tokio::spawn(async move {
            if let Ok(MoodcamEvent::ShutdownRequested { reason, .. }) = receiver.recv().await {
                send_reason(&shutdown_sender, ShutdownReason::UserRequest(reason)).await;
            }
        });
    }
}

async fn send_reason(sender: &SharedSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
