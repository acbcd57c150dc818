use crate::app::MonitorHandle;
use crate::error::Result;
use crate::events::{EventBus, MoodcamEvent};
use crate::statistics::Statistics;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    ToggleSampling,
    PrintStatistics,
    Quit,
}

impl KeyCommand {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') | KeyCode::Char('S') => Some(Self::ToggleSampling),
            KeyCode::Char('p') | KeyCode::Char('P') => Some(Self::PrintStatistics),
            KeyCode::Char('q') | KeyCode::Esc => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Terminal keyboard control for sampling
pub struct KeyboardInputHandler {
    event_bus: EventBus,
    handle: MonitorHandle,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: EventBus, handle: MonitorHandle) -> Self {
        Self {
            event_bus,
            handle,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input handler");

        let event_bus = self.event_bus.clone();
        let handle = self.handle.clone();
        let cancellation_token = self.cancellation_token.clone();

        // Spawn a blocking task to handle keyboard input
        task::spawn_blocking(move || {
            // Enable raw mode to capture individual key presses
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        // Only handle key press events (not release)
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match KeyCommand::from_key(key_event.code) {
                            Some(command) => {
                                if dispatch(command, &event_bus, &handle) {
                                    break;
                                }
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Ensure raw mode is disabled even if the task didn't clean up properly
        let _ = disable_raw_mode();

        Ok(())
    }
}

/// Act on a command. Returns true when the handler should exit.
fn dispatch(command: KeyCommand, event_bus: &EventBus, handle: &MonitorHandle) -> bool {
    match command {
        KeyCommand::ToggleSampling => {
            info!("Toggle key pressed");
            if let Err(e) = event_bus.publish(MoodcamEvent::SamplingToggleRequested) {
                warn!("Failed to publish toggle request: {}", e);
            }
            false
        }
        KeyCommand::PrintStatistics => {
            match handle.latest_statistics() {
                Some(stats) => info!("{}", summary_line(&stats)),
                None => info!("No samples recorded yet"),
            }
            false
        }
        KeyCommand::Quit => {
            info!("Quit key pressed - requesting shutdown");
            if let Err(e) = event_bus.publish(MoodcamEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "User requested via keyboard".to_string(),
            }) {
                warn!("Failed to publish shutdown event: {}", e);
            }
            true
        }
    }
}

/// One-line statistics summary for the log
pub fn summary_line(stats: &Statistics) -> String {
    let most_frequent = stats
        .most_frequent()
        .map(|emotion| emotion.as_str())
        .unwrap_or("none");
    let averages = stats
        .avg_emotions
        .iter()
        .map(|(emotion, value)| format!("{}={:.2}", emotion, value))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{} samples over {:.1} min, mostly {} [{}]",
        stats.total_count,
        stats.session_minutes(),
        most_frequent,
        averages
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{Emotion, EmotionSample, EmotionVector};
    use crate::statistics;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    #[test]
    fn test_key_bindings() {
        assert_eq!(
            KeyCommand::from_key(KeyCode::Char('s')),
            Some(KeyCommand::ToggleSampling)
        );
        assert_eq!(
            KeyCommand::from_key(KeyCode::Char('p')),
            Some(KeyCommand::PrintStatistics)
        );
        assert_eq!(KeyCommand::from_key(KeyCode::Esc), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_key(KeyCode::Char('q')), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_key(KeyCode::Char(' ')), None);
    }

    #[test]
    fn test_summary_line() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let window = vec![
            EmotionSample::new(t0, EmotionVector::from_pairs([(Emotion::Happy, 1.0)])),
            EmotionSample::new(
                t0 + ChronoDuration::seconds(90),
                EmotionVector::from_pairs([(Emotion::Happy, 0.5)]),
            ),
        ];
        let stats = statistics::compute(&window).unwrap();

        let line = summary_line(&stats);
        assert!(line.starts_with("2 samples over 1.5 min, mostly happy"));
        assert!(line.contains("happy=0.75"));
        assert!(line.contains("neutral=0.00"));
    }
}
