use super::{normalize_scores, EmotionClassifier};
use crate::emotion::EmotionVector;
use crate::error::ClassificationError;
use crate::frame::FrameData;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs an external program per face: PNG on stdin, JSON scores on stdout
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    fn spawn(&self) -> Result<Child, ClassificationError> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ClassificationError::Failed {
                details: format!("failed to start '{}': {}", self.program, e),
            })
    }
}

impl EmotionClassifier for CommandClassifier {
    fn classify(&self, face: &FrameData) -> Result<EmotionVector, ClassificationError> {
        let png = face.encode_png().map_err(|e| ClassificationError::Failed {
            details: e.to_string(),
        })?;

        let mut child = self.spawn()?;

        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                // A classifier that exits early closes the pipe; its exit status tells the story
                let _ = stdin.write_all(&png);
            })
        });
        let stdout_reader = child.stdout.take().map(|stdout| thread::spawn(move || read_all(stdout)));
        let stderr_reader = child.stderr.take().map(|stderr| thread::spawn(move || read_all(stderr)));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!("Classifier '{}' timed out, killed", self.program);
                    return Err(ClassificationError::Timeout {
                        millis: self.timeout.as_millis() as u64,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(ClassificationError::Failed {
                        details: format!("failed to wait for '{}': {}", self.program, e),
                    });
                }
            }
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let stdout = stdout_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(ClassificationError::Failed {
                details: format!(
                    "'{}' exited with {}: {}",
                    self.program,
                    status,
                    String::from_utf8_lossy(&stderr).trim()
                ),
            });
        }

        let value: serde_json::Value =
            serde_json::from_slice(&stdout).map_err(|e| ClassificationError::InvalidOutput {
                details: format!("classifier output is not JSON: {}", e),
            })?;

        let vector = normalize_scores(&value)?;
        debug!(
            "Classifier scored frame {}: {}",
            face.id,
            vector.dominant().0
        );
        Ok(vector)
    }
}

fn read_all<R: Read>(mut source: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = source.read_to_end(&mut buf);
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::emotion::Emotion;
    use std::time::SystemTime;

    fn face() -> FrameData {
        FrameData::new(3, SystemTime::now(), vec![200u8; 8 * 8 * 3], 8, 8)
    }

    fn shell(script: &str, timeout_ms: u64) -> CommandClassifier {
        CommandClassifier::new(
            "sh".to_string(),
            vec!["-c".to_string(), script.to_string()],
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_reads_scores_from_stdout() {
        let classifier = shell(
            r#"cat > /dev/null; echo '{"happy": 0.7, "neutral": 0.2}'"#,
            5000,
        );
        let vector = classifier.classify(&face()).unwrap();
        assert_eq!(vector.get(Emotion::Happy), 0.7);
        assert_eq!(vector.dominant().0, Emotion::Happy);
    }

    #[test]
    fn test_receives_png_on_stdin() {
        // Echo back the PNG signature bytes as a score to prove the image arrived
        let classifier = shell(
            r#"sig=$(head -c 4 | tail -c 3); cat > /dev/null; if [ "$sig" = "PNG" ]; then echo '{"sad": 1}'; else echo '{}'; fi"#,
            5000,
        );
        let vector = classifier.classify(&face()).unwrap();
        assert_eq!(vector.dominant().0, Emotion::Sad);
    }

    #[test]
    fn test_non_zero_exit_is_failure() {
        let classifier = shell("cat > /dev/null; echo boom >&2; exit 3", 5000);
        match classifier.classify(&face()) {
            Err(ClassificationError::Failed { details }) => assert!(details.contains("boom")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_output_is_invalid() {
        let classifier = shell("cat > /dev/null; echo not json", 5000);
        assert!(matches!(
            classifier.classify(&face()),
            Err(ClassificationError::InvalidOutput { .. })
        ));
    }

    #[test]
    fn test_slow_classifier_times_out() {
        let classifier = shell("sleep 5", 100);
        let started = Instant::now();
        assert!(matches!(
            classifier.classify(&face()),
            Err(ClassificationError::Timeout { millis: 100 })
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program_is_failure() {
        let classifier = CommandClassifier::new(
            "/nonexistent/classifier".to_string(),
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            classifier.classify(&face()),
            Err(ClassificationError::Failed { .. })
        ));
    }
}
