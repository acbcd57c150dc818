use super::codec::{encode_row, header_line, ColumnMap};
use crate::emotion::EmotionSample;
use crate::error::StorageError;
use chrono::Utc;
use serde::Serialize;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Upper bound on how much of an existing log is read to find its header
const HEADER_SCAN_BYTES: u64 = 4096;

/// Append-only CSV log of emotion samples
pub struct RecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    stats: RecordStoreStats,
}

#[derive(Debug, Default)]
struct RecordStoreStats {
    appends: AtomicU64,
    rows_written: AtomicU64,
    failed_appends: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordStoreStatsSnapshot {
    pub appends: u64,
    pub rows_written: u64,
    pub failed_appends: u64,
}

/// Everything `load` recovered from the log
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub samples: Vec<EmotionSample>,
    /// Data rows that could not be parsed and were left out
    pub skipped_rows: usize,
}

impl RecordStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            stats: RecordStoreStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append `samples` in order.
    ///
    /// The file and its header are created on first use. Appends from
    /// concurrent callers are serialized, so rows of different batches never
    /// interleave. An existing log without a readable header is moved to
    /// `<name>.corrupt-<timestamp>` and a fresh log is started. On error no
    /// row already in the log is touched.
    pub async fn append(&self, samples: &[EmotionSample]) -> Result<(), StorageError> {
        if samples.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        self.stats.appends.fetch_add(1, Ordering::Relaxed);

        match self.write_rows(samples).await {
            Ok(()) => {
                self.stats
                    .rows_written
                    .fetch_add(samples.len() as u64, Ordering::Relaxed);
                debug!(
                    "Appended {} samples to {}",
                    samples.len(),
                    self.path.display()
                );
                Ok(())
            }
            Err(e) => {
                self.stats.failed_appends.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn write_rows(&self, samples: &[EmotionSample]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.write_error(e))?;
            }
        }

        let mut file = self.open_for_append().await?;
        let mut existing_len = file
            .metadata()
            .await
            .map_err(|e| self.write_error(e))?
            .len();

        // Rows are only ever written under a header the reader accepts.
        if existing_len > 0 && !self.has_valid_header(&mut file).await? {
            drop(file);
            self.set_aside().await?;
            file = self.open_for_append().await?;
            existing_len = 0;
        }

        let mut text = String::with_capacity(samples.len() * 96 + 96);
        if existing_len == 0 {
            text.push_str(&header_line());
            info!("Creating emotion log at {}", self.path.display());
        } else {
            // A crash mid-row leaves the log without a trailing newline.
            // Terminate the torn row so it is skipped rather than merged.
            file.seek(SeekFrom::Start(existing_len - 1))
                .await
                .map_err(|e| self.write_error(e))?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last)
                .await
                .map_err(|e| self.write_error(e))?;
            if last[0] != b'\n' {
                warn!(
                    "Emotion log {} ends in a partial row, terminating it",
                    self.path.display()
                );
                text.push('\n');
            }
        }

        for sample in samples {
            encode_row(sample, &mut text);
        }

        file.write_all(text.as_bytes())
            .await
            .map_err(|e| self.write_error(e))?;
        file.flush().await.map_err(|e| self.write_error(e))?;
        file.sync_data().await.map_err(|e| self.write_error(e))?;

        Ok(())
    }

    async fn open_for_append(&self) -> Result<tokio::fs::File, StorageError> {
        OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.write_error(e))
    }

    /// Whether the first non-blank line of the log is a usable header
    async fn has_valid_header(&self, file: &mut tokio::fs::File) -> Result<bool, StorageError> {
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| self.write_error(e))?;
        let mut head = Vec::with_capacity(256);
        AsyncReadExt::take(&mut *file, HEADER_SCAN_BYTES)
            .read_to_end(&mut head)
            .await
            .map_err(|e| self.write_error(e))?;

        let text = String::from_utf8_lossy(&head);
        let header = text.split('\n').find(|line| !line.trim().is_empty());
        Ok(match header {
            Some(line) => match ColumnMap::from_header(line) {
                Ok(_) => true,
                Err(details) => {
                    warn!(
                        "Emotion log {} has an unusable header: {}",
                        self.path.display(),
                        details
                    );
                    false
                }
            },
            None => {
                warn!("Emotion log {} holds no header", self.path.display());
                false
            }
        })
    }

    /// Move an unreadable log out of the way so new rows start a fresh file
    async fn set_aside(&self) -> Result<PathBuf, StorageError> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "emotions.csv".to_string());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let target = self
            .path
            .with_file_name(format!("{}.corrupt-{}", file_name, stamp));

        tokio::fs::rename(&self.path, &target)
            .await
            .map_err(|e| self.write_error(e))?;
        warn!(
            "Moved unreadable emotion log {} to {}",
            self.path.display(),
            target.display()
        );
        Ok(target)
    }

    /// Every valid sample in file order. A missing log is an empty history.
    pub async fn load_all(&self) -> Result<Vec<EmotionSample>, StorageError> {
        Ok(self.load_report().await?.samples)
    }

    /// The last `count` valid samples in file order
    pub async fn load_recent(&self, count: usize) -> Result<Vec<EmotionSample>, StorageError> {
        let mut samples = self.load_all().await?;
        let skip = samples.len().saturating_sub(count);
        samples.drain(..skip);
        Ok(samples)
    }

    /// Load the log, also reporting how many rows were unreadable
    pub async fn load_report(&self) -> Result<LoadReport, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No emotion log at {} yet", self.path.display());
                return Ok(LoadReport::default());
            }
            Err(e) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let mut lines = text
            .split('\n')
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let columns = match lines.next() {
            Some((_, header)) => {
                ColumnMap::from_header(header).map_err(|details| StorageError::Schema {
                    path: self.path.clone(),
                    details,
                })?
            }
            None => return Ok(LoadReport::default()),
        };

        let mut report = LoadReport::default();
        for (index, line) in lines {
            match columns.decode_row(line) {
                Ok(sample) => report.samples.push(sample),
                Err(reason) => {
                    report.skipped_rows += 1;
                    warn!(
                        "Skipping row {} of {}: {}",
                        index + 1,
                        self.path.display(),
                        reason
                    );
                }
            }
        }

        debug!(
            "Loaded {} samples from {} ({} skipped)",
            report.samples.len(),
            self.path.display(),
            report.skipped_rows
        );
        Ok(report)
    }

    pub fn stats(&self) -> RecordStoreStatsSnapshot {
        RecordStoreStatsSnapshot {
            appends: self.stats.appends.load(Ordering::Relaxed),
            rows_written: self.stats.rows_written.load(Ordering::Relaxed),
            failed_appends: self.stats.failed_appends.load(Ordering::Relaxed),
        }
    }

    fn write_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Write {
            path: self.path.clone(),
            source,
        }
    }
}
