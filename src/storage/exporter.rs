// src/storage/exporter.rs

//! Crash-safe, resumable dataset exporter.
//!
//! A small marker file (`session.json`) names the active export location. On
//! construction the exporter resumes the marked session when its dataset file
//! still exists and is non-empty; otherwise it creates a new timestamped
//! output directory, writes the fixed schema header, and persists a fresh
//! marker. Every appended row is flushed and fsynced before `add_record`
//! returns, so a row that was handed back to the caller survives a crash.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::mapping::{self, ExportRow};

/// File name of the session marker inside the data directory.
pub const SESSION_MARKER_FILE: &str = "session.json";

/// File name of the dataset inside a session's output directory.
pub const DATASET_FILE: &str = "projects.csv";

/// Durable pointer to the active export location.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMarker {
    output_dir: PathBuf,
    dataset_file: PathBuf,
    started_at: DateTime<Utc>,
}

/// Append-only CSV exporter bound to one session.
pub struct SessionExporter {
    dataset_path: PathBuf,
    file: File,
    rows_exported: u64,
    started_at: DateTime<Utc>,
    resumed: bool,
}

impl SessionExporter {
    /// Discover or create the active session under `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        if let Some(marker) = Self::read_marker(data_dir).await? {
            match Self::resume(&marker).await? {
                Some(exporter) => {
                    log::info!(
                        "Resuming session started {} with {} exported rows at {}",
                        marker.started_at,
                        exporter.rows_exported,
                        exporter.dataset_path.display()
                    );
                    return Ok(exporter);
                }
                None => {
                    log::warn!(
                        "Session marker points at a missing or empty dataset ({}); starting fresh",
                        marker.dataset_file.display()
                    );
                }
            }
        }

        Self::create(data_dir).await
    }

    /// Invalidate the marker so the next construction starts a fresh session.
    ///
    /// Does not touch any currently open dataset file.
    pub async fn start_new_session(data_dir: &Path) -> Result<()> {
        let marker_path = data_dir.join(SESSION_MARKER_FILE);
        match tokio::fs::remove_file(&marker_path).await {
            Ok(()) => {
                log::info!("Session marker cleared; next run starts a new session");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Append one row, then flush and sync before returning.
    pub async fn add_record(&mut self, row: &ExportRow) -> Result<()> {
        let mut line = row.to_csv_line();
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::export(self.dataset_path.display().to_string(), e))?;
        self.file.flush().await?;
        self.file.sync_all().await?;

        self.rows_exported += 1;
        Ok(())
    }

    /// Path of the dataset file this exporter appends to.
    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    /// Data rows written or found in the session so far (header excluded).
    pub fn rows_exported(&self) -> u64 {
        self.rows_exported
    }

    /// Whether this exporter picked up an earlier session.
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    async fn read_marker(data_dir: &Path) -> Result<Option<SessionMarker>> {
        let path = data_dir.join(SESSION_MARKER_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Reopen the marked dataset in append mode. Returns `None` when the file
    /// is gone or empty (nothing worth resuming).
    async fn resume(marker: &SessionMarker) -> Result<Option<SessionExporter>> {
        let content = match tokio::fs::read_to_string(&marker.dataset_file).await {
            Ok(content) if !content.is_empty() => content,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Io(e)),
        };

        // A crash mid-append can leave a torn final line; only bytes up to
        // the last newline are a complete row. A file without any newline has
        // not even a full header and is not worth resuming.
        let valid_len = match content.rfind('\n') {
            Some(idx) => idx + 1,
            None => return Ok(None),
        };

        // Row count is derived from the file, not stored separately.
        let rows_exported = content[..valid_len].lines().count().saturating_sub(1) as u64;

        let file = OpenOptions::new()
            .append(true)
            .open(&marker.dataset_file)
            .await?;
        if valid_len < content.len() {
            log::warn!(
                "Dropping torn final line in {} ({} bytes)",
                marker.dataset_file.display(),
                content.len() - valid_len
            );
            file.set_len(valid_len as u64).await?;
        }

        Ok(Some(SessionExporter {
            dataset_path: marker.dataset_file.clone(),
            file,
            rows_exported,
            started_at: marker.started_at,
            resumed: true,
        }))
    }

    async fn create(data_dir: &Path) -> Result<Self> {
        let started_at = Utc::now();
        let stamp = started_at.format("%Y-%m-%d_%H-%M-%S").to_string();

        // Suffix on collision so two sessions within a second stay apart.
        let base = data_dir.join("output");
        let mut output_dir = base.join(&stamp);
        let mut attempt = 1;
        while tokio::fs::try_exists(&output_dir).await? {
            output_dir = base.join(format!("{stamp}-{attempt}"));
            attempt += 1;
        }
        tokio::fs::create_dir_all(&output_dir).await?;

        let dataset_path = output_dir.join(DATASET_FILE);
        let mut file = File::create(&dataset_path).await?;
        file.write_all(mapping::header_line().as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_all().await?;

        let marker = SessionMarker {
            output_dir: output_dir.clone(),
            dataset_file: dataset_path.clone(),
            started_at,
        };
        Self::write_marker(data_dir, &marker).await?;

        log::info!("Started new session at {}", dataset_path.display());

        Ok(SessionExporter {
            dataset_path,
            file,
            rows_exported: 0,
            started_at,
            resumed: false,
        })
    }

    /// Write the marker atomically: temp file, fsync, rename.
    async fn write_marker(data_dir: &Path, marker: &SessionMarker) -> Result<()> {
        tokio::fs::create_dir_all(data_dir).await?;

        let path = data_dir.join(SESSION_MARKER_FILE);
        let bytes = serde_json::to_vec_pretty(marker)?;
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{EXPORT_HEADER, map_record};
    use crate::models::ProjectDetails;
    use tempfile::TempDir;

    fn sample_row() -> ExportRow {
        let mut details = ProjectDetails::default();
        details.project.id = "p-1".into();
        details.project.name = "Test Project".into();
        map_record(&details)
    }

    async fn dataset_lines(exporter: &SessionExporter) -> Vec<String> {
        tokio::fs::read_to_string(exporter.dataset_path())
            .await
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_new_session_writes_header_and_marker() {
        let tmp = TempDir::new().unwrap();
        let exporter = SessionExporter::open(tmp.path()).await.unwrap();

        assert!(!exporter.resumed());
        assert_eq!(exporter.rows_exported(), 0);

        let lines = dataset_lines(&exporter).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], EXPORT_HEADER.join(","));

        assert!(tmp.path().join(SESSION_MARKER_FILE).exists());
    }

    #[tokio::test]
    async fn test_add_record_appends_one_row() {
        let tmp = TempDir::new().unwrap();
        let mut exporter = SessionExporter::open(tmp.path()).await.unwrap();

        exporter.add_record(&sample_row()).await.unwrap();
        exporter.add_record(&sample_row()).await.unwrap();

        assert_eq!(exporter.rows_exported(), 2);
        let lines = dataset_lines(&exporter).await;
        assert_eq!(lines.len(), 3); // header + 2 rows
    }

    #[tokio::test]
    async fn test_reopen_resumes_without_rewriting_header() {
        let tmp = TempDir::new().unwrap();

        let first_path = {
            let mut exporter = SessionExporter::open(tmp.path()).await.unwrap();
            exporter.add_record(&sample_row()).await.unwrap();
            exporter.dataset_path().to_path_buf()
        };

        let mut exporter = SessionExporter::open(tmp.path()).await.unwrap();
        assert!(exporter.resumed());
        assert_eq!(exporter.dataset_path(), first_path.as_path());
        assert_eq!(exporter.rows_exported(), 1);

        // Row K+1 lands after the existing rows; rows 1..K untouched.
        exporter.add_record(&sample_row()).await.unwrap();
        let lines = dataset_lines(&exporter).await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], EXPORT_HEADER.join(","));
        assert_eq!(lines[1], lines[2]);
    }

    #[tokio::test]
    async fn test_resume_truncates_torn_final_line() {
        let tmp = TempDir::new().unwrap();

        let first_path = {
            let mut exporter = SessionExporter::open(tmp.path()).await.unwrap();
            exporter.add_record(&sample_row()).await.unwrap();
            exporter.dataset_path().to_path_buf()
        };

        // A crash mid-append leaves a final line without a newline.
        let mut torn = tokio::fs::read_to_string(&first_path).await.unwrap();
        torn.push_str("p-2,half-written");
        tokio::fs::write(&first_path, &torn).await.unwrap();

        let mut exporter = SessionExporter::open(tmp.path()).await.unwrap();
        assert!(exporter.resumed());
        assert_eq!(exporter.rows_exported(), 1);

        // The fragment is gone and the next row starts on its own line.
        exporter.add_record(&sample_row()).await.unwrap();
        let lines = dataset_lines(&exporter).await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], EXPORT_HEADER.join(","));
        assert_eq!(lines[1], lines[2]);
        assert!(!lines.iter().any(|l| l.contains("half-written")));
    }

    #[tokio::test]
    async fn test_marker_with_missing_dataset_starts_fresh() {
        let tmp = TempDir::new().unwrap();

        let first_path = {
            let exporter = SessionExporter::open(tmp.path()).await.unwrap();
            exporter.dataset_path().to_path_buf()
        };
        tokio::fs::remove_file(&first_path).await.unwrap();

        let exporter = SessionExporter::open(tmp.path()).await.unwrap();
        assert!(!exporter.resumed());
        assert_ne!(exporter.dataset_path(), first_path.as_path());
    }

    #[tokio::test]
    async fn test_start_new_session_clears_marker_only() {
        let tmp = TempDir::new().unwrap();

        let first_path = {
            let mut exporter = SessionExporter::open(tmp.path()).await.unwrap();
            exporter.add_record(&sample_row()).await.unwrap();
            exporter.dataset_path().to_path_buf()
        };

        SessionExporter::start_new_session(tmp.path()).await.unwrap();
        assert!(!tmp.path().join(SESSION_MARKER_FILE).exists());

        // Old dataset is untouched; the next open creates a different one.
        assert!(first_path.exists());
        let exporter = SessionExporter::open(tmp.path()).await.unwrap();
        assert!(!exporter.resumed());
        assert_ne!(exporter.dataset_path(), first_path.as_path());

        // Clearing an already-cleared marker is a no-op.
        SessionExporter::start_new_session(tmp.path()).await.unwrap();
    }
}
