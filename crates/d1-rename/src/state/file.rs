//! JSON file job tracker.
//!
//! Each job is written to `<dir>/<job_id>.json` after every state change,
//! replacing the previous snapshot atomically.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{RenameError, Result};
use crate::state::tracker::JobTracker;
use crate::state::MigrationJob;

/// Tracker that keeps one JSON snapshot per job in a directory.
#[derive(Debug, Clone)]
pub struct FileJobTracker {
    dir: PathBuf,
}

impl FileJobTracker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of a job's snapshot.
    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", job_id))
    }

    /// Read back the latest snapshot of a job.
    pub async fn load(&self, job_id: &str) -> Result<MigrationJob> {
        let content = tokio::fs::read_to_string(self.path_for(job_id)).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, job: &MigrationJob) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let content = serde_json::to_string_pretty(job)
            .map_err(|e| RenameError::Config(format!("Failed to serialize job: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let path = self.path_for(&job.job_id);
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Saved job {} to {}", job.job_id, path.display());
        Ok(())
    }
}

#[async_trait]
impl JobTracker for FileJobTracker {
    async fn record_start(&self, job: &MigrationJob) -> Result<()> {
        self.save(job).await
    }

    async fn record_progress(&self, job: &MigrationJob) -> Result<()> {
        self.save(job).await
    }

    async fn record_finish(&self, job: &MigrationJob) -> Result<()> {
        self.save(job).await
    }

    fn tracker_type(&self) -> &'static str {
        "file"
    }
}
