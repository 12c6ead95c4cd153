//! No-op job tracker for callers that do not persist jobs.

use async_trait::async_trait;

use crate::error::Result;
use crate::state::tracker::JobTracker;
use crate::state::MigrationJob;

/// Tracker that records nothing.
#[derive(Debug, Default)]
pub struct NoOpJobTracker;

impl NoOpJobTracker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobTracker for NoOpJobTracker {
    async fn record_start(&self, _job: &MigrationJob) -> Result<()> {
        Ok(())
    }

    async fn record_progress(&self, _job: &MigrationJob) -> Result<()> {
        Ok(())
    }

    async fn record_finish(&self, _job: &MigrationJob) -> Result<()> {
        Ok(())
    }

    fn tracker_type(&self) -> &'static str {
        "noop"
    }
}
