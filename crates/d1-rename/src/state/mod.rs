//! Rename job state.
//!
//! A [`MigrationJob`] is the orchestrator's unit of work. It carries every
//! piece of mutable saga state (bookmarks, attempt counters, issues), so
//! nothing lives in globals and sagas on different databases never share
//! anything.

mod file;
mod noop;
mod tracker;

pub use file::FileJobTracker;
pub use noop::NoOpJobTracker;
pub use tracker::{job_state_to_str, str_to_job_state, JobTracker};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Point in the rename state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    ValidatingName,
    CheckingCapability,
    CreatingTarget,
    ExportingSource,
    Sanitizing,
    ImportingTarget,
    Verifying,
    DeletingSource,
    Completed,
    CompletedWithWarning,
    Failed,
}

impl JobState {
    /// Whether the job has finished.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::CompletedWithWarning | JobState::Failed
        )
    }
}

/// One rename saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationJob {
    /// Unique job identifier.
    pub job_id: String,

    /// Database being renamed.
    pub source_database_id: String,

    /// Name of the source, once resolved.
    #[serde(default)]
    pub source_name: Option<String>,

    /// Copy created by the saga, once it exists.
    #[serde(default)]
    pub target_database_id: Option<String>,

    /// Name the caller asked for.
    pub requested_name: String,

    /// Current state.
    pub state: JobState,

    /// Last export continuation token.
    #[serde(default)]
    pub export_bookmark: Option<String>,

    /// Last import continuation token.
    #[serde(default)]
    pub import_bookmark: Option<String>,

    pub export_attempts: u32,
    pub import_attempts: u32,
    pub verification_attempts: u32,

    /// Problems found along the way, oldest first.
    #[serde(default)]
    pub issues: Vec<String>,

    /// Error that failed the job.
    #[serde(default)]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// When the job reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationJob {
    /// Create a job for a rename request.
    pub fn new(source_database_id: impl Into<String>, requested_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            source_database_id: source_database_id.into(),
            source_name: None,
            target_database_id: None,
            requested_name: requested_name.into(),
            state: JobState::ValidatingName,
            export_bookmark: None,
            import_bookmark: None,
            export_attempts: 0,
            import_attempts: 0,
            verification_attempts: 0,
            issues: Vec::new(),
            error: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move to the next state.
    pub fn transition(&mut self, state: JobState) {
        debug!(
            "job {}: {} -> {}",
            self.job_id,
            job_state_to_str(self.state),
            job_state_to_str(state)
        );
        self.state = state;
        self.updated_at = Utc::now();
        if state.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
    }

    /// Append a problem description.
    pub fn record_issue(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
        self.updated_at = Utc::now();
    }

    /// Mark the job as failed.
    pub fn mark_failed(&mut self, error: &str) {
        self.error = Some(error.to_string());
        self.transition(JobState::Failed);
    }

    /// Mark the job as completed, with a warning if the source survived.
    pub fn mark_completed(&mut self, warning: Option<&str>) {
        match warning {
            Some(warning) => {
                self.record_issue(warning);
                self.transition(JobState::CompletedWithWarning);
            }
            None => self.transition(JobState::Completed),
        }
    }

    /// Seconds between start and completion (or now).
    pub fn duration_seconds(&self) -> f64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
