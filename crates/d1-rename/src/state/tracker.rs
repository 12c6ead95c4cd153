//! Job tracker trait for rename observability.
//!
//! The [`JobTracker`] trait defines where the orchestrator reports job
//! progress. Implementations:
//!
//! - **No-op**: `NoOpJobTracker` in `noop.rs` (default)
//! - **File**: JSON snapshots per job in `file.rs`
//!
//! Tracking is fire-and-forget from the orchestrator's point of view: a
//! tracker error is logged and never changes the outcome of a rename.

use async_trait::async_trait;

use super::{JobState, MigrationJob};
use crate::error::{RenameError, Result};

/// Trait for rename job observers.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow sharing across sagas.
#[async_trait]
pub trait JobTracker: Send + Sync {
    /// Called once the request passed its preconditions.
    async fn record_start(&self, job: &MigrationJob) -> Result<()>;

    /// Called after each state transition.
    async fn record_progress(&self, job: &MigrationJob) -> Result<()>;

    /// Called once the job reached a terminal state.
    async fn record_finish(&self, job: &MigrationJob) -> Result<()>;

    /// Get the tracker type name for logging/debugging.
    fn tracker_type(&self) -> &'static str;
}

/// Helper function to convert JobState to string representation.
pub fn job_state_to_str(state: JobState) -> &'static str {
    match state {
        JobState::ValidatingName => "validating_name",
        JobState::CheckingCapability => "checking_capability",
        JobState::CreatingTarget => "creating_target",
        JobState::ExportingSource => "exporting_source",
        JobState::Sanitizing => "sanitizing",
        JobState::ImportingTarget => "importing_target",
        JobState::Verifying => "verifying",
        JobState::DeletingSource => "deleting_source",
        JobState::Completed => "completed",
        JobState::CompletedWithWarning => "completed_with_warning",
        JobState::Failed => "failed",
    }
}

/// Helper function to parse JobState from string.
pub fn str_to_job_state(s: &str) -> Result<JobState> {
    match s {
        "validating_name" => Ok(JobState::ValidatingName),
        "checking_capability" => Ok(JobState::CheckingCapability),
        "creating_target" => Ok(JobState::CreatingTarget),
        "exporting_source" => Ok(JobState::ExportingSource),
        "sanitizing" => Ok(JobState::Sanitizing),
        "importing_target" => Ok(JobState::ImportingTarget),
        "verifying" => Ok(JobState::Verifying),
        "deleting_source" => Ok(JobState::DeletingSource),
        "completed" => Ok(JobState::Completed),
        "completed_with_warning" => Ok(JobState::CompletedWithWarning),
        "failed" => Ok(JobState::Failed),
        _ => Err(RenameError::Config(format!("Invalid job state: {}", s))),
    }
}
