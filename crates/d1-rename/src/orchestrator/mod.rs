//! Rename orchestrator - copy, verify, then delete.
//!
//! The platform has no native rename, so a rename runs as a saga:
//!
//! 1. Create the target database under the requested name
//! 2. Export the source and download the dump
//! 3. Sanitize the dump
//! 4. Import the dump into the target
//! 5. Verify source and target are equivalent (with retries)
//! 6. Delete the source
//!
//! A failure anywhere up to and including step 5 deletes the target before
//! the error is returned. A failure in step 6 still counts as a successful
//! rename and is reported as a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capability::SchemaCapabilityChecker;
use crate::compensation::{CompensationHandler, CompensationOutcome};
use crate::config::RenameConfig;
use crate::error::{RenameError, Result};
use crate::export::ExportJobPoller;
use crate::import::ImportJobDriver;
use crate::platform::{DatabaseInfo, DatabasePlatform};
use crate::protected::{ProtectedNameRegistry, StaticProtectedNames};
use crate::sanitize::sanitize_with_report;
use crate::state::{
    job_state_to_str, FileJobTracker, JobState, JobTracker, MigrationJob, NoOpJobTracker,
};
use crate::verify::{verify_with_retry, IntegrityVerifier};

/// Longest accepted database name.
pub const MAX_NAME_LEN: usize = 64;

/// Check that `name` can be used as a database name.
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RenameError::InvalidName("name is empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RenameError::InvalidName(format!(
            "{} is longer than {} characters",
            name, MAX_NAME_LEN
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(RenameError::InvalidName(format!(
            "{} contains invalid character {:?}",
            name, c
        )));
    }
    Ok(())
}

/// Result of a successful rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameResult {
    /// Job identifier.
    pub job_id: String,

    /// Original database, deleted unless `completed_with_warning`.
    pub source_id: String,

    /// Verified copy now carrying the requested name.
    pub target_id: String,

    /// New database name.
    pub name: String,

    /// True when the source could not be deleted.
    pub completed_with_warning: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub export_attempts: u32,
    pub import_attempts: u32,
    pub verification_attempts: u32,
}

impl RenameResult {
    fn from_job(job: &MigrationJob, target_id: String, warning: Option<String>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            source_id: job.source_database_id.clone(),
            target_id,
            name: job.requested_name.clone(),
            completed_with_warning: warning.is_some(),
            warning,
            started_at: job.started_at,
            completed_at: job.completed_at.unwrap_or_else(Utc::now),
            duration_seconds: job.duration_seconds(),
            export_attempts: job.export_attempts,
            import_attempts: job.import_attempts,
            verification_attempts: job.verification_attempts,
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Rename saga coordinator.
pub struct MigrationOrchestrator {
    platform: Arc<dyn DatabasePlatform>,
    config: RenameConfig,
    tracker: Arc<dyn JobTracker>,
    protected: Arc<dyn ProtectedNameRegistry>,
    cancel: CancellationToken,
}

impl MigrationOrchestrator {
    /// Create an orchestrator. Jobs are snapshotted to `config.state_dir`
    /// when set.
    pub fn new(platform: Arc<dyn DatabasePlatform>, config: RenameConfig) -> Self {
        let tracker: Arc<dyn JobTracker> = match &config.state_dir {
            Some(dir) => Arc::new(FileJobTracker::new(dir)),
            None => Arc::new(NoOpJobTracker::new()),
        };
        let protected = Arc::new(StaticProtectedNames::new(&config.protected_databases));

        Self {
            platform,
            config,
            tracker,
            protected,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the job tracker.
    pub fn with_tracker(mut self, tracker: Arc<dyn JobTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Replace the protected-name registry.
    pub fn with_protected_names(mut self, protected: Arc<dyn ProtectedNameRegistry>) -> Self {
        self.protected = protected;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels in-flight sagas.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Rename `source_id` to `new_name`.
    pub async fn rename(&self, source_id: &str, new_name: &str) -> Result<RenameResult> {
        let mut job = MigrationJob::new(source_id, new_name);
        info!(
            "Starting rename job {}: {} -> {} (platform: {}, tracker: {})",
            job.job_id,
            source_id,
            new_name,
            self.platform.platform_name(),
            self.tracker.tracker_type()
        );

        if let Err(e) = self.check_preconditions(&mut job).await {
            warn!("Rename of {} rejected: {}", source_id, e);
            job.mark_failed(&e.to_string());
            return Err(e);
        }
        self.track(&job, TrackEvent::Start).await;

        if let Err(e) = self.copy_and_verify(&mut job).await {
            return Err(self.fail(&mut job, e).await);
        }

        // The copy is verified from here on and is never rolled back.
        let target_id = job.target_database_id.clone().unwrap_or_default();
        self.enter(&mut job, JobState::DeletingSource).await;
        let warning = match self.platform.delete_database(source_id).await {
            Ok(()) => None,
            Err(e) => {
                let warning = RenameError::SourceDeletionFailure(e.to_string()).to_string();
                warn!(
                    "Rename of {} completed with warning, both databases exist: {}",
                    source_id, warning
                );
                Some(warning)
            }
        };

        job.mark_completed(warning.as_deref());
        self.track(&job, TrackEvent::Finish).await;

        let result = RenameResult::from_job(&job, target_id, warning);
        info!(
            "Rename job {} completed: {} is now {} ({}) in {:.2}s",
            job.job_id, source_id, result.name, result.target_id, result.duration_seconds
        );
        Ok(result)
    }

    /// Run every check that must pass before anything is created.
    async fn check_preconditions(&self, job: &mut MigrationJob) -> Result<DatabaseInfo> {
        let source = self.platform.get_database(&job.source_database_id).await?;
        job.source_name = Some(source.name.clone());

        if self.protected.is_protected(&source.id) || self.protected.is_protected(&source.name) {
            return Err(RenameError::ProtectedDatabase(source.name));
        }
        if self.protected.is_protected(&job.requested_name) {
            return Err(RenameError::ProtectedDatabase(job.requested_name.clone()));
        }
        validate_database_name(&job.requested_name)?;

        job.transition(JobState::CheckingCapability);
        SchemaCapabilityChecker::new(self.platform.clone())
            .ensure_supported(&source.id)
            .await?;

        job.transition(JobState::CreatingTarget);
        if let Some(existing) = self
            .platform
            .find_database_by_name(&job.requested_name)
            .await?
        {
            info!(
                "Name {} is already used by database {}",
                existing.name, existing.id
            );
            return Err(RenameError::NameConflict(job.requested_name.clone()));
        }

        Ok(source)
    }

    /// Steps whose failure rolls back the target.
    async fn copy_and_verify(&self, job: &mut MigrationJob) -> Result<()> {
        self.ensure_not_cancelled(job)?;
        let target = self
            .platform
            .create_database(&job.requested_name)
            .await
            .map_err(|e| RenameError::TargetCreationFailure(e.to_string()))?;
        info!("Created target database {} ({})", target.name, target.id);
        job.target_database_id = Some(target.id.clone());
        self.track(job, TrackEvent::Progress).await;

        self.enter(job, JobState::ExportingSource).await;
        self.ensure_not_cancelled(job)?;
        let artifact = ExportJobPoller::new(
            self.platform.clone(),
            self.config.export,
            self.cancel.clone(),
        )
        .export(job)
        .await?;

        self.enter(job, JobState::Sanitizing).await;
        self.ensure_not_cancelled(job)?;
        let report = sanitize_with_report(&artifact.sql);
        drop(artifact);
        info!("Sanitized dump: removed {} statement(s)", report.removed);

        self.enter(job, JobState::ImportingTarget).await;
        self.ensure_not_cancelled(job)?;
        ImportJobDriver::new(
            self.platform.clone(),
            self.config.import,
            self.cancel.clone(),
        )
        .import(job, &report.sql)
        .await?;

        self.enter(job, JobState::Verifying).await;
        let verifier = IntegrityVerifier::new(
            self.platform.clone(),
            self.config.system_table_prefixes.clone(),
        );
        let source = job.source_database_id.clone();
        let result = verify_with_retry(
            &verifier,
            &mut job.verification_attempts,
            &source,
            &target.id,
            &self.config.verification,
            &self.cancel,
        )
        .await;
        if let Err(RenameError::VerificationFailure { issues }) = &result {
            for issue in issues {
                job.record_issue(issue.clone());
            }
        }
        result.map(|_| ())
    }

    /// Roll back and record a failure, handing the original error back.
    async fn fail(&self, job: &mut MigrationJob, e: RenameError) -> RenameError {
        error!(
            "Rename job {} failed during {}: {}",
            job.job_id,
            job_state_to_str(job.state),
            e
        );

        let outcome = CompensationHandler::new(self.platform.clone())
            .rollback(job.target_database_id.as_deref())
            .await;
        if let CompensationOutcome::Failed(reason) = outcome {
            job.record_issue(format!(
                "rollback of target {} failed: {}",
                job.target_database_id.as_deref().unwrap_or_default(),
                reason
            ));
        }

        job.mark_failed(&e.to_string());
        self.track(job, TrackEvent::Finish).await;
        e
    }

    fn ensure_not_cancelled(&self, job: &MigrationJob) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RenameError::cancelled(job_state_to_str(job.state)));
        }
        Ok(())
    }

    async fn enter(&self, job: &mut MigrationJob, state: JobState) {
        info!("Job {}: {}", job.job_id, job_state_to_str(state));
        job.transition(state);
        self.track(job, TrackEvent::Progress).await;
    }

    async fn track(&self, job: &MigrationJob, event: TrackEvent) {
        let result = match event {
            TrackEvent::Start => self.tracker.record_start(job).await,
            TrackEvent::Progress => self.tracker.record_progress(job).await,
            TrackEvent::Finish => self.tracker.record_finish(job).await,
        };
        if let Err(e) = result {
            warn!(
                "Job tracker ({}) failed for job {}: {}",
                self.tracker.tracker_type(),
                job.job_id,
                e
            );
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TrackEvent {
    Start,
    Progress,
    Finish,
}
