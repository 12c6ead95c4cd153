//! Export job polling and artifact download.
//!
//! The platform exports asynchronously: starting an export either returns a
//! signed URL right away or a bookmark to poll with. Polling runs at a fixed
//! interval for a bounded number of attempts, and every wait is cancellable.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::{RenameError, Result};
use crate::platform::{DatabasePlatform, ExportStatus};
use crate::poll::wait_interval;
use crate::state::MigrationJob;

/// Outcome of starting an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportHandle {
    /// The dump was ready immediately.
    Ready(String),
    /// Poll with this bookmark.
    Pending(String),
}

/// Downloaded dump, owned by one rename call.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub signed_url: String,
    pub sql: String,
}

/// Drives one database export to a downloaded dump.
pub struct ExportJobPoller {
    platform: Arc<dyn DatabasePlatform>,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl ExportJobPoller {
    pub fn new(
        platform: Arc<dyn DatabasePlatform>,
        policy: PollPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            platform,
            policy,
            cancel,
        }
    }

    /// Start exporting the job's source database.
    pub async fn start_export(&self, job: &mut MigrationJob) -> Result<ExportHandle> {
        let status = self
            .platform
            .start_export(&job.source_database_id)
            .await
            .map_err(export_failure)?;

        match status {
            ExportStatus::Ready { signed_url } => Ok(ExportHandle::Ready(signed_url)),
            ExportStatus::Pending { bookmark } => {
                job.export_bookmark = Some(bookmark.clone());
                Ok(ExportHandle::Pending(bookmark))
            }
            ExportStatus::Failed { error } => Err(RenameError::ExportFailure(error)),
        }
    }

    /// Poll until the export yields a signed URL.
    ///
    /// Each poll counts toward `job.export_attempts`; after `max_attempts`
    /// polls without a URL the export fails with `ExportTimeout`.
    pub async fn poll_until_ready(
        &self,
        handle: ExportHandle,
        job: &mut MigrationJob,
    ) -> Result<String> {
        let mut bookmark = match handle {
            ExportHandle::Ready(url) => return Ok(url),
            ExportHandle::Pending(bookmark) => bookmark,
        };
        debug!(
            "Polling export of {} every {:?}, budget {:?}",
            job.source_database_id,
            self.policy.interval(),
            self.policy.budget()
        );

        for attempt in 1..=self.policy.max_attempts {
            wait_interval(&self.policy, &self.cancel, "export").await?;

            job.export_attempts += 1;
            let status = self
                .platform
                .poll_export(&job.source_database_id, &bookmark)
                .await
                .map_err(export_failure)?;

            match status {
                ExportStatus::Ready { signed_url } => {
                    debug!("Export ready after {} poll(s)", attempt);
                    return Ok(signed_url);
                }
                ExportStatus::Pending { bookmark: next } => {
                    debug!(
                        "Export pending (attempt {}/{})",
                        attempt, self.policy.max_attempts
                    );
                    job.export_bookmark = Some(next.clone());
                    bookmark = next;
                }
                ExportStatus::Failed { error } => {
                    return Err(RenameError::ExportFailure(error));
                }
            }
        }

        warn!(
            "Export of {} still pending after {} polls",
            job.source_database_id, self.policy.max_attempts
        );
        Err(RenameError::ExportTimeout {
            attempts: self.policy.max_attempts,
        })
    }

    /// Fetch the dump behind a signed URL.
    pub async fn download(&self, signed_url: &str) -> Result<ExportArtifact> {
        let payload = self
            .platform
            .download(signed_url)
            .await
            .map_err(|e| RenameError::ExportDownloadFailure(e.to_string()))?;

        if !payload.is_success() {
            return Err(RenameError::ExportDownloadFailure(format!(
                "HTTP {}",
                payload.status
            )));
        }

        Ok(ExportArtifact {
            signed_url: signed_url.to_string(),
            sql: payload.body,
        })
    }

    /// Start, poll and download in one go.
    pub async fn export(&self, job: &mut MigrationJob) -> Result<ExportArtifact> {
        let handle = self.start_export(job).await?;
        let signed_url = self.poll_until_ready(handle, job).await?;
        let artifact = self.download(&signed_url).await?;
        info!(
            "Exported {} ({} bytes, {} poll(s))",
            job.source_database_id,
            artifact.sql.len(),
            job.export_attempts
        );
        Ok(artifact)
    }
}

fn export_failure(e: RenameError) -> RenameError {
    match e {
        RenameError::Platform { .. } | RenameError::Http(_) => {
            RenameError::ExportFailure(e.to_string())
        }
        other => other,
    }
}
