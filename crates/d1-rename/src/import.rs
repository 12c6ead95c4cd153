//! Multi-step dump import.
//!
//! Importing goes through four steps: hash the dump, ask the platform for a
//! staging location, upload the dump there, then ask the platform to ingest
//! it and poll until it is done.

use md5::{Digest, Md5};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::{RenameError, Result};
use crate::platform::{DatabasePlatform, ImportStatus};
use crate::poll::wait_interval;
use crate::state::MigrationJob;

/// Reported by the platform once an ingest has already finished.
const NOT_IMPORTING: &str = "not currently importing anything";

/// Result of a completed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub etag: String,
    pub filename: String,
    /// Poll requests made after the ingest was started.
    pub polls: u32,
}

/// Lowercase hex MD5 of the dump text.
pub fn content_etag(sql: &str) -> String {
    hex::encode(Md5::digest(sql.as_bytes()))
}

/// Compare etags ignoring surrounding quotes and case.
fn etag_matches(expected: &str, echoed: &str) -> bool {
    echoed.trim_matches('"').eq_ignore_ascii_case(expected.trim_matches('"'))
}

fn is_finished_message(error: &str) -> bool {
    error.to_lowercase().contains(NOT_IMPORTING)
}

/// Drives one dump into the job's target database.
pub struct ImportJobDriver {
    platform: Arc<dyn DatabasePlatform>,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl ImportJobDriver {
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

    /// Import `sql` into `job.target_database_id`.
    pub async fn import(&self, job: &mut MigrationJob, sql: &str) -> Result<ImportOutcome> {
        let target = job
            .target_database_id
            .clone()
            .ok_or_else(|| RenameError::ImportInitFailure("no target database".to_string()))?;

        let etag = content_etag(sql);
        debug!("Dump etag {} ({} bytes)", etag, sql.len());

        let init = self
            .platform
            .init_import(&target, &etag)
            .await
            .map_err(|e| RenameError::ImportInitFailure(e.to_string()))?;

        let receipt = self
            .platform
            .upload(&init.upload_url, sql)
            .await
            .map_err(|e| RenameError::ImportUploadFailure(e.to_string()))?;
        if !receipt.is_success() {
            return Err(RenameError::ImportUploadFailure(format!(
                "HTTP {}",
                receipt.status
            )));
        }
        match receipt.etag.as_deref() {
            Some(echoed) if !etag_matches(&etag, echoed) => {
                warn!(
                    "Staging upload etag {} does not match dump etag {}",
                    echoed, etag
                );
            }
            Some(_) => {}
            None => debug!("Staging upload returned no etag"),
        }

        let status = self
            .platform
            .start_ingest(&target, &etag, &init.filename)
            .await
            .map_err(|e| RenameError::ImportIngestFailure(e.to_string()))?;
        let polls = self.poll_until_complete(job, &target, status).await?;

        info!("Imported {} into {} ({} poll(s))", init.filename, target, polls);
        Ok(ImportOutcome {
            etag,
            filename: init.filename,
            polls,
        })
    }

    async fn poll_until_complete(
        &self,
        job: &mut MigrationJob,
        target: &str,
        mut status: ImportStatus,
    ) -> Result<u32> {
        let mut polls = 0;
        if matches!(status, ImportStatus::Pending { .. }) {
            debug!(
                "Polling import into {} every {:?}, budget {:?}",
                target,
                self.policy.interval(),
                self.policy.budget()
            );
        }
        loop {
            let bookmark = match status {
                ImportStatus::Complete => return Ok(polls),
                ImportStatus::Failed { error } if is_finished_message(&error) => {
                    debug!("Ingest already finished: {}", error);
                    return Ok(polls);
                }
                ImportStatus::Failed { error } => {
                    return Err(RenameError::ImportIngestFailure(error));
                }
                ImportStatus::Pending { bookmark } => bookmark,
            };
            job.import_bookmark = Some(bookmark.clone());

            if polls >= self.policy.max_attempts {
                warn!("Import into {} still pending after {} polls", target, polls);
                return Err(RenameError::ImportTimeout { attempts: polls });
            }

            wait_interval(&self.policy, &self.cancel, "import").await?;
            polls += 1;
            job.import_attempts += 1;
            status = self
                .platform
                .poll_import(target, &bookmark)
                .await
                .map_err(|e| RenameError::ImportIngestFailure(e.to_string()))?;
        }
    }
}
