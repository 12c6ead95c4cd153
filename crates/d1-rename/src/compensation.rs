//! Rollback of a partially created target.

use std::sync::Arc;
use tracing::{error, info};

use crate::platform::DatabasePlatform;

/// What a rollback did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// No target was created.
    NothingToDo,
    /// The target was deleted.
    Deleted,
    /// Deleting the target failed; it is left behind.
    Failed(String),
}

/// Deletes an unverified target database.
pub struct CompensationHandler {
    platform: Arc<dyn DatabasePlatform>,
}

impl CompensationHandler {
    pub fn new(platform: Arc<dyn DatabasePlatform>) -> Self {
        Self { platform }
    }

    /// Delete `target_id` if set. Never fails; a failed delete is logged and
    /// reported in the outcome.
    pub async fn rollback(&self, target_id: Option<&str>) -> CompensationOutcome {
        let Some(target_id) = target_id else {
            return CompensationOutcome::NothingToDo;
        };

        info!("Rolling back: deleting target database {}", target_id);
        match self.platform.delete_database(target_id).await {
            Ok(()) => CompensationOutcome::Deleted,
            Err(e) => {
                error!(
                    "Rollback failed, target database {} must be deleted manually: {}",
                    target_id, e
                );
                CompensationOutcome::Failed(e.to_string())
            }
        }
    }
}
