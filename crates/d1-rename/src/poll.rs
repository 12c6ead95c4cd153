//! Cancellable waits between polling attempts.

use tokio_util::sync::CancellationToken;

use crate::config::PollPolicy;
use crate::error::{RenameError, Result};

/// Sleep for one polling interval unless the token fires first.
pub(crate) async fn wait_interval(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    phase: &str,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RenameError::cancelled(phase));
    }
    if policy.interval_ms == 0 {
        return Ok(());
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(RenameError::cancelled(phase)),
        _ = tokio::time::sleep(policy.interval()) => Ok(()),
    }
}
