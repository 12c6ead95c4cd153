//! Type definitions for integrity verification.

use serde::{Deserialize, Serialize};

/// Outcome of one verification attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// True when no issue was found.
    pub success: bool,

    /// Human-readable problems, in discovery order.
    pub issues: Vec<String>,

    /// Tables present in both databases.
    pub tables_compared: usize,

    /// Row count comparisons performed.
    pub row_count_checks: usize,

    /// Column count comparisons performed.
    pub column_count_checks: usize,
}

impl IntegrityReport {
    pub(crate) fn push_issue(&mut self, issue: String) {
        self.issues.push(issue);
    }

    pub(crate) fn finish(mut self) -> Self {
        self.success = self.issues.is_empty();
        self
    }
}
