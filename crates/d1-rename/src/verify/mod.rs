//! Integrity verification between a source database and its copy.
//!
//! Verification compares structure and volume, not content:
//!
//! - **Tables**: user tables (system prefixes excluded) must match by name
//! - **Rows**: `COUNT(*)` per common table must be equal
//! - **Columns**: `PRAGMA table_info` column counts must be equal
//!
//! A freshly imported database may serve stale reads for a short while, so
//! [`verify_with_retry`] repeats the comparison a few times before giving up.

pub mod types;

pub use types::IntegrityReport;

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::{RenameError, Result};
use crate::platform::{DatabasePlatform, Row};
use crate::poll::wait_interval;

const LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name";

/// Quote an identifier for SQLite.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn count_from(rows: &[Row]) -> Option<i64> {
    let value = rows.first()?.get("count")?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Compares two databases table by table.
pub struct IntegrityVerifier {
    platform: Arc<dyn DatabasePlatform>,
    system_prefixes: Vec<String>,
}

impl IntegrityVerifier {
    pub fn new(platform: Arc<dyn DatabasePlatform>, system_prefixes: Vec<String>) -> Self {
        Self {
            platform,
            system_prefixes,
        }
    }

    fn is_system_table(&self, name: &str) -> bool {
        self.system_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    async fn user_tables(&self, database_id: &str) -> Result<BTreeSet<String>> {
        let rows = self.platform.query(database_id, LIST_TABLES_SQL).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(|v| v.as_str()))
            .filter(|name| !self.is_system_table(name))
            .map(str::to_string)
            .collect())
    }

    async fn row_count(&self, database_id: &str, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS count FROM {}", quote_ident(table));
        let rows = self.platform.query(database_id, &sql).await?;
        count_from(&rows).ok_or_else(|| {
            RenameError::platform("query", format!("no count returned for {}", table))
        })
    }

    async fn column_count(&self, database_id: &str, table: &str) -> Result<usize> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        Ok(self.platform.query(database_id, &sql).await?.len())
    }

    /// Run one comparison of `source` against `target`.
    pub async fn verify(&self, source: &str, target: &str) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        let source_tables = match self.user_tables(source).await {
            Ok(tables) => tables,
            Err(e) => {
                report.push_issue(format!("failed to list tables of source {}: {}", source, e));
                return report.finish();
            }
        };
        let target_tables = match self.user_tables(target).await {
            Ok(tables) => tables,
            Err(e) => {
                report.push_issue(format!("failed to list tables of target {}: {}", target, e));
                return report.finish();
            }
        };

        if source_tables.is_empty() && target_tables.is_empty() {
            debug!("{} and {} have no user tables", source, target);
            return report.finish();
        }

        for table in source_tables.difference(&target_tables) {
            report.push_issue(format!("table {} exists in source but not in target", table));
        }
        if source_tables.len() != target_tables.len() {
            report.push_issue(format!(
                "table count mismatch: source has {}, target has {}",
                source_tables.len(),
                target_tables.len()
            ));
        }

        for table in source_tables.intersection(&target_tables) {
            report.tables_compared += 1;

            match (
                self.row_count(source, table).await,
                self.row_count(target, table).await,
            ) {
                (Ok(expected), Ok(actual)) => {
                    report.row_count_checks += 1;
                    if expected != actual {
                        report.push_issue(format!(
                            "row count mismatch in {}: source {}, target {}",
                            table, expected, actual
                        ));
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    report.push_issue(format!("failed to count rows in {}: {}", table, e));
                }
            }

            match (
                self.column_count(source, table).await,
                self.column_count(target, table).await,
            ) {
                (Ok(expected), Ok(actual)) => {
                    report.column_count_checks += 1;
                    if expected != actual {
                        report.push_issue(format!(
                            "column count mismatch in {}: source {}, target {}",
                            table, expected, actual
                        ));
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    report.push_issue(format!("failed to read columns of {}: {}", table, e));
                }
            }
        }

        report.finish()
    }
}

/// Verify until one attempt is clean or the policy is exhausted.
///
/// Every attempt increments `attempts`. On exhaustion the
/// error carries the issues of the last attempt only.
pub async fn verify_with_retry(
    verifier: &IntegrityVerifier,
    attempts: &mut u32,
    source: &str,
    target: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<IntegrityReport> {
    let mut last_issues = Vec::new();

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            wait_interval(policy, cancel, "verification").await?;
        } else if cancel.is_cancelled() {
            return Err(RenameError::cancelled("verification"));
        }

        *attempts += 1;
        let report = verifier.verify(source, target).await;
        if report.success {
            info!(
                "Verified {} against {} ({} table(s), attempt {})",
                target, source, report.tables_compared, attempt
            );
            return Ok(report);
        }

        warn!(
            "Verification attempt {}/{} found {} issue(s)",
            attempt,
            policy.max_attempts,
            report.issues.len()
        );
        last_issues = report.issues;
    }

    Err(RenameError::VerificationFailure {
        issues: last_issues,
    })
}
