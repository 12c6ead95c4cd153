//! Schema capability gate.
//!
//! The platform's export cannot dump full-text virtual tables, so a source
//! that has any is rejected before the saga creates anything.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use crate::error::{RenameError, Result};
use crate::platform::DatabasePlatform;

const VIRTUAL_TABLES_SQL: &str = "SELECT name, sql FROM sqlite_master \
     WHERE type = 'table' AND sql LIKE 'CREATE VIRTUAL TABLE%'";

static FULL_TEXT_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUSING\s+fts[345]\b").expect("valid fts pattern"));

/// Tables found to block export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityReport {
    pub unsupported_tables: Vec<String>,
}

impl CapabilityReport {
    pub fn is_supported(&self) -> bool {
        self.unsupported_tables.is_empty()
    }
}

/// Inspects a database catalog for features export cannot handle.
pub struct SchemaCapabilityChecker {
    platform: Arc<dyn DatabasePlatform>,
}

impl SchemaCapabilityChecker {
    pub fn new(platform: Arc<dyn DatabasePlatform>) -> Self {
        Self { platform }
    }

    /// List the virtual full-text tables of a database.
    pub async fn check(&self, database_id: &str) -> Result<CapabilityReport> {
        let rows = self.platform.query(database_id, VIRTUAL_TABLES_SQL).await?;

        let mut unsupported_tables = Vec::new();
        for row in rows {
            let name = row.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            let sql = row.get("sql").and_then(|v| v.as_str()).unwrap_or_default();
            if FULL_TEXT_MODULE.is_match(sql) {
                unsupported_tables.push(name.to_string());
            } else {
                debug!("{}: virtual table {} does not use a full-text module", database_id, name);
            }
        }
        unsupported_tables.sort();

        Ok(CapabilityReport { unsupported_tables })
    }

    /// Fail with `UnsupportedSchemaFeature` if the database cannot be exported.
    pub async fn ensure_supported(&self, database_id: &str) -> Result<()> {
        let report = self.check(database_id).await?;
        if !report.is_supported() {
            info!(
                "{}: export blocked by virtual tables {:?}",
                database_id, report.unsupported_tables
            );
            return Err(RenameError::UnsupportedSchemaFeature {
                tables: report.unsupported_tables,
            });
        }
        Ok(())
    }
}
