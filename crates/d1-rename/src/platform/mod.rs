//! Database platform abstraction.
//!
//! The rename saga talks to the hosting platform only through the
//! [`DatabasePlatform`] trait. The orchestrator and every step work with
//! `Arc<dyn DatabasePlatform>` without knowing the concrete client:
//!
//! - **HTTP**: [`HttpPlatform`] speaks the D1 REST API
//! - **Tests**: an in-memory scripted platform (`mock.rs`, test builds only)

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpPlatform;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Identity of a hosted database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub id: String,
    pub name: String,
}

/// State of an asynchronous export job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    /// The dump is ready at a signed URL.
    Ready { signed_url: String },
    /// Still running; submit the bookmark to continue polling.
    Pending { bookmark: String },
    /// The platform reported an error.
    Failed { error: String },
}

/// State of an asynchronous import job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    Complete,
    Pending { bookmark: String },
    Failed { error: String },
}

/// Staging location handed out by `init_import`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInit {
    pub upload_url: String,
    pub filename: String,
}

/// Raw response of a direct storage request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPayload {
    pub status: u16,
    pub body: String,
}

impl HttpPayload {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Response of a staging upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status: u16,
    /// Content hash echoed by the storage layer, if any.
    pub etag: Option<String>,
}

impl UploadReceipt {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Operations the rename saga needs from the hosting platform.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one client can back several
/// sagas running on different databases.
#[async_trait]
pub trait DatabasePlatform: Send + Sync {
    /// Look up a database by id.
    async fn get_database(&self, id: &str) -> Result<DatabaseInfo>;

    /// Look up a database by exact name.
    async fn find_database_by_name(&self, name: &str) -> Result<Option<DatabaseInfo>>;

    /// Create an empty database.
    async fn create_database(&self, name: &str) -> Result<DatabaseInfo>;

    /// Delete a database.
    async fn delete_database(&self, id: &str) -> Result<()>;

    /// Run a single SQL statement and return its rows.
    async fn query(&self, id: &str, sql: &str) -> Result<Vec<Row>>;

    /// Start an export job.
    async fn start_export(&self, id: &str) -> Result<ExportStatus>;

    /// Resume polling an export job.
    async fn poll_export(&self, id: &str, bookmark: &str) -> Result<ExportStatus>;

    /// Fetch an export artifact from its signed URL.
    async fn download(&self, url: &str) -> Result<HttpPayload>;

    /// Request a staging upload location for a dump with the given etag.
    async fn init_import(&self, id: &str, etag: &str) -> Result<ImportInit>;

    /// Upload the dump to a staging location.
    async fn upload(&self, url: &str, body: &str) -> Result<UploadReceipt>;

    /// Ask the platform to ingest a staged dump.
    async fn start_ingest(&self, id: &str, etag: &str, filename: &str) -> Result<ImportStatus>;

    /// Resume polling an import job.
    async fn poll_import(&self, id: &str, bookmark: &str) -> Result<ImportStatus>;

    /// Platform name for logging.
    fn platform_name(&self) -> &'static str;
}
