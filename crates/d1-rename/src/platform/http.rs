//! D1 REST API client.
//!
//! All account-scoped calls go through `/accounts/{account_id}/d1/database`
//! with a bearer token and return the usual `{success, errors, result}`
//! envelope. Signed download URLs and staging upload URLs point straight at
//! object storage and are requested without the API token.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    DatabaseInfo, DatabasePlatform, ExportStatus, HttpPayload, ImportInit, ImportStatus, Row,
    UploadReceipt,
};
use crate::config::PlatformConfig;
use crate::error::{RenameError, Result};

/// [`DatabasePlatform`] backed by the D1 HTTP API.
pub struct HttpPlatform {
    client: Client,
    base_url: String,
    account_id: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

impl<T> Envelope<T> {
    fn error_message(&self) -> String {
        if self.errors.is_empty() {
            return "request was not successful".to_string();
        }
        self.errors
            .iter()
            .map(|e| match e.code {
                Some(code) => format!("{} (code {})", e.message, code),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DatabaseRecord {
    uuid: String,
    name: String,
}

impl From<DatabaseRecord> for DatabaseInfo {
    fn from(record: DatabaseRecord) -> Self {
        DatabaseInfo {
            id: record.uuid,
            name: record.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    results: Vec<Row>,
    #[serde(default = "default_true")]
    success: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ExportResponse {
    at_bookmark: Option<String>,
    status: Option<String>,
    error: Option<String>,
    result: Option<ExportResult>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportResult {
    signed_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImportInitResponse {
    upload_url: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportResponse {
    at_bookmark: Option<String>,
    status: Option<String>,
    success: Option<bool>,
    error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl HttpPlatform {
    /// Create a client from platform configuration.
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            api_token: config.api_token.clone(),
        })
    }

    fn databases_url(&self) -> String {
        format!("{}/accounts/{}/d1/database", self.base_url, self.account_id)
    }

    fn database_url(&self, id: &str) -> String {
        format!("{}/{}", self.databases_url(), id)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.api_token)
    }

    /// Send a request and decode the envelope without judging `success`.
    async fn fetch_envelope<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, Envelope<T>)> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        debug!("{} -> HTTP {}", operation, status);

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            RenameError::platform(operation, format!("HTTP {}: unreadable response: {}", status, e))
        })?;
        Ok((status, envelope))
    }

    /// Send a request and return the `result` of a successful envelope.
    async fn send<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        let (status, envelope) = self.fetch_envelope::<T>(operation, request).await?;
        if !envelope.success {
            return Err(RenameError::platform(
                operation,
                format!("HTTP {}: {}", status, envelope.error_message()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| RenameError::platform(operation, "response carried no result"))
    }
}

fn export_status_from(response: ExportResponse) -> ExportStatus {
    if let Some(error) = response.error.filter(|e| !e.is_empty()) {
        return ExportStatus::Failed { error };
    }
    if response.status.as_deref() == Some("error") {
        return ExportStatus::Failed {
            error: "export reported status 'error'".to_string(),
        };
    }
    if let Some(signed_url) = response.result.and_then(|r| r.signed_url) {
        return ExportStatus::Ready { signed_url };
    }
    match response.at_bookmark {
        Some(bookmark) => ExportStatus::Pending { bookmark },
        None => ExportStatus::Failed {
            error: "export response carried neither a download URL nor a bookmark".to_string(),
        },
    }
}

fn import_status_from(response: ImportResponse) -> ImportStatus {
    if let Some(error) = response.error.filter(|e| !e.is_empty()) {
        return ImportStatus::Failed { error };
    }
    match response.status.as_deref() {
        Some("error") => {
            return ImportStatus::Failed {
                error: "import reported status 'error'".to_string(),
            }
        }
        Some("complete") => return ImportStatus::Complete,
        _ => {}
    }
    if response.success == Some(false) {
        return ImportStatus::Failed {
            error: "import reported success=false".to_string(),
        };
    }
    match response.at_bookmark {
        Some(bookmark) => ImportStatus::Pending { bookmark },
        None => ImportStatus::Complete,
    }
}

#[async_trait]
impl DatabasePlatform for HttpPlatform {
    async fn get_database(&self, id: &str) -> Result<DatabaseInfo> {
        let request = self.client.get(self.database_url(id));
        let (status, envelope) = self
            .fetch_envelope::<DatabaseRecord>("get database", request)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Err(RenameError::DatabaseNotFound(id.to_string()));
        }
        if !envelope.success {
            return Err(RenameError::platform(
                "get database",
                format!("HTTP {}: {}", status, envelope.error_message()),
            ));
        }
        envelope
            .result
            .map(DatabaseInfo::from)
            .ok_or_else(|| RenameError::DatabaseNotFound(id.to_string()))
    }

    async fn find_database_by_name(&self, name: &str) -> Result<Option<DatabaseInfo>> {
        let request = self
            .client
            .get(self.databases_url())
            .query(&[("name", name)]);
        let records: Vec<DatabaseRecord> = self.send("list databases", request).await?;

        // The name filter is a substring match on the API side.
        Ok(records
            .into_iter()
            .find(|r| r.name == name)
            .map(DatabaseInfo::from))
    }

    async fn create_database(&self, name: &str) -> Result<DatabaseInfo> {
        let request = self
            .client
            .post(self.databases_url())
            .json(&json!({ "name": name }));
        let record: DatabaseRecord = self.send("create database", request).await?;
        Ok(record.into())
    }

    async fn delete_database(&self, id: &str) -> Result<()> {
        let request = self.client.delete(self.database_url(id));
        let (status, envelope) = self
            .fetch_envelope::<serde_json::Value>("delete database", request)
            .await?;
        if !envelope.success {
            return Err(RenameError::platform(
                "delete database",
                format!("HTTP {}: {}", status, envelope.error_message()),
            ));
        }
        Ok(())
    }

    async fn query(&self, id: &str, sql: &str) -> Result<Vec<Row>> {
        let request = self
            .client
            .post(format!("{}/query", self.database_url(id)))
            .json(&json!({ "sql": sql }));
        let mut results: Vec<QueryResult> = self.send("query", request).await?;

        if results.is_empty() {
            return Ok(Vec::new());
        }
        let first = results.swap_remove(0);
        if !first.success {
            return Err(RenameError::platform("query", format!("statement failed: {}", sql)));
        }
        Ok(first.results)
    }

    async fn start_export(&self, id: &str) -> Result<ExportStatus> {
        let request = self
            .client
            .post(format!("{}/export", self.database_url(id)))
            .json(&json!({ "output_format": "polling" }));
        let response: ExportResponse = self.send("start export", request).await?;
        Ok(export_status_from(response))
    }

    async fn poll_export(&self, id: &str, bookmark: &str) -> Result<ExportStatus> {
        let request = self
            .client
            .post(format!("{}/export", self.database_url(id)))
            .json(&json!({ "output_format": "polling", "current_bookmark": bookmark }));
        let (status, envelope) = self
            .fetch_envelope::<ExportResponse>("poll export", request)
            .await?;
        if !envelope.success {
            return Ok(ExportStatus::Failed {
                error: format!("HTTP {}: {}", status, envelope.error_message()),
            });
        }
        Ok(export_status_from(envelope.result.unwrap_or_default()))
    }

    async fn download(&self, url: &str) -> Result<HttpPayload> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpPayload { status, body })
    }

    async fn init_import(&self, id: &str, etag: &str) -> Result<ImportInit> {
        let request = self
            .client
            .post(format!("{}/import", self.database_url(id)))
            .json(&json!({ "action": "init", "etag": etag }));
        let response: ImportInitResponse = self.send("init import", request).await?;

        match (response.upload_url, response.filename) {
            (Some(upload_url), Some(filename)) => Ok(ImportInit {
                upload_url,
                filename,
            }),
            _ => Err(RenameError::platform(
                "init import",
                "response is missing upload_url or filename",
            )),
        }
    }

    async fn upload(&self, url: &str, body: &str) -> Result<UploadReceipt> {
        let response = self.client.put(url).body(body.to_owned()).send().await?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(UploadReceipt { status, etag })
    }

    async fn start_ingest(&self, id: &str, etag: &str, filename: &str) -> Result<ImportStatus> {
        let request = self
            .client
            .post(format!("{}/import", self.database_url(id)))
            .json(&json!({ "action": "ingest", "etag": etag, "filename": filename }));
        let response: ImportResponse = self.send("start ingest", request).await?;
        Ok(import_status_from(response))
    }

    async fn poll_import(&self, id: &str, bookmark: &str) -> Result<ImportStatus> {
        let request = self
            .client
            .post(format!("{}/import", self.database_url(id)))
            .json(&json!({ "action": "poll", "current_bookmark": bookmark }));
        let (status, envelope) = self
            .fetch_envelope::<ImportResponse>("poll import", request)
            .await?;
        if !envelope.success {
            return Ok(ImportStatus::Failed {
                error: format!("HTTP {}: {}", status, envelope.error_message()),
            });
        }
        Ok(import_status_from(envelope.result.unwrap_or_default()))
    }

    fn platform_name(&self) -> &'static str {
        "d1"
    }
}
