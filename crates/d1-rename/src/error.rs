//! Error types for the rename saga.

use thiserror::Error;

/// Main error type for rename operations.
#[derive(Error, Debug)]
pub enum RenameError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The platform API rejected or failed a request
    #[error("Platform error during {operation}: {message}")]
    Platform { operation: String, message: String },

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Source database does not exist
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// Operation targets a system-reserved database
    #[error("Database {0} is protected and cannot be renamed")]
    ProtectedDatabase(String),

    /// Requested name is not a valid database name
    #[error("Invalid database name: {0}")]
    InvalidName(String),

    /// Requested name is already taken
    #[error("A database named {0} already exists")]
    NameConflict(String),

    /// Source uses features the export mechanism cannot handle
    #[error("Unsupported schema feature: virtual tables {} cannot be exported", .tables.join(", "))]
    UnsupportedSchemaFeature { tables: Vec<String> },

    /// Creating the target database failed
    #[error("Failed to create target database: {0}")]
    TargetCreationFailure(String),

    /// The platform reported an error for the export job
    #[error("Export failed: {0}")]
    ExportFailure(String),

    /// Export job did not produce a download URL in time
    #[error("Export did not complete after {attempts} polling attempts")]
    ExportTimeout { attempts: u32 },

    /// Fetching the export artifact failed
    #[error("Failed to download export: {0}")]
    ExportDownloadFailure(String),

    /// Requesting a staging upload location failed
    #[error("Import init failed: {0}")]
    ImportInitFailure(String),

    /// Uploading the dump to the staging location failed
    #[error("Import upload failed: {0}")]
    ImportUploadFailure(String),

    /// The platform reported an error while ingesting
    #[error("Import ingest failed: {0}")]
    ImportIngestFailure(String),

    /// Import job did not finish in time
    #[error("Import did not complete after {attempts} polling attempts")]
    ImportTimeout { attempts: u32 },

    /// Source and target are not equivalent
    #[error("Verification failed with {} issue(s): {}", .issues.len(), .issues.join("; "))]
    VerificationFailure { issues: Vec<String> },

    /// Deleting the original database failed after a verified copy
    #[error("Failed to delete source database: {0}")]
    SourceDeletionFailure(String),

    /// Saga was cancelled while waiting on the platform
    #[error("Rename cancelled during {phase}")]
    Cancelled { phase: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_PRECONDITION_FAILED: u8 = 2;
pub const EXIT_EXPORT_FAILED: u8 = 3;
pub const EXIT_IMPORT_FAILED: u8 = 4;
pub const EXIT_VERIFICATION_FAILED: u8 = 5;
pub const EXIT_PLATFORM_ERROR: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;
pub const EXIT_CANCELLED: u8 = 8;

impl RenameError {
    /// Create a Platform error for a named API operation
    pub fn platform(operation: impl Into<String>, message: impl Into<String>) -> Self {
        RenameError::Platform {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a Cancelled error for the phase that was interrupted
    pub fn cancelled(phase: impl Into<String>) -> Self {
        RenameError::Cancelled {
            phase: phase.into(),
        }
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            RenameError::Config(_) | RenameError::Yaml(_) => EXIT_CONFIG_ERROR,
            RenameError::DatabaseNotFound(_)
            | RenameError::ProtectedDatabase(_)
            | RenameError::InvalidName(_)
            | RenameError::NameConflict(_)
            | RenameError::UnsupportedSchemaFeature { .. } => EXIT_PRECONDITION_FAILED,
            RenameError::ExportFailure(_)
            | RenameError::ExportTimeout { .. }
            | RenameError::ExportDownloadFailure(_) => EXIT_EXPORT_FAILED,
            RenameError::ImportInitFailure(_)
            | RenameError::ImportUploadFailure(_)
            | RenameError::ImportIngestFailure(_)
            | RenameError::ImportTimeout { .. } => EXIT_IMPORT_FAILED,
            RenameError::VerificationFailure { .. } => EXIT_VERIFICATION_FAILED,
            RenameError::Platform { .. }
            | RenameError::Http(_)
            | RenameError::TargetCreationFailure(_)
            | RenameError::SourceDeletionFailure(_) => EXIT_PLATFORM_ERROR,
            RenameError::Io(_) | RenameError::Json(_) => EXIT_IO_ERROR,
            RenameError::Cancelled { .. } => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let RenameError::VerificationFailure { issues } = self {
            output.push_str("\nIssues:");
            for issue in issues {
                output.push_str(&format!("\n  - {}", issue));
            }
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for rename operations.
pub type Result<T> = std::result::Result<T, RenameError>;
