//! # d1-rename
//!
//! Rename for hosted SQLite databases on a platform without native rename.
//!
//! A rename runs as a copy-verify-delete saga:
//!
//! - **Export** the source through the platform's asynchronous export job
//! - **Sanitize** the dump of statements that break re-import
//! - **Import** it into a freshly created database via a staged upload
//! - **Verify** table, row and column counts, retrying for stale reads
//! - **Delete** the source only once the copy is verified
//!
//! Any failure before verification deletes the new database again.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use d1_rename::{Config, HttpPlatform, MigrationOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> d1_rename::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let platform = Arc::new(HttpPlatform::new(&config.platform)?);
//!     let orchestrator = MigrationOrchestrator::new(platform, config.rename);
//!     let result = orchestrator.rename("4a1b2c3d", "orders-v2").await?;
//!     println!("{} is now {}", result.target_id, result.name);
//!     Ok(())
//! }
//! ```

pub mod capability;
pub mod compensation;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod orchestrator;
pub mod platform;
mod poll;
pub mod protected;
pub mod sanitize;
pub mod state;
pub mod verify;

// Re-exports for convenient access
pub use capability::{CapabilityReport, SchemaCapabilityChecker};
pub use compensation::{CompensationHandler, CompensationOutcome};
pub use config::{Config, PlatformConfig, PollPolicy, RenameConfig};
pub use error::{RenameError, Result};
pub use export::{ExportArtifact, ExportHandle, ExportJobPoller};
pub use import::{ImportJobDriver, ImportOutcome};
pub use orchestrator::{validate_database_name, MigrationOrchestrator, RenameResult};
pub use platform::{DatabaseInfo, DatabasePlatform, HttpPlatform};
pub use protected::{ProtectedNameRegistry, StaticProtectedNames};
pub use sanitize::{sanitize, sanitize_with_report, SanitizeReport};
pub use state::{FileJobTracker, JobState, JobTracker, MigrationJob, NoOpJobTracker};
pub use verify::{verify_with_retry, IntegrityReport, IntegrityVerifier};
