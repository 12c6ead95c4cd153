//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Platform API connection settings.
    pub platform: PlatformConfig,

    /// Rename saga behavior.
    #[serde(default)]
    pub rename: RenameConfig,
}

/// Platform API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Account that owns the databases.
    pub account_id: String,

    /// API token with database read/write permissions.
    pub api_token: String,

    /// API base URL (default: Cloudflare v4 API).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl PlatformConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("account_id", &self.account_id)
            .field("api_token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Fixed-interval polling budget for one saga phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay between attempts in milliseconds.
    pub interval_ms: u64,

    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval_ms,
            max_attempts,
        }
    }

    /// Policy with no delay between attempts.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(0, max_attempts)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on the time spent waiting between attempts.
    pub fn budget(&self) -> Duration {
        self.interval() * self.max_attempts
    }
}

/// Rename saga configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameConfig {
    /// Export job polling (default: every 2s, 60 attempts).
    #[serde(default = "default_export_policy")]
    pub export: PollPolicy,

    /// Import job polling (default: every 2s, 60 attempts).
    #[serde(default = "default_import_policy")]
    pub import: PollPolicy,

    /// Verification retries (default: 3 attempts, 3s apart).
    #[serde(default = "default_verification_policy")]
    pub verification: PollPolicy,

    /// Database names that may never be renamed or used as a rename target.
    /// A trailing `*` matches any name with that prefix.
    #[serde(default)]
    pub protected_databases: Vec<String>,

    /// Table name prefixes ignored by integrity verification.
    #[serde(default = "default_system_table_prefixes")]
    pub system_table_prefixes: Vec<String>,

    /// Directory for job snapshots. Jobs are not persisted when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            export: default_export_policy(),
            import: default_import_policy(),
            verification: default_verification_policy(),
            protected_databases: Vec::new(),
            system_table_prefixes: default_system_table_prefixes(),
            state_dir: None,
        }
    }
}

// Default value functions for serde
fn default_api_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_export_policy() -> PollPolicy {
    PollPolicy::new(2_000, 60)
}

fn default_import_policy() -> PollPolicy {
    PollPolicy::new(2_000, 60)
}

fn default_verification_policy() -> PollPolicy {
    PollPolicy::new(3_000, 3)
}

fn default_system_table_prefixes() -> Vec<String> {
    vec!["sqlite_".to_string(), "_cf_".to_string()]
}
