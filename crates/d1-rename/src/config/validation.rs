//! Configuration validation.

use super::{Config, PollPolicy};
use crate::error::{RenameError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Platform validation
    if config.platform.account_id.is_empty() {
        return Err(RenameError::Config("platform.account_id is required".into()));
    }
    if config.platform.api_token.is_empty() {
        return Err(RenameError::Config("platform.api_token is required".into()));
    }
    if !config.platform.api_base_url.starts_with("http://")
        && !config.platform.api_base_url.starts_with("https://")
    {
        return Err(RenameError::Config(format!(
            "platform.api_base_url must be an http(s) URL, got '{}'",
            config.platform.api_base_url
        )));
    }
    if config.platform.request_timeout_secs == 0 {
        return Err(RenameError::Config(
            "platform.request_timeout_secs must be at least 1".into(),
        ));
    }

    // Polling budgets
    validate_policy("rename.export", &config.rename.export)?;
    validate_policy("rename.import", &config.rename.import)?;
    validate_policy("rename.verification", &config.rename.verification)?;

    if config
        .rename
        .system_table_prefixes
        .iter()
        .any(|p| p.is_empty())
    {
        return Err(RenameError::Config(
            "rename.system_table_prefixes must not contain empty prefixes".into(),
        ));
    }

    Ok(())
}

fn validate_policy(name: &str, policy: &PollPolicy) -> Result<()> {
    if policy.max_attempts == 0 {
        return Err(RenameError::Config(format!(
            "{}.max_attempts must be at least 1",
            name
        )));
    }
    Ok(())
}
