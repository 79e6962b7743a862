use crate::error::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// DriverConfig
// ---------------------------------------------------------------------------

/// Driver-wide defaults. Every field has a default, so an empty YAML document
/// (or no config file at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Separator for the `-n` filter list, unless the script root sets
    /// `actionDelim`.
    #[serde(default = "default_action_delim")]
    pub action_delim: String,
    /// Thread-affinity tag for actions that declare none.
    #[serde(default = "default_thread")]
    pub default_thread: String,
    /// Close every closeable handle in the variable store when a thread group
    /// aborts.
    #[serde(default = "default_cleanup_on_failure")]
    pub cleanup_on_failure: bool,
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// `0` disables the timeout.
    #[serde(default = "default_shell_timeout_seconds")]
    pub shell_timeout_seconds: u64,
}

fn default_action_delim() -> String {
    ",".to_string()
}

fn default_thread() -> String {
    "1".to_string()
}

fn default_cleanup_on_failure() -> bool {
    true
}

fn default_sync_timeout_ms() -> u64 {
    30_000
}

fn default_receive_timeout_ms() -> u64 {
    5_000
}

fn default_shell_timeout_seconds() -> u64 {
    60
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            action_delim: default_action_delim(),
            default_thread: default_thread(),
            cleanup_on_failure: default_cleanup_on_failure(),
            sync_timeout_ms: default_sync_timeout_ms(),
            receive_timeout_ms: default_receive_timeout_ms(),
            shell_timeout_seconds: default_shell_timeout_seconds(),
        }
    }
}

impl DriverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: DriverConfig = serde_yaml::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.action_delim.is_empty() {
            return Err(DriverError::InvalidConfig(
                "action_delim must not be empty".to_string(),
            ));
        }
        if self.default_thread.trim().is_empty() {
            return Err(DriverError::InvalidConfig(
                "default_thread must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn shell_timeout(&self) -> Option<Duration> {
        match self.shell_timeout_seconds {
            0 => None,
            s => Some(Duration::from_secs(s)),
        }
    }
}
