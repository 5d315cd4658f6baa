//! Configuration of the `siq-repl` binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use synciq_transport::HttpArrayConfig;

use crate::error::{ReplError, Result};
use crate::filter::DEFAULT_FRESHNESS_DIVISOR;
use crate::poll::PollConfig;

/// Environment variable consulted when the config file carries no password.
pub const PASSWORD_ENV: &str = "SIQ_PASSWORD";

/// Settings of the `siq-repl` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Base URL of the OneFS platform API.
    pub endpoint: String,
    /// API user.
    pub username: String,
    /// API password; `SIQ_PASSWORD` is used when unset.
    pub password: Option<String>,
    /// Accept self-signed array certificates.
    pub insecure_skip_verify: bool,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Delay between state checks while waiting.
    pub poll_interval_secs: u64,
    /// Deadline for each wait.
    pub poll_timeout_secs: u64,
    /// How many recent reports the sync path inspects.
    pub reports_per_policy: usize,
    /// A finished sync younger than `rpo / freshness_divisor` is not re-run.
    pub freshness_divisor: u32,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://localhost:8080"),
            username: String::from("root"),
            password: None,
            insecure_skip_verify: false,
            request_timeout_secs: 30,
            poll_interval_secs: 5,
            poll_timeout_secs: 600,
            reports_per_policy: 5,
            freshness_divisor: DEFAULT_FRESHNESS_DIVISOR,
        }
    }
}

impl ReplConfig {
    /// Load from a `.toml` or `.json` file, then validate.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ReplConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(ReplError::Config {
                msg: "poll_interval_secs must be positive".to_string(),
            });
        }
        if self.poll_timeout_secs < self.poll_interval_secs {
            return Err(ReplError::Config {
                msg: format!(
                    "poll_timeout_secs ({}) is shorter than poll_interval_secs ({})",
                    self.poll_timeout_secs, self.poll_interval_secs
                ),
            });
        }
        if self.reports_per_policy == 0 {
            return Err(ReplError::Config {
                msg: "reports_per_policy must be positive".to_string(),
            });
        }
        if self.freshness_divisor == 0 {
            return Err(ReplError::Config {
                msg: "freshness_divisor must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Poller settings derived from the config.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }

    /// Transport settings; the password falls back to `SIQ_PASSWORD`.
    pub fn http_config(&self) -> HttpArrayConfig {
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
            .unwrap_or_default();
        HttpArrayConfig {
            endpoint: self.endpoint.clone(),
            username: self.username.clone(),
            password,
            insecure_skip_verify: self.insecure_skip_verify,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
