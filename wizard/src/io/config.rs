//! Wizard configuration stored in `wizard.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "wizard.toml";
pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudreactor.io";
pub const API_BASE_URL_ENV: &str = "CLOUDREACTOR_API_BASE_URL";

/// Wizard configuration (TOML).
///
/// Every field is optional in the file; missing fields take the defaults the
/// hosted service expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WizardConfig {
    /// Control-plane base URL, without the `/api/v1` suffix.
    pub api_base_url: String,

    /// Seconds between stack status checks.
    pub poll_interval_secs: u64,

    /// Where the session record is written.
    pub session_path: PathBuf,

    pub aws_cli: AwsCliConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AwsCliConfig {
    /// Program to invoke for provider calls.
    pub program: String,
    /// Wall-clock budget for a single provider call.
    pub timeout_secs: u64,
    /// Truncate captured CLI output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for AwsCliConfig {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            timeout_secs: 120,
            output_limit_bytes: 4_000_000,
        }
    }
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_interval_secs: 10,
            session_path: PathBuf::from("saved_settings.json"),
            aws_cli: AwsCliConfig::default(),
        }
    }
}

impl WizardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(anyhow!("api_base_url must be non-empty"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be > 0"));
        }
        if self.session_path.as_os_str().is_empty() {
            return Err(anyhow!("session_path must be non-empty"));
        }
        if self.aws_cli.program.trim().is_empty() {
            return Err(anyhow!("aws_cli.program must be non-empty"));
        }
        if self.aws_cli.timeout_secs == 0 {
            return Err(anyhow!("aws_cli.timeout_secs must be > 0"));
        }
        if self.aws_cli.output_limit_bytes == 0 {
            return Err(anyhow!("aws_cli.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Apply environment overrides on top of the file values.
    pub fn with_env_overrides(mut self, api_base_url: Option<String>) -> Self {
        if let Some(url) = api_base_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WizardConfig::default()`.
pub fn load_config(path: &Path) -> Result<WizardConfig> {
    if !path.exists() {
        let cfg = WizardConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WizardConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
