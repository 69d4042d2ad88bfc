//! Installer configuration (`config.toml`)

use anyhow::{Context, Result};
use provision::PollConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use wsclient::RetryPolicy;

use crate::paths;

/// Cloud the workspace runs on; selects cloud-specific cluster defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cloud {
    #[default]
    Aws,
    Azure,
    Gcp,
}

impl Cloud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cloud::Aws => "AWS",
            Cloud::Azure => "AZURE",
            Cloud::Gcp => "GCP",
        }
    }
}

impl fmt::Display for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cloud {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AWS" => Ok(Cloud::Aws),
            "AZURE" => Ok(Cloud::Azure),
            "GCP" => Ok(Cloud::Gcp),
            other => Err(format!("unknown cloud: {other} (expected AWS, AZURE or GCP)")),
        }
    }
}

/// Retry settings for rate-limited calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 2_000,
            jitter_ms: 1_000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }
}

/// Poll settings for the waits an installation performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Waiting for in-flight job runs to finish before a job is reset
    pub job_runs: PollConfig,
    /// Waiting for a cluster to reach `TERMINATED`
    pub cluster_stop: PollConfig,
    /// Waiting for a SQL statement to finish
    pub statement: PollConfig,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            job_runs: PollConfig::new(Duration::from_secs(5), 11),
            cluster_stop: PollConfig::new(Duration::from_secs(2), 30),
            statement: PollConfig::new(Duration::from_secs(1), 300),
        }
    }
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Workspace URL
    pub host: Option<String>,
    /// Personal access token
    pub token: Option<String>,
    /// Installing user; resolved from the workspace identity when unset
    pub username: Option<String>,
    pub cloud: Cloud,
    /// Compute used when the bundle cluster cannot be provisioned
    pub fallback_cluster_id: Option<String>,
    /// Instance pool applied to pipeline and job clusters
    pub instance_pool_id: Option<String>,
    /// Policy applied to classic pipeline clusters
    pub pipeline_policy_id: Option<String>,
    /// Worker pool size for provisioning and content upload
    pub max_workers: usize,
    pub request_timeout_secs: u64,
    /// Edit an existing bundle cluster to match the descriptor
    pub update_cluster_if_exists: bool,
    /// Start an existing bundle cluster after reconciling it
    pub start_cluster: bool,
    pub retry: RetrySettings,
    pub poll: PollSettings,
    /// Directory bundles are read from
    pub bundles_dir: Option<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            host: None,
            token: None,
            username: None,
            cloud: Cloud::default(),
            fallback_cluster_id: None,
            instance_pool_id: None,
            pipeline_policy_id: None,
            max_workers: 1,
            request_timeout_secs: 60,
            update_cluster_if_exists: true,
            start_cluster: false,
            retry: RetrySettings::default(),
            poll: PollSettings::default(),
            bundles_dir: None,
        }
    }
}

impl InstallerConfig {
    /// Load the config file, or defaults when it does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolved bundles directory
    pub fn bundles_path(&self) -> Result<PathBuf> {
        match &self.bundles_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::bundles_dir(),
        }
    }
}
