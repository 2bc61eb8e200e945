//! Build configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (credentials, snapshot name)
//! 2. Config file (snapforge.yaml)
//! 3. Environment variables (IONOS_USERNAME, IONOS_PASSWORD) for credentials
//! 4. Defaults
//!
//! Config file discovery:
//! - An explicit path wins
//! - Otherwise searches the current directory and parents for snapforge.yaml

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name searched for when no config path is given
pub const CONFIG_FILE_NAME: &str = "snapforge.yaml";

pub const ENV_USERNAME: &str = "IONOS_USERNAME";
pub const ENV_PASSWORD: &str = "IONOS_PASSWORD";

const REDACTED: &str = "********";

/// Largest accepted `poll.backoff_multiplier`
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Everything a build needs to know
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// IONOS account user
    #[serde(default)]
    pub username: String,

    /// IONOS account password
    #[serde(default)]
    pub password: String,

    /// Cloud API base URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Bound on a single API call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Datacenter location, e.g. "us/las"
    #[serde(default = "default_location")]
    pub location: String,

    /// Case-insensitive substring of the source image name
    #[serde(default)]
    pub image: String,

    /// Name of the produced snapshot; also names the build resources
    #[serde(default)]
    pub snapshot_name: String,

    /// Boot volume size in GB
    #[serde(default = "default_disk_size")]
    pub disk_size: f32,

    /// Boot volume type ("HDD" or "SSD")
    #[serde(default = "default_disk_type")]
    pub disk_type: String,

    #[serde(default = "default_cores")]
    pub cores: u32,

    /// RAM in MB
    #[serde(default = "default_ram")]
    pub ram: u32,

    #[serde(default)]
    pub ssh: SshConfig,

    /// Shell commands run on the server before the snapshot is taken
    #[serde(default)]
    pub provision: Vec<String>,

    #[serde(default)]
    pub poll: PollConfig,

    /// Delete the build datacenter once the snapshot is available
    #[serde(default = "default_true")]
    pub dispose_on_success: bool,
}

/// How the build reaches the server over SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_username")]
    pub username: String,

    /// Installed as the image password and used for password auth
    #[serde(default)]
    pub password: Option<String>,

    /// Private key; its public half is installed on the server
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// How long to wait for the SSH port to open
    #[serde(default = "default_ssh_timeout")]
    pub timeout_seconds: u64,

    /// Bound on a single remote command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    /// Remove the build key from `authorized_keys` before the snapshot
    #[serde(default)]
    pub clear_authorized_keys: bool,
}

/// Polling behaviour for provider requests and resource states
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Interval multiplier after each sample
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Deadline for a single wait
    #[serde(default = "default_poll_timeout")]
    pub timeout_seconds: u64,
}

fn default_url() -> String {
    "https://api.ionos.com/cloudapi/v6".to_string()
}
fn default_request_timeout() -> u64 {
    60
}
fn default_location() -> String {
    "us/las".to_string()
}
fn default_disk_size() -> f32 {
    50.0
}
fn default_disk_type() -> String {
    "HDD".to_string()
}
fn default_cores() -> u32 {
    4
}
fn default_ram() -> u32 {
    2048
}
fn default_true() -> bool {
    true
}
fn default_ssh_username() -> String {
    "root".to_string()
}
fn default_ssh_port() -> u16 {
    22
}
fn default_ssh_timeout() -> u64 {
    300
}
fn default_command_timeout() -> u64 {
    3600
}
fn default_interval_ms() -> u64 {
    1000
}
fn default_max_interval_ms() -> u64 {
    10_000
}
fn default_backoff_multiplier() -> f64 {
    1.5
}
fn default_poll_timeout() -> u64 {
    3600
} // 1 hour

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: default_ssh_username(),
            password: None,
            private_key_file: None,
            port: default_ssh_port(),
            timeout_seconds: default_ssh_timeout(),
            command_timeout_seconds: default_command_timeout(),
            clear_authorized_keys: false,
        }
    }
}

impl SshConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            timeout_seconds: default_poll_timeout(),
        }
    }
}

/// Validation problems, all collected at once
#[derive(Error, Debug)]
#[error("invalid configuration:\n  - {}", .problems.join("\n  - "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl BuildConfig {
    /// Load a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse config YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }

    /// Fill in environment credentials and the default snapshot name
    pub fn resolve(&mut self) {
        self.resolve_with(|key| std::env::var(key).ok());
    }

    /// Same as [`resolve`](Self::resolve) with an injectable environment
    pub fn resolve_with(&mut self, env: impl Fn(&str) -> Option<String>) {
        if self.username.is_empty() {
            self.username = env(ENV_USERNAME).unwrap_or_default();
        }
        if self.password.is_empty() {
            self.password = env(ENV_PASSWORD).unwrap_or_default();
        }
        if self.snapshot_name.is_empty() {
            self.snapshot_name = format!("snapforge-{}", Utc::now().timestamp());
        }
    }

    /// Check the resolved config
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.image.is_empty() {
            problems.push("'image' is required".to_string());
        }
        if self.username.is_empty() {
            problems.push(format!("IONOS username is required (set 'username' or {})", ENV_USERNAME));
        }
        if self.password.is_empty() {
            problems.push(format!("IONOS password is required (set 'password' or {})", ENV_PASSWORD));
        }
        if self.ssh.password.is_none() && self.ssh.private_key_file.is_none() {
            problems.push("either ssh private key path or ssh password must be set".to_string());
        }
        if self.cores == 0 {
            problems.push("'cores' must be greater than zero".to_string());
        }
        if self.ram == 0 {
            problems.push("'ram' must be greater than zero".to_string());
        }
        if self.disk_size <= 0.0 {
            problems.push("'disk_size' must be greater than zero".to_string());
        }
        if self.poll.interval_ms == 0 || self.poll.timeout_seconds == 0 {
            problems.push("'poll' interval and timeout must be greater than zero".to_string());
        }
        let multiplier = self.poll.backoff_multiplier;
        if !multiplier.is_finite() || !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&multiplier) {
            problems.push(format!(
                "'poll.backoff_multiplier' must be between 1 and {}",
                MAX_BACKOFF_MULTIPLIER
            ));
        }
        if self.request_timeout_seconds == 0 || self.ssh.command_timeout_seconds == 0 {
            problems.push("request and command timeouts must be greater than zero".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.password.is_empty() {
            copy.password = REDACTED.to_string();
        }
        if copy.ssh.password.is_some() {
            copy.ssh.password = Some(REDACTED.to_string());
        }
        copy
    }
}

/// Find config file by searching current directory and parents
pub fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and resolve the config at `path` (or the discovered one)
pub fn load_config(path: Option<&Path>) -> Result<BuildConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()
            .with_context(|| format!("No config path given and no {} found", CONFIG_FILE_NAME))?,
    };

    let mut config = BuildConfig::from_file(&path)?;
    config.resolve();
    Ok(config)
}
