//! Remote command execution through the system `ssh` client.
//!
//! Key auth passes the configured key file with `-i`. Password auth runs
//! through `sshpass -e` with the password in `SSHPASS`, so it never shows
//! up in the process list. Host keys are not checked; the server is a
//! throwaway build host.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::RemoteSession;
use crate::config::SshConfig;

/// How the session authenticates
#[derive(Debug, Clone)]
pub enum SshAuth {
    KeyFile(PathBuf),
    Password(String),
}

/// SSH session to the build server
#[derive(Debug, Clone)]
pub struct SshSession {
    host: String,
    port: u16,
    username: String,
    auth: SshAuth,
    command_timeout: Duration,
}

impl SshSession {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            command_timeout: Duration::from_secs(3600),
        }
    }

    /// Session for `host` using the communicator settings; key auth wins
    pub fn from_config(host: impl Into<String>, config: &SshConfig) -> Option<Self> {
        let auth = match (&config.private_key_file, &config.password) {
            (Some(path), _) => SshAuth::KeyFile(path.clone()),
            (None, Some(password)) => SshAuth::Password(password.clone()),
            (None, None) => return None,
        };
        Some(
            Self::new(host, config.port, &config.username, auth)
                .with_command_timeout(config.command_timeout()),
        )
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Program and arguments for running `command` remotely
    fn command_line(&self, command: &str) -> (String, Vec<String>) {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ];

        let program = match &self.auth {
            SshAuth::KeyFile(path) => {
                args.push("-o".to_string());
                args.push("BatchMode=yes".to_string());
                args.push("-i".to_string());
                args.push(path.display().to_string());
                "ssh".to_string()
            }
            SshAuth::Password(_) => {
                args.insert(0, "ssh".to_string());
                args.insert(0, "-e".to_string());
                "sshpass".to_string()
            }
        };

        args.push(format!("{}@{}", self.username, self.host));
        args.push(command.to_string());
        (program, args)
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&self, command: &str) -> Result<i32> {
        let (program, args) = self.command_line(command);
        info!(host = %self.host, %command, "Running remote command");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let SshAuth::Password(password) = &self.auth {
            cmd.env("SSHPASS", password);
        }

        let status = timeout(self.command_timeout, cmd.status())
            .await
            .with_context(|| {
                format!(
                    "Remote command '{}' timed out after {:?}",
                    command, self.command_timeout
                )
            })?
            .with_context(|| format!("Failed to spawn {} for remote command", program))?;

        let code = status.code().unwrap_or(-1);
        debug!(%command, code, "Remote command finished");
        Ok(code)
    }
}
