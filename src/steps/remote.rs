//! Getting commands onto the build server.
//!
//! [`ConnectStep`] waits for the SSH port and opens a session;
//! [`ProvisionStep`] runs the configured commands through it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

use crate::adapters::{RemoteSession, SshSession};
use crate::config::SshConfig;
use crate::core::{
    BuildError, BuildState, PollSettings, Poller, Probe, Step, StepAction, StepContext,
};

/// Delay between SSH port probes
const PORT_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Bound on a single TCP connect attempt
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `command` and require exit status 0. Cancelling the run abandons
/// the command.
pub async fn run_checked(
    session: &dyn RemoteSession,
    command: &str,
    ctx: &StepContext,
) -> Result<(), BuildError> {
    let code = ctx
        .guard(&format!("remote command `{}`", command), session.run(command))
        .await?
        .map_err(|e| BuildError::Session(format!("{:#}", e)))?;

    if code != 0 {
        return Err(BuildError::CommandFailed {
            command: command.to_string(),
            code,
        });
    }
    Ok(())
}

/// Opens a command session to a freshly created server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        config: &SshConfig,
        ctx: &StepContext,
    ) -> Result<Arc<dyn RemoteSession>, BuildError>;
}

/// Waits for the SSH port, then hands out an [`SshSession`]
#[derive(Debug, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        host: &str,
        config: &SshConfig,
        ctx: &StepContext,
    ) -> Result<Arc<dyn RemoteSession>, BuildError> {
        let session = SshSession::from_config(host, config).ok_or_else(|| {
            BuildError::Session("neither an SSH password nor a private key is configured".to_string())
        })?;

        let address = format!("{}:{}", host, config.port);
        let poller = Poller::new(
            PollSettings::fixed(PORT_PROBE_INTERVAL, config.timeout()),
            ctx.poller.cancel_token().clone(),
        );

        info!(%address, "Waiting for SSH to become available");
        poller
            .poll_until(&format!("SSH on {}", address), || {
                let address = address.clone();
                async move {
                    match timeout(CONNECT_ATTEMPT_TIMEOUT, TcpStream::connect(&address)).await {
                        Ok(Ok(_)) => Ok(Probe::Ready(())),
                        Ok(Err(e)) => Ok(Probe::Pending(e.to_string())),
                        Err(_) => Ok(Probe::Pending("connect attempt timed out".to_string())),
                    }
                }
            })
            .await?;

        info!(%address, "SSH port is open");
        Ok(Arc::new(session))
    }
}

/// Connects to the build server and stores the session in state
pub struct ConnectStep {
    connector: Arc<dyn Connector>,
}

impl ConnectStep {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    async fn open(&self, state: &mut BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        let host = state.require_server_ip()?.to_string();
        let session = self.connector.connect(&host, &state.config.ssh, ctx).await?;
        state.session = Some(session);
        Ok(())
    }
}

#[async_trait]
impl Step for ConnectStep {
    fn name(&self) -> &str {
        "connect"
    }

    async fn run(&self, state: &mut BuildState, ctx: &StepContext) -> StepAction {
        self.open(state, ctx).await.into()
    }
}

/// Runs the configured provisioning commands in order
#[derive(Debug, Default)]
pub struct ProvisionStep;

impl ProvisionStep {
    pub fn new() -> Self {
        Self
    }

    async fn provision(&self, state: &BuildState, ctx: &StepContext) -> Result<(), BuildError> {
        let commands = &state.config.provision;
        if commands.is_empty() {
            return Ok(());
        }
        let session = state.session.as_deref().ok_or(BuildError::NoSession)?;

        for (i, command) in commands.iter().enumerate() {
            info!(step = i + 1, total = commands.len(), "Provisioning");
            run_checked(session, command, ctx).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Step for ProvisionStep {
    fn name(&self) -> &str {
        "provision"
    }

    async fn run(&self, state: &mut BuildState, ctx: &StepContext) -> StepAction {
        self.provision(state, ctx).await.into()
    }
}
